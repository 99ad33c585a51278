//! Out-of-band call metadata.
//!
//! Metadata travels beside the request payload as `key=value\n` lines and
//! is never merged into the payload. The reserved key `__timeout_ms`
//! carries a per-call deadline hint and is lifted into
//! [`Metadata::timeout`] instead of the entry list. The same line format
//! encodes stream headers and trailers on the way back.

use std::time::Duration;

use smallvec::SmallVec;

/// Reserved metadata key carrying a per-call timeout in milliseconds.
pub const TIMEOUT_KEY: &str = "__timeout_ms";

/// Parsed call metadata.
///
/// Entries keep their wire order. Duplicate keys are preserved;
/// [`get`](Metadata::get) returns the last one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: SmallVec<[(String, String); 4]>,
    timeout: Option<Duration>,
}

impl Metadata {
    /// Empty metadata: no entries, no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value\n` lines.
    ///
    /// Lines without `=` or with an empty key are skipped. A trailing
    /// `\r` is stripped so CRLF input parses the same. Bytes that are not
    /// valid UTF-8 are replaced. A `__timeout_ms` value that is not a
    /// positive integer is ignored.
    pub fn parse(raw: &[u8]) -> Self {
        let mut meta = Self::new();
        for line in raw.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let Some(eq) = line.iter().position(|&b| b == b'=') else {
                continue;
            };
            if eq == 0 {
                continue;
            }
            let key = String::from_utf8_lossy(&line[..eq]).into_owned();
            let value = String::from_utf8_lossy(&line[eq + 1..]).into_owned();
            if key == TIMEOUT_KEY {
                meta.timeout = value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|&ms| ms > 0)
                    .map(Duration::from_millis);
            } else {
                meta.entries.push((key, value));
            }
        }
        meta
    }

    /// Add an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Set the per-call timeout hint.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Look up the last value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Per-call timeout hint, if the caller supplied one.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Iterate over entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries (the timeout hint is not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode entries (and the timeout hint, if any) back to wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = encode_pairs(self.iter());
        if let Some(t) = self.timeout {
            out.extend_from_slice(format!("{TIMEOUT_KEY}={}\n", t.as_millis()).as_bytes());
        }
        out
    }
}

/// Encode key/value pairs as `key=value\n` lines.
pub fn encode_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<u8> {
    let mut out = Vec::new();
    for (k, v) in pairs {
        out.extend_from_slice(k.as_bytes());
        out.push(b'=');
        out.extend_from_slice(v.as_bytes());
        out.push(b'\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_entries_and_timeout() {
        let m = Metadata::parse(b"authorization=Bearer x\n__timeout_ms=250\nx-trace=abc");
        assert_eq!(m.get("authorization"), Some("Bearer x"));
        assert_eq!(m.get("x-trace"), Some("abc"));
        assert_eq!(m.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn skips_malformed_lines() {
        let m = Metadata::parse(b"novalue\n=orphan\n\nk=v\r\n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("k"), Some("v"));
    }

    #[test]
    fn value_may_contain_equals() {
        let m = Metadata::parse(b"q=a=b");
        assert_eq!(m.get("q"), Some("a=b"));
    }

    #[test]
    fn bad_or_zero_timeout_is_ignored() {
        assert_eq!(Metadata::parse(b"__timeout_ms=soon").timeout(), None);
        assert_eq!(Metadata::parse(b"__timeout_ms=0").timeout(), None);
    }

    #[test]
    fn last_duplicate_wins() {
        let m = Metadata::parse(b"k=1\nk=2\n");
        assert_eq!(m.get("k"), Some("2"));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn empty_input_is_empty_metadata() {
        assert_eq!(Metadata::parse(b""), Metadata::new());
    }

    proptest! {
        #[test]
        fn encode_then_parse_preserves_entries(
            pairs in proptest::collection::vec(("[a-z][a-z0-9-]{0,8}", "[a-zA-Z0-9 =._/-]{0,12}"), 0..6),
            timeout in proptest::option::of(1u64..100_000),
        ) {
            let mut m = Metadata::new();
            for (k, v) in &pairs {
                m.insert(k.clone(), v.clone());
            }
            if let Some(ms) = timeout {
                m = m.with_timeout(Duration::from_millis(ms));
            }
            let parsed = Metadata::parse(&m.encode());
            prop_assert_eq!(parsed, m);
        }
    }
}
