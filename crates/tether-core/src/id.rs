//! Strongly-typed identifiers for streaming sessions and reverse calls.
//!
//! Both id kinds are issued from process-wide monotonic counters starting
//! at 1, so an id is never reused for the lifetime of the process. Zero and
//! negative values never name a live object; the C ABI uses negative values
//! as failure sentinels.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Counter for [`SessionId`] allocation.
static SESSION_COUNTER: AtomicI64 = AtomicI64::new(1);

/// Counter for [`RequestId`] allocation.
static REQUEST_COUNTER: AtomicI64 = AtomicI64::new(1);

/// Identifies a live or retired streaming session.
///
/// Allocated from a monotonic atomic counter via [`SessionId::next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub i64);

impl SessionId {
    /// Allocate a fresh, process-unique session id.
    pub fn next() -> Self {
        Self(SESSION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this id has been handed out by [`SessionId::next`].
    pub fn was_issued(self) -> bool {
        self.0 > 0 && self.0 < SESSION_COUNTER.load(Ordering::Relaxed)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Correlates a reverse call (native core → front end) with its response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub i64);

impl RequestId {
    /// Allocate a fresh, process-unique request id.
    pub fn next() -> Self {
        Self(REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this id has been handed out by [`RequestId::next`].
    ///
    /// Lets the reverse-call table tell a duplicate delivery (issued, no
    /// longer pending) apart from a delivery for an id that never existed.
    pub fn was_issued(self) -> bool {
        self.0 > 0 && self.0 < REQUEST_COUNTER.load(Ordering::Relaxed)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RequestId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_monotonic_and_positive() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert!(a.0 > 0);
        assert!(b > a);
        assert!(a.was_issued());
        assert!(b.was_issued());
    }

    #[test]
    fn unissued_ids_are_recognised() {
        assert!(!SessionId(0).was_issued());
        assert!(!SessionId(-5).was_issued());
        assert!(!SessionId(i64::MAX).was_issued());
        assert!(!RequestId(i64::MAX).was_issued());
    }

    #[test]
    fn request_ids_are_independent_of_session_ids() {
        let r1 = RequestId::next();
        let _ = SessionId::next();
        let r2 = RequestId::next();
        assert!(r2 > r1);
        assert!(r1.was_issued());
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..256).map(|_| SessionId::next()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<SessionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let n = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), n);
    }
}
