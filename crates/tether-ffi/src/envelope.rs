//! Ownership-transferring byte buffers.
//!
//! A [`TetherBuffer`] is handed to the front end, which must release it
//! exactly once with [`tether_free`]. The length field is tri-state:
//!
//! | `len` | meaning |
//! |-------|---------|
//! | `> 0` | success; `data` points at `len` payload bytes |
//! | `0`   | success with an empty payload; `data` is null |
//! | `< 0` | failure; if `data` is non-null it points at `-len` bytes of UTF-8 diagnostic |
//!
//! Every non-null `data` pointer is recorded in a live-allocation table, so
//! releasing an unknown or already-released pointer is a logged no-op.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tether_core::Reply;
use tracing::warn;

/// Live allocations: data address → byte count.
static LIVE: Mutex<BTreeMap<usize, usize>> = Mutex::new(BTreeMap::new());

fn live() -> std::sync::MutexGuard<'static, BTreeMap<usize, usize>> {
    LIVE.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// C-compatible byte buffer whose ownership crosses the boundary.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TetherBuffer {
    /// Heap bytes owned by the receiver, or null.
    pub data: *mut u8,
    /// Payload length, 0 for success-empty, negative for failure.
    pub len: i64,
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(std::mem::size_of::<TetherBuffer>() == 16);

impl TetherBuffer {
    /// Successful empty payload. No allocation.
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Failure with no diagnostic attached.
    pub const fn bare_failure() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: -1,
        }
    }

    /// Take ownership of `bytes`. An empty vector is [`empty`](Self::empty).
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        match leak(bytes) {
            Some((data, n)) => Self { data, len: n },
            None => Self::empty(),
        }
    }

    /// Copy `bytes` into a fresh allocation. Allocation failure yields
    /// [`bare_failure`](Self::bare_failure).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::try_from_bytes(bytes).unwrap_or(Self::bare_failure())
    }

    /// Copy `bytes` into a fresh allocation, or `None` if it cannot be made.
    pub fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return Some(Self::empty());
        }
        let Some(mut v) = reserve(bytes.len()) else {
            warn!(len = bytes.len(), "envelope allocation failed");
            return None;
        };
        v.extend_from_slice(bytes);
        Some(Self::from_vec(v))
    }

    /// Failure carrying `message` as its diagnostic.
    pub fn failure(message: &str) -> Self {
        match leak(message.as_bytes().to_vec()) {
            Some((data, n)) => Self { data, len: -n },
            None => Self::bare_failure(),
        }
    }

    /// `len >= 0`.
    pub fn is_success(&self) -> bool {
        self.len >= 0
    }

    /// `len < 0`.
    pub fn is_failure(&self) -> bool {
        self.len < 0
    }

    /// The bytes `data` points at, payload or diagnostic, copied out.
    /// `None` if `data` is null or not a live envelope allocation.
    #[allow(unsafe_code)]
    pub fn copy_out(&self) -> Option<Vec<u8>> {
        if self.data.is_null() {
            return None;
        }
        let table = live();
        let n = *table.get(&(self.data as usize))?;
        // SAFETY: `data` is a live allocation of `n` bytes from `leak`, and
        // the table lock keeps it from being freed concurrently.
        let bytes = unsafe { std::slice::from_raw_parts(self.data, n) };
        Some(bytes.to_vec())
    }

    /// The failure diagnostic as text, if this is a failure that carries one.
    pub fn diagnostic(&self) -> Option<String> {
        if !self.is_failure() {
            return None;
        }
        self.copy_out()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }
}

impl From<Reply> for TetherBuffer {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Payload(p) => Self::from_vec(p),
            Reply::Empty => Self::empty(),
            Reply::Failed(e) => Self::failure(&e.to_string()),
        }
    }
}

/// Number of envelopes handed out and not yet released.
pub fn live_allocations() -> usize {
    live().len()
}

fn reserve(len: usize) -> Option<Vec<u8>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    Some(v)
}

/// Leak `bytes` into a raw allocation and record it. Returns `None` for an
/// empty vector or a length that does not fit `i64`.
fn leak(bytes: Vec<u8>) -> Option<(*mut u8, i64)> {
    if bytes.is_empty() {
        return None;
    }
    let n = i64::try_from(bytes.len()).ok()?;
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    let data = Box::into_raw(boxed).cast::<u8>();
    live().insert(data as usize, len);
    Some((data, n))
}

/// Release an envelope's `data`. Null is a no-op; so is a pointer this
/// library did not hand out or has already released (logged at `warn`).
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_free(data: *mut u8) {
    if data.is_null() {
        return;
    }
    let Some(len) = live().remove(&(data as usize)) else {
        warn!(ptr = ?data, "tether_free on unknown or released pointer");
        return;
    };
    // SAFETY: the table held `data` with `len`, so it came from
    // `Box::<[u8]>::into_raw` in `leak` and has not been freed since.
    drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(data, len)) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tether_core::DispatchError;

    #[test]
    fn empty_is_null_and_zero() {
        let b = TetherBuffer::from_bytes(&[]);
        assert!(b.data.is_null());
        assert_eq!(b.len, 0);
        assert!(b.is_success());
        tether_free(b.data);
    }

    #[test]
    fn payload_round_trips_and_frees() {
        let b = TetherBuffer::from_bytes(b"pong");
        assert_eq!(b.len, 4);
        assert_eq!(b.copy_out().unwrap(), b"pong");
        tether_free(b.data);
    }

    #[test]
    fn failure_carries_negative_length_diagnostic() {
        let b = TetherBuffer::from(Reply::Failed(DispatchError::MethodNotFound {
            method: "/x.Y/Z".into(),
        }));
        assert!(b.is_failure());
        let text = b.diagnostic().unwrap();
        assert_eq!(b.len, -(text.len() as i64));
        assert!(text.contains("/x.Y/Z"), "{text}");
        tether_free(b.data);
    }

    #[test]
    fn empty_reply_is_success_empty() {
        let b = TetherBuffer::from(Reply::Empty);
        assert_eq!(b, TetherBuffer::empty());
        assert_eq!(b.diagnostic(), None);
    }

    #[test]
    fn impossible_reservation_is_refused() {
        assert!(reserve(usize::MAX).is_none());
        assert_eq!(
            TetherBuffer::try_from_bytes(&[]),
            Some(TetherBuffer::empty())
        );
    }

    #[test]
    fn foreign_pointer_is_ignored() {
        let mut local = [1u8, 2, 3];
        let foreign = TetherBuffer {
            data: local.as_mut_ptr(),
            len: 3,
        };
        assert_eq!(foreign.copy_out(), None);
        tether_free(foreign.data);
        tether_free(std::ptr::null_mut());
        assert_eq!(local, [1, 2, 3]);
    }

    proptest! {
        #[test]
        fn releasing_one_leaves_others_intact(
            a in proptest::collection::vec(any::<u8>(), 0..64),
            b in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let ea = TetherBuffer::from_bytes(&a);
            let eb = TetherBuffer::from_bytes(&b);
            prop_assert_eq!(ea.len, a.len() as i64);
            tether_free(ea.data);
            let got = eb.copy_out().unwrap_or_default();
            prop_assert_eq!(got, b);
            tether_free(eb.data);
        }
    }
}
