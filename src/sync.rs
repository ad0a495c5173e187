//! Sync tokens returned by every asynchronous submit.
//!
//! The software core finishes its work during submit, so a token simply
//! stores the completed status; resolving it never blocks. The opaque-handle
//! contract is what matters to callers.

use std::sync::Arc;

use crate::status::Status;

#[derive(Debug)]
struct SyncInner {
    status: Status,
}

/// Opaque handle to the completion of one submitted operation.
#[derive(Debug, Clone)]
pub struct SyncPoint {
    inner: Arc<SyncInner>,
}

impl SyncPoint {
    /// Token for an operation that already completed with `status`.
    pub(crate) fn completed(status: Status) -> SyncPoint {
        SyncPoint {
            inner: Arc::new(SyncInner { status }),
        }
    }

    /// Resolve the token. `wait_ms` is accepted for contract compatibility;
    /// the software core never needs to wait.
    pub fn resolve(&self, _wait_ms: u32) -> Status {
        self.inner.status
    }
}
