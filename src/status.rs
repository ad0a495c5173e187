//! Unified outcome taxonomy used by every component of the runtime.
//!
//! Errors are carried as [`VplError`] through ordinary `Result`s. Warnings and
//! back-pressure signals ride on the `Ok` side of an operation (see the
//! pipeline outcome enums) because a caller is expected to keep going after
//! receiving them. [`Status`] is the closed numeric form used at the C
//! boundary: zero means done, positive means proceed, negative means stop.

/// Result alias used across the crate.
pub type VplResult<T> = Result<T, VplError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VplError {
    #[error("null argument at API boundary")]
    NullPtr,

    #[error("invalid or closed handle")]
    InvalidHandle,

    #[error("component addressed before initialization")]
    NotInitialized,

    #[error("video parameter failed domain check")]
    InvalidVideoParam,

    #[error("operation or configuration not supported")]
    Unsupported,

    #[error("operation not implemented")]
    NotImplemented,

    #[error("requested item not found")]
    NotFound,

    #[error("memory allocation failed")]
    MemoryAlloc,

    #[error("output buffer too small")]
    NotEnoughBuffer,

    #[error("operation aborted")]
    Aborted,

    #[error("undefined behavior in underlying component")]
    UndefinedBehavior,

    #[error("unknown failure in underlying component")]
    Unknown,
}

/// Non-fatal advisories. The operation succeeded; the caller may want to
/// inspect its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// A parameter was within its domain but contradictory; the corrected
    /// value has been written back to the output structure.
    IncompatibleVideoParam,
    /// A new sequence header with different parameters was detected
    /// mid-stream.
    VideoParamChanged,
}

/// Closed numeric status. OK is zero, warnings and back-pressure are
/// positive, errors are negative, so `code >= 0` always means "proceed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    MoreData,
    MoreSurface,
    IncompatibleVideoParam,
    VideoParamChanged,
    Unknown,
    NullPtr,
    Unsupported,
    MemoryAlloc,
    NotEnoughBuffer,
    InvalidHandle,
    NotInitialized,
    NotFound,
    Aborted,
    InvalidVideoParam,
    UndefinedBehavior,
    NotImplemented,
}

impl Status {
    /// Numeric code observable across the C boundary.
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::MoreData => 1,
            Status::MoreSurface => 2,
            Status::IncompatibleVideoParam => 3,
            Status::VideoParamChanged => 4,
            Status::Unknown => -1,
            Status::NullPtr => -2,
            Status::Unsupported => -3,
            Status::MemoryAlloc => -4,
            Status::NotEnoughBuffer => -5,
            Status::InvalidHandle => -6,
            Status::NotInitialized => -8,
            Status::NotFound => -9,
            Status::Aborted => -12,
            Status::InvalidVideoParam => -15,
            Status::UndefinedBehavior => -16,
            Status::NotImplemented => -17,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn is_warning(self) -> bool {
        self.code() > 0
    }

    pub fn is_error(self) -> bool {
        self.code() < 0
    }

    /// The error carried by a negative status, if any.
    pub fn as_error(self) -> Option<VplError> {
        match self {
            Status::Unknown => Some(VplError::Unknown),
            Status::NullPtr => Some(VplError::NullPtr),
            Status::Unsupported => Some(VplError::Unsupported),
            Status::MemoryAlloc => Some(VplError::MemoryAlloc),
            Status::NotEnoughBuffer => Some(VplError::NotEnoughBuffer),
            Status::InvalidHandle => Some(VplError::InvalidHandle),
            Status::NotInitialized => Some(VplError::NotInitialized),
            Status::NotFound => Some(VplError::NotFound),
            Status::Aborted => Some(VplError::Aborted),
            Status::InvalidVideoParam => Some(VplError::InvalidVideoParam),
            Status::UndefinedBehavior => Some(VplError::UndefinedBehavior),
            Status::NotImplemented => Some(VplError::NotImplemented),
            _ => None,
        }
    }
}

/// Map a numeric code coming back across the C boundary to an error.
pub fn error_from_code(code: i32) -> Option<VplError> {
    let all = [
        Status::Unknown,
        Status::NullPtr,
        Status::Unsupported,
        Status::MemoryAlloc,
        Status::NotEnoughBuffer,
        Status::InvalidHandle,
        Status::NotInitialized,
        Status::NotFound,
        Status::Aborted,
        Status::InvalidVideoParam,
        Status::UndefinedBehavior,
        Status::NotImplemented,
    ];
    all.into_iter()
        .find(|s| s.code() == code)
        .and_then(|s| s.as_error())
}

impl From<VplError> for Status {
    fn from(err: VplError) -> Status {
        match err {
            VplError::NullPtr => Status::NullPtr,
            VplError::InvalidHandle => Status::InvalidHandle,
            VplError::NotInitialized => Status::NotInitialized,
            VplError::InvalidVideoParam => Status::InvalidVideoParam,
            VplError::Unsupported => Status::Unsupported,
            VplError::NotImplemented => Status::NotImplemented,
            VplError::NotFound => Status::NotFound,
            VplError::MemoryAlloc => Status::MemoryAlloc,
            VplError::NotEnoughBuffer => Status::NotEnoughBuffer,
            VplError::Aborted => Status::Aborted,
            VplError::UndefinedBehavior => Status::UndefinedBehavior,
            VplError::Unknown => Status::Unknown,
        }
    }
}

impl From<Warning> for Status {
    fn from(warning: Warning) -> Status {
        match warning {
            Warning::IncompatibleVideoParam => Status::IncompatibleVideoParam,
            Warning::VideoParamChanged => Status::VideoParamChanged,
        }
    }
}

impl<T> From<&VplResult<T>> for Status {
    fn from(result: &VplResult<T>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => Status::from(*e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_zero() {
        assert_eq!(Status::Ok.code(), 0);
        assert!(Status::Ok.is_ok());
        assert!(!Status::Ok.is_warning());
        assert!(!Status::Ok.is_error());
    }

    #[test]
    fn warnings_are_positive() {
        for w in [Warning::IncompatibleVideoParam, Warning::VideoParamChanged] {
            let status = Status::from(w);
            assert!(status.code() > 0, "{:?} must be positive", w);
            assert!(status.is_warning());
        }
        assert!(Status::MoreData.is_warning());
        assert!(Status::MoreSurface.is_warning());
    }

    #[test]
    fn errors_are_negative() {
        let errors = [
            VplError::NullPtr,
            VplError::InvalidHandle,
            VplError::NotInitialized,
            VplError::InvalidVideoParam,
            VplError::Unsupported,
            VplError::NotImplemented,
            VplError::NotFound,
            VplError::MemoryAlloc,
            VplError::NotEnoughBuffer,
            VplError::Aborted,
            VplError::UndefinedBehavior,
            VplError::Unknown,
        ];
        for e in errors {
            assert!(Status::from(e).code() < 0, "{:?} must be negative", e);
        }
    }

    #[test]
    fn codes_are_distinct() {
        let all = [
            Status::Ok,
            Status::MoreData,
            Status::MoreSurface,
            Status::IncompatibleVideoParam,
            Status::VideoParamChanged,
            Status::Unknown,
            Status::NullPtr,
            Status::Unsupported,
            Status::MemoryAlloc,
            Status::NotEnoughBuffer,
            Status::InvalidHandle,
            Status::NotInitialized,
            Status::NotFound,
            Status::Aborted,
            Status::InvalidVideoParam,
            Status::UndefinedBehavior,
            Status::NotImplemented,
        ];
        let mut codes: Vec<i32> = all.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
