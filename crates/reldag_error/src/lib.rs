//! Error taxonomy shared by the relational algebra DAG crates.
//!
//! Errors fall into two tiers:
//!
//! - [`RelAlgError::NotSupported`]: the plan uses a construct we don't handle
//!   (unknown operator, unsupported join type, UNION without ALL, ...). These
//!   are reported back to the user as "query not supported" and are expected
//!   during normal operation.
//! - [`RelAlgError::Internal`]: the upstream planner handed us something that
//!   violates the contract (missing fields, id/position mismatch, out of range
//!   column references). These indicate a bug somewhere and should never be
//!   retried.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum RelAlgError {
    #[error("Query not supported: {0}")]
    NotSupported(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("failed to parse relational algebra document: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelAlgError {
    pub fn not_supported(msg: impl Into<String>) -> Self {
        RelAlgError::NotSupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RelAlgError::Internal(msg.into())
    }

    /// If this error belongs to the user facing tier.
    pub const fn is_not_supported(&self) -> bool {
        matches!(self, RelAlgError::NotSupported(_))
    }

    /// If this error is a contract violation by the caller.
    ///
    /// Malformed json is treated as a contract violation too.
    pub const fn is_internal(&self) -> bool {
        matches!(self, RelAlgError::Internal(_) | RelAlgError::Json(_))
    }

    /// Attach additional context to the error message, keeping the tier.
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        match self {
            RelAlgError::NotSupported(msg) => RelAlgError::NotSupported(format!("{context}: {msg}")),
            RelAlgError::Internal(msg) => RelAlgError::Internal(format!("{context}: {msg}")),
            other => other,
        }
    }
}

pub type Result<T, E = RelAlgError> = std::result::Result<T, E>;

/// Create a `NotSupported` error using format args.
#[macro_export]
macro_rules! not_supported {
    ($($arg:tt)*) => {
        $crate::RelAlgError::NotSupported(std::format!($($arg)*))
    };
}

/// Create an `Internal` error using format args.
#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => {
        $crate::RelAlgError::Internal(std::format!($($arg)*))
    };
}

/// Return early with an `Internal` error if the condition doesn't hold.
///
/// Stands in for the assertions the planner contract relies on.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::RelAlgError::Internal(std::format!($($arg)*)));
        }
    };
}

pub trait OptionExt<T> {
    /// Return an internal error indicating that `what` was required but
    /// missing.
    fn required(self, what: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, what: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(RelAlgError::Internal(format!("Missing required value: {what}"))),
        }
    }
}

pub trait ResultExt<T> {
    /// Prefix the error message with some context.
    fn context(self, msg: &'static str) -> Result<T>;

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| e.with_context(msg))
    }

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
