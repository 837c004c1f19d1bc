use std::fmt::{self, Display, Formatter};

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok,
    Cancelled,
    Unavailable,
    DeadlineExceeded,
    Internal,
    Unknown,
}

/// Stream-level result carried into the error callback.
///
/// A `Status` describes why a stream incarnation ended; it is produced by the
/// transport on finish or synthesized when the completion queue reports an
/// operation as failed.
#[derive(Debug, Clone)]
pub struct Status {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Bytes>,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            code: ErrorCode::Ok,
            message: "OK".to_owned(),
            details: None,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Cancelled,
            message: message.into(),
            details: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Unavailable,
            message: message.into(),
            details: None,
        }
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::DeadlineExceeded,
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: message.into(),
            details: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Unknown,
            message: message.into(),
            details: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}
