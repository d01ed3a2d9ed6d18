//! Error taxonomy and stable error codes for the ledger

use crate::types::BucketId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed input: bad IP/CIDR, non-IPv4, prefix out of bounds,
    /// `start > end`, oversized child, empty update.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Proposed range is not a subset of its required container.
    #[error("range must stay within {0}")]
    Containment(String),
    /// Exact duplicate of an existing bucket.
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Another mutation currently holds this bucket id.
    #[error("bucket {id} is being modified by another request")]
    Busy { id: BucketId },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn bucket_not_found(id: BucketId) -> Self {
        Error::NotFound(format!("bucket {id}"))
    }

    /// Prefix the message while keeping the variant.
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Error::Validation(m) => Error::Validation(format!("{ctx}: {m}")),
            Error::Containment(m) => Error::Containment(format!("{m} for {ctx}")),
            Error::Conflict(m) => Error::Conflict(format!("{ctx}: {m}")),
            Error::NotFound(m) => Error::NotFound(format!("{ctx}: {m}")),
            other => other,
        }
    }

    pub fn code(&self) -> ErrorCode {
        map_error(self)
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Validation = 1,
    Containment = 2,
    Conflict = 3,
    NotFound = 4,
    Busy = 5,
    Storage = 6,
    Config = 7,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation",
            ErrorCode::Containment => "containment",
            ErrorCode::Conflict => "conflict",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Busy => "busy",
            ErrorCode::Storage => "storage",
            ErrorCode::Config => "config",
        }
    }
}

pub fn map_error(e: &Error) -> ErrorCode {
    match e {
        Error::Validation(_) => ErrorCode::Validation,
        Error::Containment(_) => ErrorCode::Containment,
        Error::Conflict(_) => ErrorCode::Conflict,
        Error::NotFound(_) => ErrorCode::NotFound,
        Error::Busy { .. } => ErrorCode::Busy,
        Error::Storage(_) => ErrorCode::Storage,
        Error::Config(_) => ErrorCode::Config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::validation("x").code() as u8, 1);
        assert_eq!(Error::Containment("parent".into()).code(), ErrorCode::Containment);
        assert_eq!(Error::Busy { id: 3 }.code().as_str(), "busy");
        assert_eq!(Error::bucket_not_found(9).to_string(), "not found: bucket 9");
    }
}
