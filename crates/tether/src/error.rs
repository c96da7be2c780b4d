// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by every layer of the framework.
//!
//! Every failure maps onto an errno-family integer so it can travel as the
//! leading 32-bit code of a reply. `code()` and `from_code()` are the two
//! ends of that mapping; unknown codes received from a peer round-trip
//! through [`Error::Remote`].

use thiserror::Error;

/// Errno values used on the wire (Linux numbering, as `std::errc` maps them).
const EPERM: i32 = 1;
const EIO: i32 = 5;
const EINVAL: i32 = 22;
const ERANGE: i32 = 34;
const EBADMSG: i32 = 74;
const EOPNOTSUPP: i32 = 95;
const ENOTCONN: i32 = 107;
const ETIMEDOUT: i32 = 110;
const EALREADY: i32 = 114;
const ENOTRECOVERABLE: i32 = 131;

/// Framework error.
///
/// The variants mirror the reply codes of the wire protocol; `code()` yields
/// the integer that crosses the network.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed identifier string, missing port, absent input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Closed socket; the normal outcome of a cancelled blocking call.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Reply deadline exceeded.
    #[error("timed out")]
    TimedOut,

    /// Command not in the dispatch table, or a non-create command against an
    /// uninitialized session.
    #[error("operation not supported")]
    NotSupported,

    /// Create command against an already-present session.
    #[error("connection already in progress")]
    AlreadyInProgress,

    /// Schema violation in the decoder (e.g. fixed-array length mismatch).
    #[error("bad message: {0}")]
    BadMessage(String),

    /// Input-buffer overrun.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Write to a released output buffer. Unrepresentable with the Rust
    /// buffer API; the code stays reserved for wire compatibility.
    #[error("operation not permitted")]
    NotPermitted,

    /// Panic caught at a fault barrier.
    #[error("state not recoverable: {0}")]
    NotRecoverable(String),

    /// Transport failure without a more specific meaning.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Non-zero reply code outside the known set.
    #[error("remote error code {0}")]
    Remote(i32),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The errno-space integer carried as the leading reply code.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => EINVAL,
            Error::NotConnected(_) => ENOTCONN,
            Error::TimedOut => ETIMEDOUT,
            Error::NotSupported => EOPNOTSUPP,
            Error::AlreadyInProgress => EALREADY,
            Error::BadMessage(_) => EBADMSG,
            Error::OutOfRange(_) => ERANGE,
            Error::NotPermitted => EPERM,
            Error::NotRecoverable(_) => ENOTRECOVERABLE,
            Error::Io(_) => EIO,
            Error::Remote(code) => *code,
        }
    }

    /// Rebuild an error from a non-zero wire code.
    pub fn from_code(code: i32) -> Self {
        match code {
            EINVAL => Error::InvalidArgument("reported by peer".into()),
            ENOTCONN => Error::NotConnected("reported by peer".into()),
            ETIMEDOUT => Error::TimedOut,
            EOPNOTSUPP => Error::NotSupported,
            EALREADY => Error::AlreadyInProgress,
            EBADMSG => Error::BadMessage("reported by peer".into()),
            ERANGE => Error::OutOfRange("reported by peer".into()),
            EPERM => Error::NotPermitted,
            ENOTRECOVERABLE => Error::NotRecoverable("reported by peer".into()),
            other => Error::Remote(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip_for_known_errors() {
        let errors = [
            Error::InvalidArgument("x".into()),
            Error::NotConnected("x".into()),
            Error::TimedOut,
            Error::NotSupported,
            Error::AlreadyInProgress,
            Error::BadMessage("x".into()),
            Error::OutOfRange("x".into()),
            Error::NotPermitted,
            Error::NotRecoverable("x".into()),
        ];
        for err in errors {
            let code = err.code();
            assert_ne!(code, 0);
            assert_eq!(Error::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let err = Error::from_code(9999);
        assert!(matches!(err, Error::Remote(9999)));
        assert_eq!(err.code(), 9999);
    }

    #[test]
    fn test_display_mentions_kind() {
        assert!(Error::TimedOut.to_string().contains("timed out"));
        assert!(Error::NotSupported.to_string().contains("not supported"));
        let err = Error::NotConnected("closed".into());
        assert!(err.to_string().contains("closed"));
    }
}
