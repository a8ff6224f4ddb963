//! Error taxonomy for the driver.
//!
//! Four classes cover everything that can go wrong talking to the
//! instrument. `Connection` and `Timeout` come from the transport,
//! `Protocol` from reply decoding, `Validation` from local parameter
//! checks before anything is transmitted. A measurement the instrument
//! cannot produce is not an error at all; it is reported as a tagged
//! value (see `devices::sds1202x::measurement::MeasuredValue`).

use std::io::ErrorKind;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScopeError>;

#[derive(Error, Debug)]
pub enum ScopeError {
    /// Backend-level failure: resource unreachable, not addressable by the
    /// backend, or already claimed by another session. Recoverable by
    /// retrying `connect`, possibly after the other holder releases.
    #[error("connection error: {0}")]
    Connection(String),

    /// No reply within the configured window. The in-flight command may or
    /// may not have been applied; close and reopen the connection before
    /// further use.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A reply that does not match the expected grammar for its command
    /// family. Usually a firmware/command mismatch; never retried.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Caller-supplied parameter rejected before any command was sent.
    #[error("validation error: {0}")]
    Validation(String),
}

impl ScopeError {
    /// Classify an OS-level I/O failure. Timeouts are their own class
    /// because the in-flight command's effect on the instrument is unknown.
    pub(crate) fn from_io(err: &std::io::Error, timeout: Duration) -> ScopeError {
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ScopeError::Timeout(timeout),
            _ => ScopeError::Connection(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_timeout_classifies_as_timeout() {
        let err = std::io::Error::new(ErrorKind::TimedOut, "deadline");
        match ScopeError::from_io(&err, Duration::from_secs(10)) {
            ScopeError::Timeout(t) => assert_eq!(t, Duration::from_secs(10)),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn wouldblock_classifies_as_timeout() {
        let err = std::io::Error::new(ErrorKind::WouldBlock, "deadline");
        assert!(matches!(
            ScopeError::from_io(&err, Duration::from_secs(1)),
            ScopeError::Timeout(_)
        ));
    }

    #[test]
    fn other_io_failures_classify_as_connection() {
        let err = std::io::Error::new(ErrorKind::ConnectionReset, "peer reset");
        match ScopeError::from_io(&err, Duration::from_secs(1)) {
            ScopeError::Connection(msg) => assert!(msg.contains("peer reset")),
            other => panic!("expected Connection, got {:?}", other),
        }
    }
}
