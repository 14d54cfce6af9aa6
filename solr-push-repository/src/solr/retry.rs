//! Transport error classification.

use std::error::Error as StdError;
use std::io;

/// Fragments of error text that mark a failure as transient.
const TRANSIENT_MESSAGES: &[&str] = &[
    "operation timed out",
    "connection refused",
    "timed out",
    "broken pipe",
    "connection reset",
    "no such host",
    "failed to lookup address",
    "dns error",
    "network is down",
    "network is unreachable",
];

/// Whether a failed request is worth retrying in place.
///
/// Connect errors are not transient as a class: TLS and certificate
/// failures are reported as connect errors too. Only the causes below are
/// retried.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if is_transient_io(io_err.kind()) {
                return true;
            }
        }
        if is_transient_message(&cause.to_string()) {
            return true;
        }
        source = cause.source();
    }

    is_transient_message(&err.to_string())
}

pub(crate) fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

pub(crate) fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MESSAGES.iter().any(|fragment| lower.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_io_kinds() {
        assert!(is_transient_io(io::ErrorKind::TimedOut));
        assert!(is_transient_io(io::ErrorKind::ConnectionReset));
        assert!(is_transient_io(io::ErrorKind::BrokenPipe));
        assert!(is_transient_io(io::ErrorKind::ConnectionRefused));
        assert!(!is_transient_io(io::ErrorKind::PermissionDenied));
        assert!(!is_transient_io(io::ErrorKind::InvalidData));
    }

    #[test]
    fn test_transient_messages() {
        assert!(is_transient_message("dial tcp: lookup solr: no such host"));
        assert!(is_transient_message("write: Broken pipe"));
        assert!(is_transient_message("connect: Network is down"));
        assert!(is_transient_message("Operation timed out"));
        assert!(is_transient_message("tcp connect error: Connection refused (os error 111)"));
        assert!(!is_transient_message("invalid certificate"));
        assert!(!is_transient_message("builder error: relative URL without a base"));
    }
}
