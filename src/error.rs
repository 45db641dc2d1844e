//! Error taxonomy shared by the scanner, stores and dispatcher.
//!
//! Every module keeps its own error enum; `ErrorClass` is the coarse bucket
//! the retry and throttling logic branches on.

use std::fmt;
use std::io;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// timeout, connection reset, share unavailable. retried and throttled
    TransientIo,
    /// not retried for the same path, the path is skipped
    Permission,
    /// path vanished between enumeration and stat
    NotFound,
    /// temp write, rename or copy failed
    Persistence,
    /// missing or malformed input
    Config,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::TransientIo => "transient-io",
            ErrorClass::Permission => "permission",
            ErrorClass::NotFound => "not-found",
            ErrorClass::Persistence => "persistence",
            ErrorClass::Config => "config",
            ErrorClass::Unknown => "unknown",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::TransientIo)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// network mounts surface stalls as generic io errors, so the message is
// checked as well as the kind
const TRANSIENT_KEYWORDS: &[&str] = &[
    "timed out",
    "timeout",
    "connection",
    "unavailable",
    "disconnect",
    "stale file handle",
    "host is down",
    "smb",
    "webdav",
];

/// Sort an io error into the taxonomy.
pub fn classify_io(err: &io::Error) -> ErrorClass {
    match err.kind() {
        io::ErrorKind::NotFound => return ErrorClass::NotFound,
        io::ErrorKind::PermissionDenied => return ErrorClass::Permission,
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => return ErrorClass::TransientIo,
        _ => {}
    }

    // ESTALE (116) and EHOSTDOWN (112) on linux
    if matches!(err.raw_os_error(), Some(116) | Some(112)) {
        return ErrorClass::TransientIo;
    }

    let message = err.to_string().to_lowercase();
    if TRANSIENT_KEYWORDS.iter().any(|k| message.contains(k)) {
        ErrorClass::TransientIo
    } else {
        ErrorClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_classes() {
        let nf = io::Error::new(io::ErrorKind::NotFound, "gone");
        let perm = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let slow = io::Error::new(io::ErrorKind::TimedOut, "slow");

        assert_eq!(classify_io(&nf), ErrorClass::NotFound);
        assert_eq!(classify_io(&perm), ErrorClass::Permission);
        assert_eq!(classify_io(&slow), ErrorClass::TransientIo);
    }

    #[test]
    fn message_keywords_mark_transient() {
        let err = io::Error::new(io::ErrorKind::Other, "SMB share unavailable");
        assert_eq!(classify_io(&err), ErrorClass::TransientIo);

        let err = io::Error::new(io::ErrorKind::Other, "webdav backend hiccup");
        assert_eq!(classify_io(&err), ErrorClass::TransientIo);
    }

    #[test]
    fn other_errors_are_unknown() {
        let err = io::Error::new(io::ErrorKind::InvalidData, "bad utf8");
        assert_eq!(classify_io(&err), ErrorClass::Unknown);
    }
}
