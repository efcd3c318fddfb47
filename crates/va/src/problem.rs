//! ACME problem taxonomy and transport-error classification.
//!
//! Every failed validation surfaces as a [`ProblemDetails`] on the challenge,
//! with a `kind` drawn from a closed set. The classifier here maps transport
//! failures from the HTTP and TLS connect paths onto that set; DNSSEC
//! failures never pass through it; the DNS adapter owns that signal.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Closed set of failure categories reported on invalid challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemType {
    /// The request or challenge was malformed on our side of the wire.
    #[serde(rename = "malformed")]
    Malformed,
    /// The peer responded but the proof was wrong, missing, or unsigned.
    #[serde(rename = "unauthorized")]
    Unauthorized,
    /// An internal dependency (typically DNS) could not be reached.
    #[serde(rename = "serverInternal")]
    ServerInternal,
    /// The peer could not be reached or the connection failed mid-flight.
    #[serde(rename = "connection")]
    Connection,
    /// Name resolution definitively failed for the target host.
    #[serde(rename = "unknownHost")]
    UnknownHost,
    /// The peer sent a TLS alert during the handshake.
    #[serde(rename = "tls")]
    Tls,
    /// A resolver reported a DNSSEC validation failure.
    #[serde(rename = "dnssec")]
    Dnssec,
}

impl ProblemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Unauthorized => "unauthorized",
            Self::ServerInternal => "serverInternal",
            Self::Connection => "connection",
            Self::UnknownHost => "unknownHost",
            Self::Tls => "tls",
            Self::Dnssec => "dnssec",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried by a challenge that finished `invalid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub kind: ProblemType,
    pub detail: String,
}

impl ProblemDetails {
    pub fn new(kind: ProblemType, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::Malformed, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::Unauthorized, detail)
    }

    pub fn server_internal(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::ServerInternal, detail)
    }

    pub fn dnssec(detail: impl Into<String>) -> Self {
        Self::new(ProblemType::Dnssec, detail)
    }
}

impl fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Map a failed HTTP request or TLS dial onto the problem taxonomy.
///
/// Walks the error source chain. A name-resolution failure that is neither a
/// timeout nor a temporary failure is `unknownHost`; a TLS alert received
/// from the peer is `tls`; everything else, timeouts included, collapses
/// into `connection`. This function never returns `dnssec`.
pub fn classify_connection_error(err: &(dyn StdError + 'static)) -> ProblemType {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = current {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ) {
                return ProblemType::Connection;
            }
            let rendered = io_err.to_string().to_ascii_lowercase();
            if is_resolution_failure(&rendered) {
                return if is_transient_resolution_failure(&rendered) {
                    ProblemType::Connection
                } else {
                    ProblemType::UnknownHost
                };
            }
        }
        if let Some(tls_err) = cause.downcast_ref::<rustls::Error>() {
            if matches!(tls_err, rustls::Error::AlertReceived(_)) {
                return ProblemType::Tls;
            }
        }
        current = cause.source();
    }
    ProblemType::Connection
}

// getaddrinfo failures surface as io errors with platform-worded messages;
// these cover glibc, musl, and the BSDs.
fn is_resolution_failure(message: &str) -> bool {
    message.contains("failed to lookup address")
        || message.contains("name or service not known")
        || message.contains("no such host")
        || message.contains("nodename nor servname")
        || message.contains("name resolution")
}

fn is_transient_resolution_failure(message: &str) -> bool {
    message.contains("temporary failure") || message.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_types_serialize_to_the_closed_set() {
        for (kind, expected) in [
            (ProblemType::Malformed, "\"malformed\""),
            (ProblemType::Unauthorized, "\"unauthorized\""),
            (ProblemType::ServerInternal, "\"serverInternal\""),
            (ProblemType::Connection, "\"connection\""),
            (ProblemType::UnknownHost, "\"unknownHost\""),
            (ProblemType::Tls, "\"tls\""),
            (ProblemType::Dnssec, "\"dnssec\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), expected);
        }
    }

    #[test]
    fn definitive_resolution_failure_is_unknown_host() {
        let err = io::Error::new(
            io::ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        );
        assert_eq!(classify_connection_error(&err), ProblemType::UnknownHost);
    }

    #[test]
    fn temporary_resolution_failure_is_connection() {
        let err = io::Error::new(
            io::ErrorKind::Other,
            "failed to lookup address information: Temporary failure in name resolution",
        );
        assert_eq!(classify_connection_error(&err), ProblemType::Connection);
    }

    #[test]
    fn timeouts_are_connection() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "connection timed out");
        assert_eq!(classify_connection_error(&err), ProblemType::Connection);
    }

    #[test]
    fn tls_alert_is_tls() {
        let err = rustls::Error::AlertReceived(rustls::AlertDescription::HandshakeFailure);
        assert_eq!(classify_connection_error(&err), ProblemType::Tls);
    }

    #[test]
    fn wrapped_tls_alert_is_found_through_the_chain() {
        let inner = rustls::Error::AlertReceived(rustls::AlertDescription::CloseNotify);
        let err = io::Error::new(io::ErrorKind::InvalidData, inner);
        assert_eq!(classify_connection_error(&err), ProblemType::Tls);
    }

    #[test]
    fn anything_else_is_connection() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert_eq!(classify_connection_error(&err), ProblemType::Connection);
    }
}
