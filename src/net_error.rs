//! Transport-level error codes and their classification sets

use std::fmt;
use std::fmt::Write;
use std::str::FromStr;

const CODE_PREFIX: &str = "net::ERR_";

/// Connection-level failure reported for a request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NetErrorCode {
    SocketNotConnected,
    ConnectionClosed,
    ConnectionReset,
    ConnectionRefused,
    ConnectionTimedOut,
    ConnectionFailed,
    NetworkAccessDenied,
    BlockedByResponse,
    BlockedByClient,
    Aborted,
    Failed,
    CertCommonNameInvalid,
    CertAuthorityInvalid,
    CertDateInvalid,
    NetworkChanged,
    NameNotResolved,
    UnknownUrlScheme,
    Other(String),
}

/// Which of the classification sets a code falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Often a scheme mismatch or a blip rather than a dead host
    Connection,
    /// The site or the client refused automated access
    AccessRestricted,
    /// TLS certificate problems
    Certificate,
    Unclassified,
}

impl NetErrorCode {
    pub fn name(&self) -> &str {
        match self {
            NetErrorCode::SocketNotConnected => "SOCKET_NOT_CONNECTED",
            NetErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            NetErrorCode::ConnectionReset => "CONNECTION_RESET",
            NetErrorCode::ConnectionRefused => "CONNECTION_REFUSED",
            NetErrorCode::ConnectionTimedOut => "CONNECTION_TIMED_OUT",
            NetErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            NetErrorCode::NetworkAccessDenied => "NETWORK_ACCESS_DENIED",
            NetErrorCode::BlockedByResponse => "BLOCKED_BY_RESPONSE",
            NetErrorCode::BlockedByClient => "BLOCKED_BY_CLIENT",
            NetErrorCode::Aborted => "ABORTED",
            NetErrorCode::Failed => "FAILED",
            NetErrorCode::CertCommonNameInvalid => "CERT_COMMON_NAME_INVALID",
            NetErrorCode::CertAuthorityInvalid => "CERT_AUTHORITY_INVALID",
            NetErrorCode::CertDateInvalid => "CERT_DATE_INVALID",
            NetErrorCode::NetworkChanged => "NETWORK_CHANGED",
            NetErrorCode::NameNotResolved => "NAME_NOT_RESOLVED",
            NetErrorCode::UnknownUrlScheme => "UNKNOWN_URL_SCHEME",
            NetErrorCode::Other(name) => name.as_str(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            NetErrorCode::SocketNotConnected
            | NetErrorCode::ConnectionClosed
            | NetErrorCode::ConnectionReset
            | NetErrorCode::ConnectionRefused
            | NetErrorCode::ConnectionTimedOut => ErrorClass::Connection,
            NetErrorCode::NetworkAccessDenied
            | NetErrorCode::BlockedByResponse
            | NetErrorCode::BlockedByClient
            | NetErrorCode::Aborted
            | NetErrorCode::Failed => ErrorClass::AccessRestricted,
            NetErrorCode::CertCommonNameInvalid
            | NetErrorCode::CertAuthorityInvalid
            | NetErrorCode::CertDateInvalid => ErrorClass::Certificate,
            _ => ErrorClass::Unclassified,
        }
    }

    /// Map an HTTP client failure to the closest transport code.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            return NetErrorCode::UnknownUrlScheme;
        }

        if err.is_timeout() {
            return NetErrorCode::ConnectionTimedOut;
        }

        if let Some(code) = io_error_code(err) {
            return code;
        }

        let chain = report(err).to_lowercase();

        if chain.contains("certificate") {
            if chain.contains("expired") || chain.contains("notvalidyet") || chain.contains("not yet valid") {
                return NetErrorCode::CertDateInvalid;
            }
            if chain.contains("notvalidforname") || chain.contains("hostname") || chain.contains("not valid for") {
                return NetErrorCode::CertCommonNameInvalid;
            }
            return NetErrorCode::CertAuthorityInvalid;
        }

        if chain.contains("dns error") || chain.contains("failed to lookup address") {
            return NetErrorCode::NameNotResolved;
        }

        if chain.contains("connection refused") {
            return NetErrorCode::ConnectionRefused;
        }

        if chain.contains("connection reset") {
            return NetErrorCode::ConnectionReset;
        }

        if chain.contains("connection closed") || chain.contains("incomplete message") {
            return NetErrorCode::ConnectionClosed;
        }

        if err.is_connect() {
            return NetErrorCode::ConnectionFailed;
        }

        NetErrorCode::Failed
    }
}

impl fmt::Display for NetErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CODE_PREFIX, self.name())
    }
}

impl FromStr for NetErrorCode {
    type Err = std::convert::Infallible;

    /// Accepts `net::ERR_CONNECTION_REFUSED`, `ERR_CONNECTION_REFUSED` or `CONNECTION_REFUSED`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_prefix("net::").unwrap_or(name);
        let name = name.strip_prefix("ERR_").unwrap_or(name);

        Ok(match name.to_uppercase().as_str() {
            "SOCKET_NOT_CONNECTED" => NetErrorCode::SocketNotConnected,
            "CONNECTION_CLOSED" => NetErrorCode::ConnectionClosed,
            "CONNECTION_RESET" => NetErrorCode::ConnectionReset,
            "CONNECTION_REFUSED" => NetErrorCode::ConnectionRefused,
            "CONNECTION_TIMED_OUT" => NetErrorCode::ConnectionTimedOut,
            "CONNECTION_FAILED" => NetErrorCode::ConnectionFailed,
            "NETWORK_ACCESS_DENIED" => NetErrorCode::NetworkAccessDenied,
            "BLOCKED_BY_RESPONSE" => NetErrorCode::BlockedByResponse,
            "BLOCKED_BY_CLIENT" => NetErrorCode::BlockedByClient,
            "ABORTED" => NetErrorCode::Aborted,
            "FAILED" => NetErrorCode::Failed,
            "CERT_COMMON_NAME_INVALID" => NetErrorCode::CertCommonNameInvalid,
            "CERT_AUTHORITY_INVALID" => NetErrorCode::CertAuthorityInvalid,
            "CERT_DATE_INVALID" => NetErrorCode::CertDateInvalid,
            "NETWORK_CHANGED" => NetErrorCode::NetworkChanged,
            "NAME_NOT_RESOLVED" => NetErrorCode::NameNotResolved,
            "UNKNOWN_URL_SCHEME" => NetErrorCode::UnknownUrlScheme,
            other => NetErrorCode::Other(other.to_string()),
        })
    }
}

impl From<&str> for NetErrorCode {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(code) => code,
            Err(never) => match never {},
        }
    }
}

/// Names of the codes whose verdicts are worth another attempt.
pub fn retryable_code_names() -> [&'static str; 6] {
    [
        "SOCKET_NOT_CONNECTED",
        "CONNECTION_CLOSED",
        "CONNECTION_RESET",
        "CONNECTION_REFUSED",
        "CONNECTION_TIMED_OUT",
        "NETWORK_CHANGED",
    ]
}

fn io_error_code(err: &reqwest::Error) -> Option<NetErrorCode> {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            let code = match io.kind() {
                ErrorKind::ConnectionRefused => NetErrorCode::ConnectionRefused,
                ErrorKind::ConnectionReset => NetErrorCode::ConnectionReset,
                ErrorKind::ConnectionAborted => NetErrorCode::ConnectionClosed,
                ErrorKind::NotConnected => NetErrorCode::SocketNotConnected,
                ErrorKind::TimedOut => NetErrorCode::ConnectionTimedOut,
                ErrorKind::PermissionDenied => NetErrorCode::NetworkAccessDenied,
                _ => {
                    source = cause.source();
                    continue;
                }
            };
            return Some(code);
        }
        source = cause.source();
    }
    None
}

/// Flatten an error and its causes into one line.
fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_prefixes() {
        assert_eq!(NetErrorCode::from("net::ERR_CONNECTION_REFUSED"), NetErrorCode::ConnectionRefused);
        assert_eq!(NetErrorCode::from("ERR_CONNECTION_RESET"), NetErrorCode::ConnectionReset);
        assert_eq!(NetErrorCode::from("cert_date_invalid"), NetErrorCode::CertDateInvalid);
        assert_eq!(
            NetErrorCode::from("net::ERR_TOO_MANY_REDIRECTS"),
            NetErrorCode::Other("TOO_MANY_REDIRECTS".to_string())
        );
    }

    #[test]
    fn test_display_round_trips_name() {
        assert_eq!(NetErrorCode::ConnectionRefused.to_string(), "net::ERR_CONNECTION_REFUSED");
        assert_eq!(
            NetErrorCode::Other("TOO_MANY_REDIRECTS".to_string()).to_string(),
            "net::ERR_TOO_MANY_REDIRECTS"
        );
    }

    #[test]
    fn test_classification_sets() {
        for code in ["SOCKET_NOT_CONNECTED", "CONNECTION_CLOSED", "CONNECTION_RESET", "CONNECTION_REFUSED", "CONNECTION_TIMED_OUT"] {
            assert_eq!(NetErrorCode::from(code).class(), ErrorClass::Connection, "{}", code);
        }
        for code in ["NETWORK_ACCESS_DENIED", "BLOCKED_BY_RESPONSE", "BLOCKED_BY_CLIENT", "ABORTED", "FAILED"] {
            assert_eq!(NetErrorCode::from(code).class(), ErrorClass::AccessRestricted, "{}", code);
        }
        for code in ["CERT_COMMON_NAME_INVALID", "CERT_AUTHORITY_INVALID", "CERT_DATE_INVALID"] {
            assert_eq!(NetErrorCode::from(code).class(), ErrorClass::Certificate, "{}", code);
        }
        assert_eq!(NetErrorCode::NameNotResolved.class(), ErrorClass::Unclassified);
        assert_eq!(NetErrorCode::NetworkChanged.class(), ErrorClass::Unclassified);
    }
}
