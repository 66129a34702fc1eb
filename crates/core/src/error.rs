//! Unified error types for ringside.
//!
//! Every variant renders with a stable upper-case code prefix so hosts can
//! surface it to clients and logs without re-mapping.

use tokio_rusqlite::rusqlite;

/// Unified error types for the offline cache router and its hosts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty queue name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No cache entry found for the given request.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// The network request failed before a response arrived.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// The network did not answer within the allotted time.
    #[error("NETWORK_TIMEOUT: {0}")]
    NetworkTimeout(String),

    /// Response body exceeded the configured limit.
    #[error("RESPONSE_TOO_LARGE: {0}")]
    ResponseTooLarge(String),

    /// A manifest entry could not be cached, so the install step failed.
    #[error("INSTALL_FAILED: {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    /// The worker is not in a state that allows the requested transition.
    #[error("INVALID_STATE: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// A sync event carried a tag no handler is registered for.
    #[error("UNKNOWN_SYNC_TAG: {0}")]
    UnknownSyncTag(String),

    /// A background sync handler did not complete; the tag should be redelivered.
    #[error("SYNC_FAILED: {tag}: {reason}")]
    SyncFailed { tag: String, reason: String },

    /// No listener is registered for the dispatched event kind.
    #[error("NO_LISTENER: {0}")]
    NoListener(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::CacheMiss(_) => "CACHE_MISS",
            Error::Database(_) | Error::MigrationFailed(_) | Error::CorruptEntry(_) => "CACHE_ERROR",
            Error::Network(_) => "NETWORK_ERROR",
            Error::NetworkTimeout(_) => "NETWORK_TIMEOUT",
            Error::ResponseTooLarge(_) => "RESPONSE_TOO_LARGE",
            Error::InstallFailed { .. } => "INSTALL_FAILED",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::UnknownSyncTag(_) => "UNKNOWN_SYNC_TAG",
            Error::SyncFailed { .. } => "SYNC_FAILED",
            Error::NoListener(_) => "NO_LISTENER",
        }
    }

    /// HTTP status a host should answer with when this error ends a request.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::InvalidUrl(_) | Error::UnknownSyncTag(_) => 400,
            Error::CacheMiss(_) => 404,
            Error::InvalidState { .. } => 409,
            Error::Network(_) | Error::ResponseTooLarge(_) => 502,
            Error::SyncFailed { .. } => 503,
            Error::NetworkTimeout(_) => 504,
            Error::Database(_)
            | Error::MigrationFailed(_)
            | Error::CorruptEntry(_)
            | Error::InstallFailed { .. }
            | Error::NoListener(_) => 500,
        }
    }

    /// Whether this error means the network could not be reached.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::NetworkTimeout(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InstallFailed { url: "/about".into(), reason: "status 404".into() };
        assert!(err.to_string().starts_with("INSTALL_FAILED"));
        assert!(err.to_string().contains("/about"));
    }

    #[test]
    fn test_error_code_matches_display_prefix() {
        let errors = [
            Error::Network("connection refused".into()),
            Error::NetworkTimeout("5000ms".into()),
            Error::UnknownSyncTag("bogus".into()),
            Error::SyncFailed { tag: "analytics-sync".into(), reason: "offline".into() },
            Error::MigrationFailed("bad".into()),
        ];
        for err in errors {
            assert!(err.to_string().starts_with(err.code()), "{err}");
        }
    }

    #[test]
    fn test_http_status() {
        assert_eq!(Error::NetworkTimeout("x".into()).http_status(), 504);
        assert_eq!(Error::Network("x".into()).http_status(), 502);
        assert_eq!(Error::UnknownSyncTag("x".into()).http_status(), 400);
    }

    #[test]
    fn test_is_network() {
        assert!(Error::Network("x".into()).is_network());
        assert!(Error::NetworkTimeout("x".into()).is_network());
        assert!(!Error::CacheMiss("x".into()).is_network());
    }
}
