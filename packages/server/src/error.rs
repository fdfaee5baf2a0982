//! Typed errors for the sync engine.
//!
//! Uses `thiserror` for library errors; the binary and the scheduled-job
//! boundary wrap them in `anyhow`.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Connection-level failure of a single HTTP attempt (timeout, DNS, reset).
///
/// Never escapes `ThrottledTransport`: once retries are exhausted the
/// transport reports "no response" instead.
#[derive(Debug, Clone, Error)]
#[error("transport failure: {0}")]
pub struct TransportFailure(pub String);

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect"
        } else if err.is_body() || err.is_decode() {
            "body"
        } else {
            "request"
        };
        Self(format!("{kind}: {err}"))
    }
}

/// Failure reading or writing persisted state (token record, ledger).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record in {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

/// Errors from the OAuth token lifecycle.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No access token has ever been issued.
    #[error("no access token; authorization code exchange required")]
    Unauthenticated,

    /// The token is stale and refreshing it failed for a possibly transient reason.
    #[error("access token expired and refresh failed: {reason}")]
    AuthExpired { reason: String },

    /// The refresh token was rejected; an operator must authorize again.
    #[error("re-authorization required: {reason}")]
    ReauthorizationRequired { reason: String },

    /// Authorization code exchange failed.
    #[error("authorization code exchange failed: {reason}")]
    Exchange { reason: String },
}

impl AuthError {
    /// True when only an operator-supplied authorization code can recover.
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::ReauthorizationRequired { .. }
        )
    }
}

/// Errors talking to the upstream recruitment platform.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("no response from {what}")]
    Unreachable { what: String },

    #[error("{what} still unauthorized after token refresh")]
    Unauthorized { what: String },

    #[error("access forbidden: {description} (oauth_error: {oauth_error})")]
    Forbidden {
        description: String,
        oauth_error: String,
    },

    #[error("account is not an employer: {email}")]
    NotEmployer { email: String },

    #[error("account identifier missing from profile")]
    MissingAccountId,

    #[error("{what} returned {status}: {body}")]
    Status {
        what: String,
        status: StatusCode,
        body: String,
    },

    #[error("malformed {what} payload: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    /// Failures that no amount of waiting will fix without operator action.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Auth(err) => err.requires_operator(),
            Self::Unauthorized { .. } | Self::Forbidden { .. } | Self::NotEmployer { .. } => true,
            _ => false,
        }
    }
}

/// Errors creating a lead in the CRM.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// The CRM answered but refused the record; it will not be retried.
    #[error("lead rejected: {0}")]
    Rejected(String),

    /// No usable answer from the CRM.
    #[error("CRM unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_errors() {
        assert!(AuthError::Unauthenticated.requires_operator());
        assert!(AuthError::ReauthorizationRequired {
            reason: "invalid_grant".into()
        }
        .requires_operator());
        assert!(!AuthError::AuthExpired {
            reason: "no response".into()
        }
        .requires_operator());
    }

    #[test]
    fn test_source_auth_classification() {
        let transient = SourceError::Unreachable {
            what: "postings".into(),
        };
        assert!(!transient.is_auth_failure());

        let forbidden = SourceError::Forbidden {
            description: "bad scope".into(),
            oauth_error: "".into(),
        };
        assert!(forbidden.is_auth_failure());
    }
}
