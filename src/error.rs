//! Error types shared across the credential, fetch and draft layers.

use std::path::PathBuf;

/// Top-level error for the orchestrator-facing surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Credential acquisition failures. These halt the current cycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(
        "client secret configuration not found at {}; download credentials.json from the Google Cloud Console and save it there",
        .path.display()
    )]
    MissingClientSecret { path: PathBuf },

    #[error("invalid client secret configuration: {0}")]
    InvalidClientSecret(String),

    #[error("authorization flow failed: {0}")]
    Authorization(String),

    #[error("credential cache: {0}")]
    Cache(#[from] CacheError),
}

/// Why a refresh attempt did not yield a credential. Never fatal on its own:
/// the store falls back to interactive authorization.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("credential has no refresh token")]
    NoRefreshToken,

    #[error("client secret configuration is missing")]
    MissingClientSecret,

    #[error("token endpoint rejected the refresh: {0}")]
    Rejected(String),

    #[error("token refresh request failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed credential record: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("client secret for {client_id} is empty")]
    Empty { client_id: String },

    #[error("keyring: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Error surfaced by the remote mail API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The API refused the bearer token even though it looked valid locally.
    #[error("authorization rejected ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("remote error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 401 {
            ApiError::Unauthorized { status, message }
        } else {
            ApiError::Status { status, message }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { status, .. } | ApiError::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),

    #[error("remote call failed: {0}")]
    Remote(#[from] ApiError),
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Remote(e) if e.is_unauthorized())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("draft field `{0}` must not be empty")]
    EmptyField(&'static str),
}

#[derive(Debug, thiserror::Error)]
#[error("draft creation failed: {0}")]
pub struct DraftSubmissionError(#[from] pub ApiError);

impl DraftSubmissionError {
    pub fn is_unauthorized(&self) -> bool {
        self.0.is_unauthorized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_is_unauthorized() {
        let e = ApiError::from_status(401, "Invalid Credentials");
        assert!(e.is_unauthorized());
        assert_eq!(e.status(), Some(401));
    }

    #[test]
    fn other_statuses_are_plain_remote_errors() {
        let e = ApiError::from_status(500, "backend");
        assert!(!e.is_unauthorized());
        assert_eq!(e.status(), Some(500));
        assert!(!FetchError::from(e).is_unauthorized());
    }

    #[test]
    fn missing_client_secret_explains_what_to_do() {
        let e = AuthError::MissingClientSecret {
            path: PathBuf::from("/tmp/credentials.json"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/credentials.json"));
        assert!(msg.contains("credentials.json"));
    }
}
