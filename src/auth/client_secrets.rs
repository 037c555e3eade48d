use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{debug, warn};
use serde::Deserialize;

use crate::auth::secret_store;
use crate::error::AuthError;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Provider-issued OAuth client configuration (the `credentials.json` you
/// download from the Google Cloud Console).
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<RawClientSecrets>,
    web: Option<RawClientSecrets>,
}

#[derive(Deserialize)]
struct RawClientSecrets {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientSecrets {
    pub fn from_json(s: &str) -> Result<Self, AuthError> {
        let file: ClientSecretsFile =
            serde_json::from_str(s).map_err(|e| AuthError::InvalidClientSecret(e.to_string()))?;
        let raw = file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidClientSecret("expected an `installed` or `web` section".to_string())
        })?;

        if raw.client_id.trim().is_empty() {
            return Err(AuthError::InvalidClientSecret(
                "client_id is empty".to_string(),
            ));
        }

        Ok(Self {
            client_id: raw.client_id,
            client_secret: raw.client_secret.filter(|s| !s.is_empty()),
            auth_uri: raw.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URI.to_string()),
            token_uri: raw.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
        })
    }

    /// Read the configuration file. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, AuthError> {
        let s = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::InvalidClientSecret(format!(
                    "{}: {e}",
                    path.display()
                )));
            }
        };
        debug!("loaded client secrets from {}", path.display());
        Self::from_json(&s).map(Some)
    }

    /// Fill a missing secret from the keyring, then from `OAUTH_CLIENT_SECRET`.
    pub fn with_secret_fallback(mut self) -> Self {
        if self.client_secret.is_some() {
            return self;
        }
        self.client_secret = match secret_store::load_client_secret(&self.client_id) {
            Ok(Some(s)) => Some(s),
            Ok(None) => None,
            Err(e) => {
                warn!("could not read client secret from keyring: {e}");
                None
            }
        }
        .or_else(|| std::env::var("OAUTH_CLIENT_SECRET").ok());
        self
    }
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
