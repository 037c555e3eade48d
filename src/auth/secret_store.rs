//! OAuth client secrets kept in the OS keyring, one entry per client id.
//! Access and refresh tokens live in the file cache, not here.

use keyring::{Entry, Error as KeyringError};
use log::debug;

use crate::error::SecretStoreError;

pub const SERVICE: &str = "inbox_triage";

/// Surrounding whitespace from a paste is dropped; nothing left means no
/// secret.
fn usable(secret: &str) -> Option<&str> {
    Some(secret.trim()).filter(|s| !s.is_empty())
}

pub fn save_client_secret(client_id: &str, client_secret: &str) -> Result<(), SecretStoreError> {
    let secret = usable(client_secret).ok_or_else(|| SecretStoreError::Empty {
        client_id: client_id.to_string(),
    })?;
    Entry::new(SERVICE, client_id)?.set_password(secret)?;
    debug!("stored client secret for {client_id} in keyring");
    Ok(())
}

/// `Ok(None)` when the keyring has no (or a blank) entry for `client_id`.
pub fn load_client_secret(client_id: &str) -> Result<Option<String>, SecretStoreError> {
    match Entry::new(SERVICE, client_id)?.get_password() {
        Ok(v) => Ok(usable(&v).map(str::to_string)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pasted_secret_is_trimmed() {
        assert_eq!(usable("  GOCSPX-abc\n"), Some("GOCSPX-abc"));
        assert_eq!(usable(" \n\t"), None);
    }

    #[test]
    fn blank_secret_is_refused_before_the_keyring() {
        let err = save_client_secret("id.apps.googleusercontent.com", "  \n").unwrap_err();
        assert!(matches!(err, SecretStoreError::Empty { .. }));
        assert!(err.to_string().contains("id.apps.googleusercontent.com"));
    }
}
