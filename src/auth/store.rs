use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, info, warn};

use crate::auth::cache::{CredentialCache, FileCredentialCache};
use crate::auth::credential::{Credential, ScopeSet};
use crate::auth::oauth::{OAuthProvider, TokenProvider};
use crate::config::Config;
use crate::error::{AuthError, CacheError};

/// Owns the credential for one account: in-memory copy, persisted cache and
/// the provider used to refresh or re-authorize.
///
/// One store per account/pipeline. Every acquisition runs under a single
/// mutex so that two callers never refresh or write the cache concurrently.
pub struct CredentialStore {
    cache: Box<dyn CredentialCache>,
    provider: Box<dyn TokenProvider>,
    current: Mutex<Option<Credential>>,
}

impl CredentialStore {
    pub fn new(cache: Box<dyn CredentialCache>, provider: Box<dyn TokenProvider>) -> Self {
        Self {
            cache,
            provider,
            current: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, AuthError> {
        let cache = FileCredentialCache::new(cfg.token_cache_path());
        let provider = OAuthProvider::from_config(cfg)?;
        Ok(Self::new(Box::new(cache), Box::new(provider)))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Credential>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return a valid credential covering `required`, refreshing or
    /// re-authorizing as needed.
    pub fn acquire(&self, required: &ScopeSet) -> Result<Credential, AuthError> {
        let mut current = self.lock();
        let now = Utc::now();

        let mut candidate = match current.take() {
            Some(c) if c.covers(required) => {
                if c.is_valid_at(now) {
                    *current = Some(c.clone());
                    return Ok(c);
                }
                Some(c)
            }
            Some(_) => {
                info!("cached credential lacks requested scopes; re-authorization required");
                self.cache.evict()?;
                None
            }
            None => self.load_persisted(required)?,
        };

        if let Some(c) = candidate.take() {
            if c.is_valid_at(now) {
                *current = Some(c.clone());
                return Ok(c);
            }
            if c.is_refreshable() {
                match self.provider.refresh(&c) {
                    Ok(refreshed) if refreshed.covers(required) => {
                        debug!("refreshed access token");
                        self.cache.save(&refreshed)?;
                        *current = Some(refreshed.clone());
                        return Ok(refreshed);
                    }
                    Ok(_) => {
                        warn!("refreshed credential lost requested scopes; re-authorizing");
                        self.cache.evict()?;
                    }
                    Err(e) => {
                        warn!("token refresh failed, falling back to authorization: {e}");
                        self.cache.evict()?;
                    }
                }
            } else {
                debug!("credential is unusable and has no refresh token; evicting");
                self.cache.evict()?;
            }
        }

        info!("no usable credential; starting interactive authorization");
        let fresh = self.provider.authorize(required)?;
        if !fresh.covers(required) {
            let missing: Vec<&str> = required
                .difference(&fresh.scopes)
                .map(String::as_str)
                .collect();
            return Err(AuthError::Authorization(format!(
                "granted scopes do not cover {}",
                missing.join(" ")
            )));
        }
        self.cache.save(&fresh)?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    fn load_persisted(&self, required: &ScopeSet) -> Result<Option<Credential>, AuthError> {
        let loaded = match self.cache.load() {
            Ok(loaded) => loaded,
            Err(CacheError::Malformed(e)) => {
                warn!("discarding unreadable credential cache: {e}");
                self.cache.evict()?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match loaded {
            Some(c) if !c.covers(required) => {
                info!("persisted credential lacks requested scopes; evicting");
                self.cache.evict()?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Forget the credential everywhere. The next `acquire` re-authorizes.
    pub fn invalidate(&self) -> Result<(), AuthError> {
        let mut current = self.lock();
        *current = None;
        self.cache.evict()?;
        Ok(())
    }
}
