//! In-memory stand-ins for the cache, the OAuth provider and the mail API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::auth::cache::CredentialCache;
use crate::auth::credential::{Credential, ScopeSet, scopes};
use crate::auth::oauth::TokenProvider;
use crate::error::{ApiError, AuthError, CacheError, RefreshError};
use crate::mail::api::{Header, MailApi, MessageMetadata, MessageQuery, MessageRef};

pub fn credential<'a>(
    access: &str,
    expires_in: Duration,
    granted: impl IntoIterator<Item = &'a str>,
) -> Credential {
    Credential {
        access_token: access.to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expires_at: Utc::now() + expires_in,
        scopes: scopes(granted),
    }
}

pub fn message(id: &str, subject: Option<&str>, from: Option<&str>) -> MessageMetadata {
    let mut headers = Vec::new();
    if let Some(s) = subject {
        headers.push(Header {
            name: "Subject".to_string(),
            value: s.to_string(),
        });
    }
    if let Some(f) = from {
        headers.push(Header {
            name: "From".to_string(),
            value: f.to_string(),
        });
    }
    MessageMetadata {
        id: id.to_string(),
        thread_id: format!("thread-{id}"),
        snippet: format!("snippet of {id}"),
        headers,
    }
}

#[derive(Default)]
struct CacheState {
    stored: Option<Credential>,
    malformed: bool,
    evictions: usize,
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    state: Arc<Mutex<CacheState>>,
}

impl MemoryCache {
    pub fn with(credential: Credential) -> Self {
        let cache = Self::default();
        cache.state.lock().unwrap().stored = Some(credential);
        cache
    }

    pub fn malformed(self) -> Self {
        self.state.lock().unwrap().malformed = true;
        self
    }

    pub fn stored(&self) -> Option<Credential> {
        self.state.lock().unwrap().stored.clone()
    }

    pub fn evictions(&self) -> usize {
        self.state.lock().unwrap().evictions
    }
}

impl CredentialCache for MemoryCache {
    fn load(&self) -> Result<Option<Credential>, CacheError> {
        let state = self.state.lock().unwrap();
        if state.malformed {
            let err = serde_json::from_str::<Credential>("{").unwrap_err();
            return Err(CacheError::Malformed(err));
        }
        Ok(state.stored.clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), CacheError> {
        let mut state = self.state.lock().unwrap();
        state.stored = Some(credential.clone());
        state.malformed = false;
        Ok(())
    }

    fn evict(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().unwrap();
        state.stored = None;
        state.malformed = false;
        state.evictions += 1;
        Ok(())
    }
}

#[derive(Default)]
struct ProviderState {
    refresh_calls: usize,
    authorize_calls: usize,
    last_scopes: Option<ScopeSet>,
    fail_refresh: bool,
    missing_secret: bool,
    granted: Option<ScopeSet>,
}

#[derive(Clone, Default)]
pub struct StubProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl StubProvider {
    pub fn failing_refresh(self) -> Self {
        self.state.lock().unwrap().fail_refresh = true;
        self
    }

    pub fn without_client_secret(self) -> Self {
        self.state.lock().unwrap().missing_secret = true;
        self
    }

    /// Hand out exactly these scopes, whatever was asked for.
    pub fn granting<'a>(self, granted: impl IntoIterator<Item = &'a str>) -> Self {
        self.state.lock().unwrap().granted = Some(scopes(granted));
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn authorize_calls(&self) -> usize {
        self.state.lock().unwrap().authorize_calls
    }

    pub fn last_authorized_scopes(&self) -> Option<ScopeSet> {
        self.state.lock().unwrap().last_scopes.clone()
    }
}

impl TokenProvider for StubProvider {
    fn refresh(&self, stale: &Credential) -> Result<Credential, RefreshError> {
        let mut state = self.state.lock().unwrap();
        state.refresh_calls += 1;
        if state.fail_refresh {
            return Err(RefreshError::Rejected("invalid_grant".to_string()));
        }
        Ok(Credential {
            access_token: format!("refreshed-{}", state.refresh_calls),
            expires_at: Utc::now() + Duration::hours(1),
            scopes: state.granted.clone().unwrap_or_else(|| stale.scopes.clone()),
            ..stale.clone()
        })
    }

    fn authorize(&self, requested: &ScopeSet) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().unwrap();
        if state.missing_secret {
            return Err(AuthError::MissingClientSecret {
                path: "credentials.json".into(),
            });
        }
        state.authorize_calls += 1;
        state.last_scopes = Some(requested.clone());
        Ok(Credential {
            access_token: format!("authorized-{}", state.authorize_calls),
            refresh_token: Some("refresh-token".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
            scopes: state.granted.clone().unwrap_or_else(|| requested.clone()),
        })
    }
}

struct ApiState {
    messages: Vec<MessageMetadata>,
    queries: Vec<MessageQuery>,
    tokens: Vec<String>,
    drafts: Vec<String>,
    draft_id: String,
    list_error: Option<ApiError>,
    get_errors: HashMap<String, ApiError>,
    draft_error: Option<ApiError>,
    reject_remaining: usize,
    calls: usize,
}

impl Default for ApiState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            queries: Vec::new(),
            tokens: Vec::new(),
            drafts: Vec::new(),
            draft_id: "draft-1".to_string(),
            list_error: None,
            get_errors: HashMap::new(),
            draft_error: None,
            reject_remaining: 0,
            calls: 0,
        }
    }
}

impl ApiState {
    /// Book-keeping shared by every call; returns the forced 401 if one is queued.
    fn enter(&mut self, token: &str) -> Result<(), ApiError> {
        self.calls += 1;
        self.tokens.push(token.to_string());
        if self.reject_remaining > 0 {
            self.reject_remaining -= 1;
            return Err(ApiError::from_status(401, "Invalid Credentials"));
        }
        Ok(())
    }
}

/// Mail API double. Listing returns stored messages in order (newest first)
/// and, like Gmail, ignores `after_id`.
#[derive(Clone, Default)]
pub struct StubApi {
    state: Arc<Mutex<ApiState>>,
}

impl StubApi {
    pub fn with_messages(messages: Vec<MessageMetadata>) -> Self {
        let api = Self::default();
        api.state.lock().unwrap().messages = messages;
        api
    }

    pub fn with_draft_id(self, id: &str) -> Self {
        self.state.lock().unwrap().draft_id = id.to_string();
        self
    }

    pub fn push_newest(&self, message: MessageMetadata) {
        self.state.lock().unwrap().messages.insert(0, message);
    }

    pub fn fail_list(&self, error: ApiError) {
        self.state.lock().unwrap().list_error = Some(error);
    }

    pub fn fail_get(&self, id: &str, error: ApiError) {
        self.state
            .lock()
            .unwrap()
            .get_errors
            .insert(id.to_string(), error);
    }

    pub fn fail_drafts(&self, error: ApiError) {
        self.state.lock().unwrap().draft_error = Some(error);
    }

    /// The next `n` calls answer 401 regardless of token.
    pub fn reject_next(&self, n: usize) {
        self.state.lock().unwrap().reject_remaining = n;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }

    pub fn last_query(&self) -> Option<MessageQuery> {
        self.state.lock().unwrap().queries.last().cloned()
    }

    pub fn drafts(&self) -> Vec<String> {
        self.state.lock().unwrap().drafts.clone()
    }
}

impl MailApi for StubApi {
    fn list_messages(
        &self,
        access_token: &str,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRef>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.enter(access_token)?;
        state.queries.push(query.clone());
        if let Some(e) = &state.list_error {
            return Err(e.clone());
        }
        Ok(state
            .messages
            .iter()
            .take(query.max_results as usize)
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
            })
            .collect())
    }

    fn get_message(&self, access_token: &str, id: &str) -> Result<MessageMetadata, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.enter(access_token)?;
        if let Some(e) = state.get_errors.get(id) {
            return Err(e.clone());
        }
        state
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ApiError::from_status(404, "Requested entity was not found."))
    }

    fn create_draft(&self, access_token: &str, raw: &str) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.enter(access_token)?;
        if let Some(e) = &state.draft_error {
            return Err(e.clone());
        }
        state.drafts.push(raw.to_string());
        Ok(state.draft_id.clone())
    }
}
