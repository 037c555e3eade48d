use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result as AnyResult};
use log::warn;

use crate::auth::credential::{ScopeSet, scopes};
use crate::auth::store::CredentialStore;
use crate::config::Config;
use crate::domain::email::{DraftRequest, DraftResult, EmailSummary, PollCursor};
use crate::error::{AuthError, Error};
use crate::mail::api::{MailServiceClient, ServiceHandle};
use crate::mail::drafts::{self, DraftCreator};
use crate::mail::fetcher::{EmailFetcher, FetchOutcome, FetchRequest};
use crate::mail::gmail::GmailApi;

/// The two operations the classification side is allowed to call.
pub trait InboxTools {
    /// Messages that arrived since the previous call (within the window),
    /// newest first.
    fn fetch_recent_emails(
        &self,
        max_results: u32,
        time_window_hours: u32,
    ) -> Result<Vec<EmailSummary>, Error>;

    /// Same fetch against a cursor the caller owns. Nothing is remembered
    /// here; the caller decides when the returned cursor takes effect.
    fn fetch_since(
        &self,
        cursor: &PollCursor,
        max_results: u32,
        time_window_hours: u32,
    ) -> Result<FetchOutcome, Error>;

    fn submit_draft(&self, request: &DraftRequest) -> Result<DraftResult, Error>;

    fn create_draft(&self, to: &str, subject: &str, body: &str) -> Result<DraftResult, Error> {
        self.submit_draft(&DraftRequest::new(to, subject, body))
    }

    /// One result per request; a failure never stops the remaining drafts.
    fn create_drafts(&self, requests: &[DraftRequest]) -> Vec<Result<DraftResult, Error>> {
        requests.iter().map(|r| self.submit_draft(r)).collect()
    }
}

/// Single-account inbox access: credential store, API client and poll cursor.
pub struct Mailbox {
    store: CredentialStore,
    client: MailServiceClient,
    fetcher: EmailFetcher,
    drafts: DraftCreator,
    scopes: ScopeSet,
    cursor: Mutex<PollCursor>,
}

impl Mailbox {
    pub fn new(store: CredentialStore, client: MailServiceClient, scopes: ScopeSet) -> Self {
        Self {
            store,
            client,
            fetcher: EmailFetcher::new(),
            drafts: DraftCreator::new(),
            scopes,
            cursor: Mutex::new(PollCursor::default()),
        }
    }

    pub fn from_config(cfg: &Config) -> AnyResult<Self> {
        let store = CredentialStore::from_config(cfg).context("setting up credential store")?;
        let api = GmailApi::new(&cfg.api_base_url, &cfg.user_id)
            .context("building Gmail HTTP client")?;
        Ok(Self::new(
            store,
            MailServiceClient::new(Arc::new(api)),
            scopes(cfg.scopes.iter().cloned()),
        ))
    }

    pub fn with_cursor(self, cursor: PollCursor) -> Self {
        *self.lock_cursor() = cursor;
        self
    }

    pub fn cursor(&self) -> PollCursor {
        self.lock_cursor().clone()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    fn lock_cursor(&self) -> MutexGuard<'_, PollCursor> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self) -> Result<ServiceHandle, AuthError> {
        let credential = self.store.acquire(&self.scopes)?;
        Ok(self.client.for_credential(credential))
    }

    /// Drop the rejected credential and bind a freshly authorized one.
    fn reauthenticated_handle(&self) -> Result<ServiceHandle, AuthError> {
        self.store.invalidate()?;
        self.handle()
    }
}

impl InboxTools for Mailbox {
    fn fetch_recent_emails(
        &self,
        max_results: u32,
        time_window_hours: u32,
    ) -> Result<Vec<EmailSummary>, Error> {
        // Held for the whole fetch: one fetch per mailbox at a time.
        let mut cursor = self.lock_cursor();
        let outcome = self.fetch_since(&cursor, max_results, time_window_hours)?;
        *cursor = outcome.cursor;
        Ok(outcome.emails)
    }

    fn fetch_since(
        &self,
        cursor: &PollCursor,
        max_results: u32,
        time_window_hours: u32,
    ) -> Result<FetchOutcome, Error> {
        let request = FetchRequest {
            max_results,
            time_window_hours,
        };

        let handle = self.handle()?;
        let outcome = match self.fetcher.fetch(&handle, request, cursor) {
            Err(e) if e.is_unauthorized() => {
                warn!("mail API rejected the credential; re-authenticating once: {e}");
                let handle = self.reauthenticated_handle()?;
                self.fetcher.fetch(&handle, request, cursor)?
            }
            other => other?,
        };
        Ok(outcome)
    }

    fn submit_draft(&self, request: &DraftRequest) -> Result<DraftResult, Error> {
        // Reject bad input before touching credentials or the network.
        drafts::validate(request)?;

        let handle = self.handle()?;
        let result = match self.drafts.create(&handle, request)? {
            DraftResult::Failed(e) if e.is_unauthorized() => {
                warn!("mail API rejected the credential; re-authenticating once: {e}");
                let handle = self.reauthenticated_handle()?;
                self.drafts.create(&handle, request)?
            }
            result => result,
        };
        Ok(result)
    }
}
