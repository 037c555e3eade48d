use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::credential::Credential;
use crate::domain::email::EmailId;
use crate::error::ApiError;

/// Parameters for a message listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub after: DateTime<Utc>,
    /// Best-effort lower bound; providers that can't express it ignore it.
    pub after_id: Option<EmailId>,
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: EmailId,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageMetadata {
    pub id: EmailId,
    pub thread_id: String,
    pub snippet: String,
    pub headers: Vec<Header>,
}

impl MessageMetadata {
    /// First header with `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// The operations this crate consumes from the remote mail provider.
pub trait MailApi: Send + Sync {
    /// Newest first.
    fn list_messages(
        &self,
        access_token: &str,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRef>, ApiError>;

    fn get_message(&self, access_token: &str, id: &str) -> Result<MessageMetadata, ApiError>;

    /// `raw` is the base64url-encoded RFC 5322 message. Returns the draft id.
    fn create_draft(&self, access_token: &str, raw: &str) -> Result<String, ApiError>;
}

/// Binds credentials to the remote API. Holds no state of its own.
#[derive(Clone)]
pub struct MailServiceClient {
    api: Arc<dyn MailApi>,
}

impl MailServiceClient {
    pub fn new(api: Arc<dyn MailApi>) -> Self {
        Self { api }
    }

    pub fn for_credential(&self, credential: Credential) -> ServiceHandle {
        ServiceHandle {
            api: self.api.clone(),
            credential,
        }
    }
}

/// An authenticated view of the mail API for one credential.
pub struct ServiceHandle {
    api: Arc<dyn MailApi>,
    credential: Credential,
}

impl ServiceHandle {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRef>, ApiError> {
        self.api.list_messages(&self.credential.access_token, query)
    }

    pub fn get_message(&self, id: &str) -> Result<MessageMetadata, ApiError> {
        self.api.get_message(&self.credential.access_token, id)
    }

    pub fn create_draft(&self, raw: &str) -> Result<String, ApiError> {
        self.api.create_draft(&self.credential.access_token, raw)
    }
}
