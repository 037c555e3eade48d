use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;

use crate::error::ApiError;
use crate::mail::api::{Header, MailApi, MessageMetadata, MessageQuery, MessageRef};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const MAX_ERROR_BODY: usize = 300;

/// Gmail REST v1 over blocking reqwest.
pub struct GmailApi {
    http: Client,
    base_url: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<RawMessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessageRef {
    id: String,
    #[serde(default)]
    thread_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    headers: Vec<RawHeader>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl GmailApi {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/{}/{}", self.base_url, self.user_id, path)
    }
}

/// Gmail search syntax for the query. Gmail has no operator for "ids after
/// X", so `after_id` is left to the caller.
pub fn search_query(query: &MessageQuery) -> String {
    format!("after:{}", query.after.timestamp())
}

fn validate_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ApiError::Decode(format!("invalid message id: {id:?}")));
    }
    Ok(())
}

/// Pull the human-readable message out of a Gmail error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

fn check(resp: reqwest::Result<Response>) -> Result<Response, ApiError> {
    let resp = resp.map_err(|e| ApiError::Transport(e.to_string()))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), error_message(&body)))
}

fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    resp.json().map_err(|e| ApiError::Decode(e.to_string()))
}

impl From<RawMessage> for MessageMetadata {
    fn from(raw: RawMessage) -> Self {
        let headers = raw
            .payload
            .map(|p| p.headers)
            .unwrap_or_default()
            .into_iter()
            .map(|h| Header {
                name: h.name,
                value: h.value,
            })
            .collect();
        MessageMetadata {
            id: raw.id,
            thread_id: raw.thread_id,
            snippet: raw.snippet,
            headers,
        }
    }
}

impl MailApi for GmailApi {
    fn list_messages(
        &self,
        access_token: &str,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRef>, ApiError> {
        let q = search_query(query);
        let max_results = query.max_results.to_string();
        if let Some(after_id) = &query.after_id {
            debug!("gmail cannot filter by id; {after_id} is applied client-side");
        }

        let resp = self
            .http
            .get(self.url("messages"))
            .bearer_auth(access_token)
            .query(&[
                ("q", q.as_str()),
                ("maxResults", max_results.as_str()),
            ])
            .send();
        let list: ListResponse = decode(check(resp)?)?;

        Ok(list
            .messages
            .into_iter()
            .map(|m| MessageRef {
                id: m.id,
                thread_id: m.thread_id,
            })
            .collect())
    }

    fn get_message(&self, access_token: &str, id: &str) -> Result<MessageMetadata, ApiError> {
        validate_id(id)?;

        let resp = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .bearer_auth(access_token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
            ])
            .send();
        let raw: RawMessage = decode(check(resp)?)?;
        Ok(raw.into())
    }

    fn create_draft(&self, access_token: &str, raw: &str) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.url("drafts"))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "message": { "raw": raw } }))
            .send();
        let draft: DraftResponse = decode(check(resp)?)?;
        Ok(draft.id)
    }
}
