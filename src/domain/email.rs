use serde::{Deserialize, Serialize};

use crate::error::DraftSubmissionError;

/// Gmail message ids are opaque strings.
pub type EmailId = String;

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Normalized view of one message, handed to the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: EmailId,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
}

/// Fetch progress marker. An empty id means nothing has been polled yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCursor {
    pub last_seen_id: EmailId,
}

impl PollCursor {
    pub fn new(last_seen_id: impl Into<EmailId>) -> Self {
        Self {
            last_seen_id: last_seen_id.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen_id.is_empty()
    }

    /// Cursor after a fetch: moves to the newest message, or stays put when
    /// nothing was returned.
    pub fn advanced_to(&self, newest: Option<&EmailSummary>) -> Self {
        match newest {
            Some(email) => Self::new(email.id.clone()),
            None => self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl DraftRequest {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Outcome of a single draft submission. Remote failures land in `Failed`
/// so that one bad draft never aborts the rest of a batch.
#[derive(Debug)]
pub enum DraftResult {
    Created { draft_id: String },
    Failed(DraftSubmissionError),
}

impl DraftResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DraftResult::Created { .. })
    }

    pub fn draft_id(&self) -> Option<&str> {
        match self {
            DraftResult::Created { draft_id } => Some(draft_id),
            DraftResult::Failed(_) => None,
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        match self {
            DraftResult::Created { .. } => None,
            DraftResult::Failed(e) => Some(e.to_string()),
        }
    }
}
