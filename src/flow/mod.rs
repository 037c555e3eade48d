pub mod command;

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::domain::email::{DraftRequest, EmailId, EmailSummary, PollCursor};
use crate::mailbox::InboxTools;

/// What the classifier is given for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct TriageTask {
    pub topic: String,
    pub emails: Vec<EmailSummary>,
}

/// Decides which emails deserve a reply and writes the replies. Opaque to
/// this crate: typically a language model behind some process boundary.
pub trait Classifier {
    fn triage(&self, task: &TriageTask) -> Result<Vec<DraftRequest>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub drafted: usize,
    pub failed: usize,
}

/// One pass of fetch, classify, draft.
///
/// The flow owns its poll cursor and only moves it once the classifier has
/// answered, so a failed classification sees the same emails next cycle.
/// Ids handed to the classifier are remembered until they age out of the
/// fetch window, since the cursor is only best-effort.
pub struct TriageFlow {
    topic: String,
    max_results: u32,
    time_window_hours: u32,
    cursor: PollCursor,
    checked: HashMap<EmailId, DateTime<Utc>>,
}

impl TriageFlow {
    pub fn new(topic: impl Into<String>, max_results: u32, time_window_hours: u32) -> Self {
        Self {
            topic: topic.into(),
            max_results,
            time_window_hours,
            cursor: PollCursor::default(),
            checked: HashMap::new(),
        }
    }

    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }

    pub fn cursor(&self) -> &PollCursor {
        &self.cursor
    }

    pub fn run_cycle(
        &mut self,
        inbox: &dyn InboxTools,
        classifier: &dyn Classifier,
    ) -> Result<CycleReport> {
        self.run_cycle_at(inbox, classifier, Utc::now())
    }

    pub fn run_cycle_at(
        &mut self,
        inbox: &dyn InboxTools,
        classifier: &dyn Classifier,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        self.forget_older_than_window(now);

        let outcome = inbox
            .fetch_since(&self.cursor, self.max_results, self.time_window_hours)
            .context("fetching recent emails")?;

        let mut report = CycleReport {
            fetched: outcome.emails.len(),
            ..CycleReport::default()
        };

        let fresh: Vec<EmailSummary> = outcome
            .emails
            .into_iter()
            .filter(|e| !self.checked.contains_key(&e.id))
            .collect();
        report.new = fresh.len();
        if fresh.is_empty() {
            info!(
                "no new emails in the last {} hours",
                self.time_window_hours
            );
            self.cursor = outcome.cursor;
            return Ok(report);
        }

        let ids: Vec<EmailId> = fresh.iter().map(|e| e.id.clone()).collect();
        let task = TriageTask {
            topic: self.topic.clone(),
            emails: fresh,
        };
        let requests = classifier.triage(&task).context("classifying emails")?;
        self.checked.extend(ids.into_iter().map(|id| (id, now)));
        self.cursor = outcome.cursor;

        for (request, result) in requests.iter().zip(inbox.create_drafts(&requests)) {
            match result {
                Ok(r) if r.is_success() => {
                    report.drafted += 1;
                    info!(
                        "drafted reply to {} ({})",
                        request.to,
                        r.draft_id().unwrap_or_default()
                    );
                }
                Ok(r) => {
                    report.failed += 1;
                    warn!(
                        "draft to {} failed: {}",
                        request.to,
                        r.error_detail().unwrap_or_default()
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("draft to {} rejected: {e}", request.to);
                }
            }
        }

        info!(
            "cycle done: {} fetched, {} new, {} drafted, {} failed",
            report.fetched, report.new, report.drafted, report.failed
        );
        Ok(report)
    }

    /// A message first seen before the window opened was received before it
    /// too, so the fetch can no longer return it.
    fn forget_older_than_window(&mut self, now: DateTime<Utc>) {
        let Some(horizon) =
            now.checked_sub_signed(Duration::hours(i64::from(self.time_window_hours)))
        else {
            return;
        };
        let before = self.checked.len();
        self.checked.retain(|_, seen| *seen >= horizon);
        if self.checked.len() < before {
            debug!("forgot {} checked id(s)", before - self.checked.len());
        }
    }
}
