//! Inbox triage: fetch recent Gmail messages, hand them to an external
//! classifier and save the replies it writes as drafts.

pub mod auth;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod flow;
pub mod mail;
pub mod mailbox;

#[cfg(test)]
mod testing;

pub use auth::credential::{Credential, ScopeSet};
pub use auth::store::CredentialStore;
pub use domain::email::{DraftRequest, DraftResult, EmailSummary, PollCursor};
pub use error::Error;
pub use mail::fetcher::FetchOutcome;
pub use mailbox::{InboxTools, Mailbox};
