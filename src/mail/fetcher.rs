use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::domain::email::{EmailSummary, NO_SUBJECT, PollCursor, UNKNOWN_SENDER};
use crate::error::FetchError;
use crate::mail::api::{MessageMetadata, MessageQuery, ServiceHandle};
use crate::mail::decoders::{header_text, snippet_text};

const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub max_results: u32,
    pub time_window_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Most recent first.
    pub emails: Vec<EmailSummary>,
    pub cursor: PollCursor,
}

/// Lists recent messages and turns them into summaries.
#[derive(Debug, Clone, Default)]
pub struct EmailFetcher;

impl EmailFetcher {
    pub fn new() -> Self {
        Self
    }

    pub fn fetch(
        &self,
        handle: &ServiceHandle,
        request: FetchRequest,
        cursor: &PollCursor,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetch_at(handle, request, cursor, Utc::now())
    }

    /// Any remote failure aborts the whole fetch: no partial summaries and
    /// no cursor movement.
    pub fn fetch_at(
        &self,
        handle: &ServiceHandle,
        request: FetchRequest,
        cursor: &PollCursor,
        now: DateTime<Utc>,
    ) -> Result<FetchOutcome, FetchError> {
        if request.max_results == 0 {
            return Err(FetchError::InvalidRequest(
                "max_results must be greater than zero".to_string(),
            ));
        }
        if request.time_window_hours == 0 {
            return Err(FetchError::InvalidRequest(
                "time_window_hours must be greater than zero".to_string(),
            ));
        }

        let after = now
            .checked_sub_signed(Duration::hours(i64::from(request.time_window_hours)))
            .ok_or_else(|| {
                FetchError::InvalidRequest(format!(
                    "time_window_hours {} reaches past the earliest representable date",
                    request.time_window_hours
                ))
            })?;

        let query = MessageQuery {
            after,
            after_id: (!cursor.is_empty()).then(|| cursor.last_seen_id.clone()),
            max_results: request.max_results,
        };

        let refs = handle.list_messages(&query)?;

        // The provider may ignore `after_id`; stop at the last message we
        // already handed out so a repeated poll doesn't return it again.
        let fresh = refs
            .into_iter()
            .take_while(|r| cursor.is_empty() || r.id != cursor.last_seen_id)
            .take(request.max_results as usize);

        let mut emails = Vec::new();
        for r in fresh {
            let meta = handle.get_message(&r.id)?;
            emails.push(summarize(meta));
        }

        let cursor = cursor.advanced_to(emails.first());
        debug!(
            "fetched {} message(s) from the last {}h; cursor at {:?}",
            emails.len(),
            request.time_window_hours,
            cursor.last_seen_id
        );

        Ok(FetchOutcome { emails, cursor })
    }
}

fn header_or(meta: &MessageMetadata, name: &str, default: &str) -> String {
    meta.header(name)
        .map(header_text)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn summarize(meta: MessageMetadata) -> EmailSummary {
    let subject = header_or(&meta, "Subject", NO_SUBJECT);
    let sender = header_or(&meta, "From", UNKNOWN_SENDER);
    let snippet = snippet_text(&meta.snippet, SNIPPET_MAX_CHARS);

    EmailSummary {
        id: meta.id,
        thread_id: meta.thread_id,
        sender,
        subject,
        snippet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::mail::api::MailServiceClient;
    use crate::testing::{StubApi, credential, message};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn handle(api: &StubApi) -> ServiceHandle {
        MailServiceClient::new(Arc::new(api.clone()))
            .for_credential(credential("tok", Duration::hours(1), ["mail"]))
    }

    fn request(max_results: u32, time_window_hours: u32) -> FetchRequest {
        FetchRequest {
            max_results,
            time_window_hours,
        }
    }

    fn inbox() -> StubApi {
        StubApi::with_messages(vec![
            message("c", Some("Re: Job"), Some("Carol <carol@example.com>")),
            message("b", Some("Proposal"), Some("bob@example.com")),
            message("a", Some("Hello"), Some("alice@example.com")),
        ])
    }

    #[test]
    fn returns_newest_first_and_advances_cursor() {
        let api = inbox();
        let outcome = EmailFetcher::new()
            .fetch(&handle(&api), request(5, 24), &PollCursor::default())
            .unwrap();

        let ids: Vec<_> = outcome.emails.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
        assert_eq!(outcome.cursor.last_seen_id, "c");
        assert_eq!(outcome.emails[0].sender, "Carol <carol@example.com>");
        assert_eq!(outcome.emails[0].subject, "Re: Job");
        assert_eq!(outcome.emails[0].thread_id, "thread-c");
    }

    #[test]
    fn query_uses_time_window_and_page_size() {
        let api = inbox();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        EmailFetcher::new()
            .fetch_at(&handle(&api), request(5, 24), &PollCursor::default(), now)
            .unwrap();

        let q = api.last_query().unwrap();
        assert_eq!(q.after, Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap());
        assert_eq!(q.max_results, 5);
        assert_eq!(q.after_id, None);
    }

    #[test]
    fn next_fetch_uses_cursor_as_lower_bound() {
        let api = inbox();
        let fetcher = EmailFetcher::new();
        let first = fetcher
            .fetch(&handle(&api), request(5, 24), &PollCursor::default())
            .unwrap();
        fetcher
            .fetch(&handle(&api), request(5, 24), &first.cursor)
            .unwrap();

        assert_eq!(api.last_query().unwrap().after_id.as_deref(), Some("c"));
    }

    #[test]
    fn repeated_fetch_without_new_mail_is_empty_and_stable() {
        let api = inbox();
        let fetcher = EmailFetcher::new();
        let cursor = fetcher
            .fetch(&handle(&api), request(5, 24), &PollCursor::default())
            .unwrap()
            .cursor;

        for _ in 0..2 {
            let again = fetcher.fetch(&handle(&api), request(5, 24), &cursor).unwrap();
            assert!(again.emails.is_empty());
            assert_eq!(again.cursor, cursor);
        }
    }

    #[test]
    fn only_messages_newer_than_cursor_are_returned() {
        let api = inbox();
        let outcome = EmailFetcher::new()
            .fetch(&handle(&api), request(5, 24), &PollCursor::new("b"))
            .unwrap();

        let ids: Vec<_> = outcome.emails.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c"]);
        assert_eq!(outcome.cursor.last_seen_id, "c");
    }

    #[test]
    fn empty_inbox_is_not_an_error() {
        let api = StubApi::with_messages(vec![]);
        let cursor = PollCursor::new("z");
        let outcome = EmailFetcher::new()
            .fetch(&handle(&api), request(10, 24), &cursor)
            .unwrap();
        assert!(outcome.emails.is_empty());
        assert_eq!(outcome.cursor, cursor);
    }

    #[test]
    fn respects_max_results() {
        let api = inbox();
        let outcome = EmailFetcher::new()
            .fetch(&handle(&api), request(2, 24), &PollCursor::default())
            .unwrap();
        assert_eq!(outcome.emails.len(), 2);
        assert_eq!(outcome.cursor.last_seen_id, "c");
    }

    #[test]
    fn missing_headers_get_placeholders() {
        let api = StubApi::with_messages(vec![message("x", None, Some("   "))]);
        let outcome = EmailFetcher::new()
            .fetch(&handle(&api), request(1, 1), &PollCursor::default())
            .unwrap();
        assert_eq!(outcome.emails[0].subject, NO_SUBJECT);
        assert_eq!(outcome.emails[0].sender, UNKNOWN_SENDER);
    }

    #[test]
    fn encoded_subject_and_escaped_snippet_are_decoded() {
        let mut m = message("x", Some("=?UTF-8?B?SGVsbG8gd8O2cmxk?="), Some("a@b.c"));
        m.snippet = "Let&#39;s talk".to_string();
        let api = StubApi::with_messages(vec![m]);
        let outcome = EmailFetcher::new()
            .fetch(&handle(&api), request(1, 1), &PollCursor::default())
            .unwrap();
        assert_eq!(outcome.emails[0].subject, "Hello wörld");
        assert_eq!(outcome.emails[0].snippet, "Let's talk");
    }

    #[test]
    fn zero_parameters_are_rejected_before_any_call() {
        let api = inbox();
        let fetcher = EmailFetcher::new();
        for req in [request(0, 24), request(5, 0)] {
            let err = fetcher
                .fetch(&handle(&api), req, &PollCursor::default())
                .unwrap_err();
            assert!(matches!(err, FetchError::InvalidRequest(_)));
        }
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn window_past_the_calendar_is_rejected_without_panicking() {
        let api = inbox();
        let err = EmailFetcher::new()
            .fetch(&handle(&api), request(5, u32::MAX), &PollCursor::default())
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn century_long_window_is_fine() {
        let api = inbox();
        let outcome = EmailFetcher::new()
            .fetch(&handle(&api), request(5, 24 * 365 * 100), &PollCursor::default())
            .unwrap();
        assert_eq!(outcome.emails.len(), 3);
    }

    #[test]
    fn list_failure_surfaces_remote_status() {
        let api = inbox();
        api.fail_list(ApiError::from_status(503, "backend unavailable"));
        let err = EmailFetcher::new()
            .fetch(&handle(&api), request(5, 24), &PollCursor::default())
            .unwrap_err();
        match err {
            FetchError::Remote(e) => assert_eq!(e.status(), Some(503)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failure_mid_fetch_discards_partial_results() {
        let api = inbox();
        api.fail_get("b", ApiError::from_status(404, "Not Found"));
        let result = EmailFetcher::new().fetch(&handle(&api), request(5, 24), &PollCursor::default());
        assert!(matches!(result, Err(FetchError::Remote(_))));
    }
}
