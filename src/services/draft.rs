//! Client-side recovery rules for in-progress answers.
//!
//! The browser keeps a durable local draft keyed by attempt id and merges it
//! with the server state once per session. These functions are the merge
//! rules and autosave timings that client follows, kept here so they are
//! shared with the server's published hints and covered by tests.

use std::time::{Duration, Instant};

use crate::dto::public_dto::{AttemptState, AutosaveHints, SaveAnswersRequest};
use crate::models::attempt::JsonMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosavePolicy {
    /// Periodic save while the attempt is open.
    pub interval: Duration,
    /// Quiet period after the last edit before an edit-triggered save.
    pub debounce: Duration,
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            debounce: Duration::from_millis(800),
        }
    }
}

impl AutosavePolicy {
    pub fn new(interval: Duration, debounce: Duration) -> Self {
        Self { interval, debounce }
    }

    pub fn hints(&self) -> AutosaveHints {
        AutosaveHints {
            interval_seconds: self.interval.as_secs(),
            debounce_ms: self.debounce.as_millis() as u64,
        }
    }

    /// When the next save should fire: the debounce deadline of a pending
    /// edit or the periodic tick, whichever comes first.
    pub fn next_save_at(&self, last_save: Instant, pending_edit: Option<Instant>) -> Instant {
        let periodic = last_save + self.interval;
        match pending_edit {
            Some(edit) => periodic.min(edit + self.debounce),
            None => periodic,
        }
    }
}

/// Session-start recovery: server values win on collision, the local draft
/// only fills questions the server has no answer for.
pub fn overlay(server: &JsonMap, local_draft: &JsonMap) -> JsonMap {
    let mut merged = server.clone();
    for (question_id, answer) in local_draft {
        if !merged.contains_key(question_id) {
            merged.insert(question_id.clone(), answer.clone());
        }
    }
    merged
}

/// Builds the retry after a version conflict: the caller's unsynced edits
/// laid over the authoritative answers, against the authoritative version.
pub fn reconcile_after_conflict(
    current: &AttemptState,
    local_edits: &JsonMap,
    auto_save_data: JsonMap,
) -> SaveAnswersRequest {
    let mut answers = current.answers.clone();
    for (question_id, answer) in local_edits {
        answers.insert(question_id.clone(), answer.clone());
    }
    SaveAnswersRequest {
        answers,
        auto_save_data,
        expected_version: current.version,
    }
}
