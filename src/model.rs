//! Value types shared by the JUnit reader, the remote gateway and the uploader.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

/// Execution outcome of one test, as understood by Zephyr Squad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Success,
    Failed,
    NotExecuted,
    InProgress,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Success,
        OutcomeKind::Failed,
        OutcomeKind::NotExecuted,
        OutcomeKind::InProgress,
    ];

    /// Name of the matching entry in the Zephyr execution status vocabulary.
    pub fn zephyr_name(self) -> &'static str {
        match self {
            OutcomeKind::Success => "PASS",
            OutcomeKind::Failed => "FAIL",
            OutcomeKind::NotExecuted => "UNEXECUTED",
            OutcomeKind::InProgress => "WIP",
        }
    }

    pub fn from_zephyr_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.zephyr_name() == name)
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Failed => write!(f, "failed"),
            OutcomeKind::NotExecuted => write!(f, "not-executed"),
            OutcomeKind::InProgress => write!(f, "in-progress"),
        }
    }
}

/// One observed test invocation, keyed by the Jira issue it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub key: String,
    pub outcome: OutcomeKind,
    /// Becomes the execution comment.
    pub message: Option<String>,
    pub duration: Option<Duration>,
}

impl TestResult {
    pub fn new(key: impl Into<String>, outcome: OutcomeKind) -> Self {
        Self {
            key: key.into(),
            outcome,
            message: None,
            duration: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Complete mapping from outcomes to the numeric status codes of one Zephyr instance.
///
/// Only constructible when every [`OutcomeKind`] has a code, so lookups never fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatuses(BTreeMap<OutcomeKind, i64>);

impl ExecutionStatuses {
    /// Returns `None` unless all four outcomes are present.
    pub fn from_map(map: BTreeMap<OutcomeKind, i64>) -> Option<Self> {
        OutcomeKind::ALL
            .iter()
            .all(|o| map.contains_key(o))
            .then_some(Self(map))
    }

    pub fn code(&self, outcome: OutcomeKind) -> i64 {
        // Totality is checked in from_map.
        self.0[&outcome]
    }
}

/// A test cycle created for one upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub project_id: String,
    pub version_id: String,
    pub cycle_id: String,
    pub statuses: ExecutionStatuses,
}

/// The projection of a Jira issue the uploader needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: String,
    pub key: String,
    pub issue_type_id: Option<String>,
    pub issue_type_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zephyr_names_round_trip() {
        for outcome in OutcomeKind::ALL {
            assert_eq!(OutcomeKind::from_zephyr_name(outcome.zephyr_name()), Some(outcome));
        }
        assert_eq!(OutcomeKind::from_zephyr_name("BLOCKED"), None);
    }

    #[test]
    fn test_partial_statuses_rejected() {
        let mut map = BTreeMap::new();
        map.insert(OutcomeKind::Success, 1);
        map.insert(OutcomeKind::Failed, 2);
        map.insert(OutcomeKind::NotExecuted, -1);
        assert!(ExecutionStatuses::from_map(map.clone()).is_none());

        map.insert(OutcomeKind::InProgress, 3);
        let statuses = ExecutionStatuses::from_map(map).unwrap();
        assert_eq!(statuses.code(OutcomeKind::NotExecuted), -1);
    }

    #[test]
    fn test_builder_keeps_fields() {
        let r = TestResult::new("PROJ-1", OutcomeKind::Failed)
            .with_message("boom")
            .with_duration(Duration::from_millis(1500));
        assert_eq!(r.key, "PROJ-1");
        assert_eq!(r.message.as_deref(), Some("boom"));
        assert_eq!(r.duration, Some(Duration::from_millis(1500)));
    }
}
