//! Back-filling of tracked test issues that received no local result.

use std::collections::BTreeSet;

use crate::model::{OutcomeKind, TestResult};

/// Outcome recorded for tracked tests that were not part of the run.
pub const RESIDUAL_OUTCOME: OutcomeKind = OutcomeKind::NotExecuted;

/// Candidate keys that were not executed in this run.
pub fn residual_keys(
    candidates: &BTreeSet<String>,
    executed: &BTreeSet<String>,
) -> BTreeSet<String> {
    candidates.difference(executed).cloned().collect()
}

/// One placeholder result per residual key.
pub fn residual_results(residual: &BTreeSet<String>) -> Vec<TestResult> {
    residual
        .iter()
        .map(|key| TestResult::new(key.clone(), RESIDUAL_OUTCOME))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_residual_is_partition_of_candidates() {
        let candidates = set(&["PROJ-1", "PROJ-2", "PROJ-3", "PROJ-4"]);
        let executed = set(&["PROJ-2", "PROJ-4", "PROJ-9"]);
        let residual = residual_keys(&candidates, &executed);

        assert_eq!(residual, set(&["PROJ-1", "PROJ-3"]));
        assert!(residual.is_disjoint(&executed));
        for key in &candidates {
            assert!(residual.contains(key) ^ executed.contains(key), "{key}");
        }
    }

    #[test]
    fn test_nothing_left_when_all_executed() {
        let candidates = set(&["PROJ-1"]);
        assert!(residual_keys(&candidates, &candidates).is_empty());
        assert!(residual_keys(&BTreeSet::new(), &candidates).is_empty());
    }

    #[test]
    fn test_residual_results_are_not_executed() {
        let results = residual_results(&set(&["PROJ-3"]));
        assert_eq!(results, vec![TestResult::new("PROJ-3", OutcomeKind::NotExecuted)]);
        assert!(results.iter().all(|r| r.message.is_none()));
    }
}
