//! Task status algebra
//!
//! Statuses are totally ordered so that composites can combine their
//! children by taking the maximum: the worst outcome wins.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of running a task
///
/// Ordered `Skipped < Success < Pending < Failure`. `Pending` doubles as
/// "inapplicable here" (no config file, no script) and as the reset state
/// of a task that is about to run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Skipped = -1,
    Success = 0,
    #[default]
    Pending = 1,
    Failure = 2,
}

impl TaskStatus {
    /// Combines two statuses, keeping the worse one
    pub fn escalate(self, other: TaskStatus) -> TaskStatus {
        self.max(other)
    }

    /// Folds a sequence of statuses on top of `floor`
    pub fn escalate_all(floor: TaskStatus, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        statuses.into_iter().fold(floor, TaskStatus::escalate)
    }

    /// Returns the numeric code of the status
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn is_failure(self) -> bool {
        self == TaskStatus::Failure
    }

    pub fn is_success(self) -> bool {
        self == TaskStatus::Success
    }

    /// Returns a display label for the status
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Skipped => "skipped",
            TaskStatus::Success => "success",
            TaskStatus::Pending => "pending",
            TaskStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Skipped),
            Just(TaskStatus::Success),
            Just(TaskStatus::Pending),
            Just(TaskStatus::Failure),
        ]
    }

    #[test]
    fn ordering_matches_codes() {
        assert!(TaskStatus::Skipped < TaskStatus::Success);
        assert!(TaskStatus::Success < TaskStatus::Pending);
        assert!(TaskStatus::Pending < TaskStatus::Failure);
        assert_eq!(TaskStatus::Skipped.code(), -1);
        assert_eq!(TaskStatus::Failure.code(), 2);
    }

    #[test]
    fn failure_wins() {
        let status = TaskStatus::escalate_all(
            TaskStatus::Success,
            [TaskStatus::Pending, TaskStatus::Failure, TaskStatus::Success],
        );
        assert_eq!(status, TaskStatus::Failure);
    }

    #[test]
    fn skipped_never_raises_success() {
        assert_eq!(
            TaskStatus::Success.escalate(TaskStatus::Skipped),
            TaskStatus::Success
        );
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Failure).unwrap();
        assert_eq!(json, "\"failure\"");
    }

    proptest! {
        #[test]
        fn escalation_is_order_independent(mut statuses in prop::collection::vec(any_status(), 0..12)) {
            let forward = TaskStatus::escalate_all(TaskStatus::Skipped, statuses.iter().copied());
            statuses.reverse();
            let backward = TaskStatus::escalate_all(TaskStatus::Skipped, statuses.iter().copied());
            prop_assert_eq!(forward, backward);
            let max = statuses.iter().copied().max().unwrap_or(TaskStatus::Skipped);
            prop_assert_eq!(forward, max);
        }

        #[test]
        fn escalation_is_associative(a in any_status(), b in any_status(), c in any_status()) {
            prop_assert_eq!(a.escalate(b).escalate(c), a.escalate(b.escalate(c)));
        }

        #[test]
        fn skipped_is_a_floor(statuses in prop::collection::vec(any_status(), 1..8)) {
            let with = TaskStatus::escalate_all(TaskStatus::Skipped, statuses.iter().copied().chain([TaskStatus::Skipped]));
            let without = TaskStatus::escalate_all(TaskStatus::Skipped, statuses.iter().copied());
            prop_assert_eq!(with, without);
        }
    }
}
