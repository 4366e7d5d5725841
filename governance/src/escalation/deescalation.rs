//! Success-streak rule for moving a task type back down one tier.

use crate::escalation::attempt::TaskHistory;

/// Number of trailing tasks that must all be clean successes.
pub const DE_ESCALATION_WINDOW: usize = 3;

/// True only when each of the last three tasks succeeded on its first
/// attempt. Older entries are never looked at.
pub fn consider_de_escalation(history: &[TaskHistory]) -> bool {
    if history.len() < DE_ESCALATION_WINDOW {
        return false;
    }
    history[history.len() - DE_ESCALATION_WINDOW..]
        .iter()
        .all(TaskHistory::is_clean_success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::attempt::TaskOutcome;

    fn history(entries: &[(TaskOutcome, u32)]) -> Vec<TaskHistory> {
        entries
            .iter()
            .enumerate()
            .map(|(i, (outcome, used))| TaskHistory::new(format!("task-{i}"), "T2", *outcome, *used))
            .collect()
    }

    #[test]
    fn test_needs_three_entries() {
        assert!(!consider_de_escalation(&[]));
        assert!(!consider_de_escalation(&history(&[
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
        ])));
    }

    #[test]
    fn test_single_retry_disqualifies() {
        let h = history(&[
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 2),
        ]);
        assert!(!consider_de_escalation(&h));
    }

    #[test]
    fn test_clean_window() {
        let h = history(&[
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
        ]);
        assert!(consider_de_escalation(&h));
    }

    #[test]
    fn test_only_trailing_window_counts() {
        let h = history(&[
            (TaskOutcome::Failure, 3),
            (TaskOutcome::Success, 4),
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
        ]);
        assert!(consider_de_escalation(&h));

        let h = history(&[
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
            (TaskOutcome::Success, 1),
            (TaskOutcome::Failure, 1),
        ]);
        assert!(!consider_de_escalation(&h));
    }
}
