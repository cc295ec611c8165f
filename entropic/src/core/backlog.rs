//! FIFO task backlog rules.

use crate::core::types::StepPlan;

/// Characters of the head task compared against a plan goal when the plan
/// carries no explicit `closes_task`.
const PREFIX_MATCH_CHARS: usize = 20;

/// Append each non-blank task not already present (exact text). Returns how
/// many were added.
pub fn append_unique_tasks<'a>(
    tasks: &mut Vec<String>,
    new_tasks: impl IntoIterator<Item = &'a String>,
) -> usize {
    let mut added = 0;
    for task in new_tasks {
        if task.trim().is_empty() || tasks.contains(task) {
            continue;
        }
        tasks.push(task.clone());
        added += 1;
    }
    added
}

/// Whether `step` closes the current backlog head.
pub fn closes_head(tasks: &[String], step: &StepPlan) -> bool {
    let Some(head) = tasks.first() else {
        return false;
    };
    match &step.closes_task {
        Some(task) => task == head,
        None => {
            let prefix: String = head
                .trim()
                .to_lowercase()
                .chars()
                .take(PREFIX_MATCH_CHARS)
                .collect();
            step.step_goal.trim().to_lowercase().starts_with(&prefix)
        }
    }
}

/// Pop the head when `succeeded` and `step` closes it.
pub fn pop_if_closed(tasks: &mut Vec<String>, step: &StepPlan, succeeded: bool) -> Option<String> {
    if succeeded && closes_head(tasks, step) {
        Some(tasks.remove(0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::step_plan;

    fn tasks(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn append_dedups_exact_text_only() {
        let mut backlog = tasks(&["Add tests"]);
        let added = append_unique_tasks(
            &mut backlog,
            &tasks(&["Add tests", "add tests", "  ", "Write docs", "Write docs"]),
        );
        assert_eq!(added, 2);
        assert_eq!(backlog, tasks(&["Add tests", "add tests", "Write docs"]));
    }

    #[test]
    fn explicit_reference_must_equal_head() {
        let backlog = tasks(&["Implement parser", "Ship"]);
        let mut step = step_plan("Something unrelated");
        step.closes_task = Some("Implement parser".to_string());
        assert!(closes_head(&backlog, &step));

        step.closes_task = Some("Ship".to_string());
        assert!(!closes_head(&backlog, &step));
    }

    #[test]
    fn fallback_compares_twenty_char_prefix_case_insensitively() {
        let backlog = tasks(&["Implement the tokenizer for expressions"]);
        assert!(closes_head(&backlog, &step_plan("IMPLEMENT THE TOKENIZ and more")));
        assert!(!closes_head(&backlog, &step_plan("Implement a tokenizer")));
    }

    #[test]
    fn pop_requires_success() {
        let mut backlog = tasks(&["Implement parser", "Ship"]);
        let mut step = step_plan("Implement parser");
        step.closes_task = Some("Implement parser".to_string());

        assert_eq!(pop_if_closed(&mut backlog, &step, false), None);
        assert_eq!(backlog.len(), 2);
        assert_eq!(
            pop_if_closed(&mut backlog, &step, true),
            Some("Implement parser".to_string())
        );
        assert_eq!(backlog, tasks(&["Ship"]));
    }

    #[test]
    fn empty_backlog_never_pops() {
        let mut backlog = Vec::new();
        assert_eq!(pop_if_closed(&mut backlog, &step_plan("x"), true), None);
    }
}
