//! Summary aggregation — one pass over a fetched batch of tasks.
//!
//! Produces the [`TaskSummary`] snapshot every attached surface (keys,
//! dials, touch strips) reads. Rebuilt wholesale per refresh, never patched
//! incrementally.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::ranking::{normalize_priority_label, priority_sort_index};
use crate::types::{GroupKey, MetricId, MetricsOrderInput, Task, TaskSummary};

/// Priority slugs always treated as "this is a meeting", regardless of the
/// configured override.
const MEETING_SLUGS: [&str; 2] = ["meeting", "meetings"];

/// Case/whitespace-insensitive status comparison key.
fn status_key(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Whether a task counts as completed against the configured done value.
/// A task with no status label is never considered completed.
pub fn is_done(task: &Task, done_value: &str) -> bool {
    task.status
        .as_deref()
        .map(|s| status_key(s) == status_key(done_value))
        .unwrap_or(false)
}

/// The canonical task order: due date ascending (absent due strictly last),
/// then priority rank, then case-insensitive title. Position-indexed
/// surfaces assign tasks to numbered key slots from this order.
pub fn sort_tasks(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(compare_tasks);
    tasks
}

fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    // ISO-8601 is lexicographically monotonic, so plain string compare is
    // a correct date compare.
    let by_due = match (a.due.as_deref(), b.due.as_deref()) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_due
        .then_with(|| {
            priority_sort_index(a.priority.as_deref())
                .cmp(&priority_sort_index(b.priority.as_deref()))
        })
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
}

fn is_meeting_tagged(task: &Task, override_slug: &str) -> bool {
    let Some(priority) = task.priority.as_deref() else {
        return false;
    };
    let slug = normalize_priority_label(priority);
    if slug.is_empty() {
        return false;
    }
    slug == override_slug || MEETING_SLUGS.contains(&slug.as_str())
}

/// Candidate replacement rule for next-meeting selection: only a strictly
/// earlier due date displaces the current candidate, so equal-due meetings
/// resolve to first-found in input order. Absent due counts as latest.
fn is_strictly_earlier(candidate: &Task, current: &Task) -> bool {
    match (candidate.due.as_deref(), current.due.as_deref()) {
        (Some(new), Some(old)) => new < old,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Sanitize a caller-supplied metrics order: case-insensitive match against
/// the known identifiers, unknown entries dropped, duplicates dropped
/// keeping first occurrence, empty result replaced by the full default set.
pub fn sanitize_metrics_order(input: &MetricsOrderInput) -> Vec<MetricId> {
    let entries: Vec<String> = match input {
        MetricsOrderInput::List(items) => items.clone(),
        MetricsOrderInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };

    let mut order = Vec::new();
    for entry in &entries {
        if let Some(metric) = MetricId::parse(entry) {
            if !order.contains(&metric) {
                order.push(metric);
            }
        }
    }

    if order.is_empty() {
        MetricId::ALL.to_vec()
    } else {
        order
    }
}

/// Fold a fetched batch into one summary snapshot. Single linear pass;
/// input order only matters for meeting due-date ties. This function does
/// not fail — malformed inputs degrade to empty groupings, an absent next
/// meeting, and the default metrics order.
pub fn build_summary(
    tasks: &[Task],
    done_value: &str,
    meeting_priority: &str,
    metrics_order: &MetricsOrderInput,
) -> TaskSummary {
    let override_slug = normalize_priority_label(meeting_priority);

    let mut completed = 0usize;
    let mut active_tasks: Vec<Task> = Vec::new();
    let mut by_pillar: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let mut by_project: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let mut next_meeting: Option<Task> = None;

    for task in tasks {
        if is_done(task, done_value) {
            completed += 1;
            continue;
        }

        *by_pillar
            .entry(GroupKey::from_label(task.pillar.as_deref()))
            .or_insert(0) += 1;
        *by_project
            .entry(GroupKey::from_label(task.project.as_deref()))
            .or_insert(0) += 1;

        if is_meeting_tagged(task, &override_slug) {
            let replace = match &next_meeting {
                None => true,
                Some(current) => is_strictly_earlier(task, current),
            };
            if replace {
                next_meeting = Some(task.clone());
            }
        }

        active_tasks.push(task.clone());
    }

    let active_tasks = sort_tasks(active_tasks);

    // No meeting-tagged task at all: fall back to the earliest-sorted
    // active task rather than leaving the slot empty.
    if next_meeting.is_none() {
        next_meeting = active_tasks.first().cloned();
    }

    TaskSummary {
        total: tasks.len(),
        completed,
        active: active_tasks.len(),
        active_tasks,
        by_pillar,
        by_project,
        next_meeting,
        meeting_priority: meeting_priority.to_string(),
        metrics_order: sanitize_metrics_order(metrics_order),
        generated_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            priority: None,
            status: None,
            pillar: None,
            project: None,
            due: None,
            url: None,
        }
    }

    fn task_full(
        id: &str,
        title: &str,
        priority: Option<&str>,
        due: Option<&str>,
        status: Option<&str>,
    ) -> Task {
        Task {
            priority: priority.map(str::to_string),
            due: due.map(str::to_string),
            status: status.map(str::to_string),
            ..task(id, title)
        }
    }

    #[test]
    fn test_is_done_case_and_space_insensitive() {
        let t = task_full("1", "a", None, None, Some("  DONE "));
        assert!(is_done(&t, "done"));
        assert!(!is_done(&t, "In Progress"));
        assert!(!is_done(&task("2", "b"), "Done"));
    }

    #[test]
    fn test_sort_missing_due_goes_last() {
        let sorted = sort_tasks(vec![
            task_full("a", "No date", Some("1st"), None, None),
            task_full("b", "Dated", None, Some("2024-12-31"), None),
        ]);
        assert_eq!(sorted[0].id, "b");
        assert_eq!(sorted[1].id, "a");
    }

    #[test]
    fn test_sort_priority_breaks_due_ties() {
        let sorted = sort_tasks(vec![
            task_full("a", "Alpha", Some("3rd"), Some("2024-09-03"), None),
            task_full("b", "Beta", Some("1st"), Some("2024-09-03"), None),
        ]);
        assert_eq!(sorted[0].id, "b");
    }

    #[test]
    fn test_sort_title_breaks_remaining_ties_case_insensitive() {
        let sorted = sort_tasks(vec![
            task_full("a", "zebra", Some("1st"), Some("2024-09-03"), None),
            task_full("b", "Apple", Some("1st"), Some("2024-09-03"), None),
        ]);
        assert_eq!(sorted[0].id, "b");
    }

    // The full ordering scenario: a dated meeting first, then two
    // 1st-priority tasks by title, then the 3rd-priority task.
    #[test]
    fn test_sort_composite_scenario() {
        let sorted = sort_tasks(vec![
            task_full("t1", "Write report", Some("3rd"), Some("2024-09-03"), None),
            task_full("t2", "Review budget", Some("1st"), Some("2024-09-03"), None),
            task_full("t3", "Answer emails", Some("1st"), Some("2024-09-03"), None),
            task_full("t4", "Standup", Some("Meetings"), Some("2024-09-02"), None),
        ]);
        let ids: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t4", "t3", "t2", "t1"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let batch = vec![
            task_full("a", "One", Some("5th"), None, None),
            task_full("b", "Two", None, Some("2024-01-01"), None),
            task_full("c", "Three", Some("1st"), Some("2024-01-01"), None),
        ];
        let once = sort_tasks(batch);
        let twice = sort_tasks(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_build_summary_counts_add_up() {
        let batch = vec![
            task_full("a", "A", None, None, Some("Done")),
            task_full("b", "B", None, None, Some("In Progress")),
            task_full("c", "C", None, None, None),
            task_full("d", "D", None, None, Some("done ")),
        ];
        let s = build_summary(&batch, "Done", "Meetings", &MetricsOrderInput::default());
        assert_eq!(s.total, 4);
        assert_eq!(s.completed, 2);
        assert_eq!(s.active, 2);
        assert_eq!(s.total, s.completed + s.active);
        assert_eq!(s.by_pillar.values().sum::<usize>(), s.active);
        assert_eq!(s.by_project.values().sum::<usize>(), s.active);
        assert!(!s.active_tasks.iter().any(|t| t.id == "a" || t.id == "d"));
    }

    #[test]
    fn test_build_summary_groupings() {
        let mut b = task("b", "B");
        b.pillar = Some("Health".to_string());
        b.project = Some("Launch".to_string());
        let mut c = task("c", "C");
        c.pillar = Some("Health".to_string());
        let batch = vec![b, c, task("d", "D")];

        let s = build_summary(&batch, "Done", "Meetings", &MetricsOrderInput::default());
        assert_eq!(
            s.by_pillar.get(&GroupKey::Labeled("Health".to_string())),
            Some(&2)
        );
        assert_eq!(s.by_pillar.get(&GroupKey::Unlabeled), Some(&1));
        assert_eq!(
            s.by_project.get(&GroupKey::Labeled("Launch".to_string())),
            Some(&1)
        );
        assert_eq!(s.by_project.get(&GroupKey::Unlabeled), Some(&2));
    }

    #[test]
    fn test_build_summary_next_meeting_earliest_due() {
        let batch = vec![
            task_full("a", "Later sync", Some("Meetings"), Some("2024-09-05"), None),
            task_full("b", "Standup", Some("meeting"), Some("2024-09-02"), None),
            task_full("c", "Chore", Some("1st"), Some("2024-09-01"), None),
        ];
        let s = build_summary(&batch, "Done", "Meetings", &MetricsOrderInput::default());
        assert_eq!(s.next_meeting.as_ref().map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn test_build_summary_meeting_override_matches() {
        let batch = vec![task_full(
            "a",
            "1:1",
            Some("Sync Time"),
            Some("2024-09-05"),
            None,
        )];
        let s = build_summary(&batch, "Done", "sync-time", &MetricsOrderInput::default());
        assert_eq!(s.next_meeting.as_ref().map(|t| t.id.as_str()), Some("a"));
        assert_eq!(s.meeting_priority, "sync-time");
    }

    #[test]
    fn test_build_summary_meeting_tie_first_wins() {
        // Equal due dates: the running candidate only updates on a strictly
        // earlier date, so the first one in input order sticks.
        let batch = vec![
            task_full("a", "Zed sync", Some("Meetings"), Some("2024-09-02"), None),
            task_full("b", "Alpha sync", Some("Meetings"), Some("2024-09-02"), None),
        ];
        let s = build_summary(&batch, "Done", "Meetings", &MetricsOrderInput::default());
        assert_eq!(s.next_meeting.as_ref().map(|t| t.id.as_str()), Some("a"));
    }

    #[test]
    fn test_build_summary_completed_meeting_not_a_candidate() {
        let batch = vec![
            task_full("a", "Old sync", Some("Meetings"), Some("2024-09-01"), Some("Done")),
            task_full("b", "Chore", None, Some("2024-09-03"), None),
        ];
        let s = build_summary(&batch, "Done", "Meetings", &MetricsOrderInput::default());
        // Falls through to the sorted-active fallback.
        assert_eq!(s.next_meeting.as_ref().map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn test_build_summary_fallback_to_first_sorted_active() {
        let batch = vec![
            task_full("a", "B task", Some("2nd"), Some("2024-09-03"), None),
            task_full("b", "A task", Some("1st"), Some("2024-09-03"), None),
            task_full("c", "C task", None, None, None),
        ];
        let s = build_summary(&batch, "Done", "Meetings", &MetricsOrderInput::default());
        assert!(s.next_meeting.is_some());
        assert_eq!(
            s.next_meeting.as_ref().map(|t| t.id.as_str()),
            s.active_tasks.first().map(|t| t.id.as_str())
        );
        assert_eq!(s.next_meeting.unwrap().id, "b");
    }

    #[test]
    fn test_build_summary_empty_batch() {
        let s = build_summary(&[], "Done", "Meetings", &MetricsOrderInput::default());
        assert_eq!(s.total, 0);
        assert!(s.active_tasks.is_empty());
        assert!(s.next_meeting.is_none());
        assert!(s.by_pillar.is_empty());
        assert_eq!(s.metrics_order, MetricId::ALL.to_vec());
    }

    #[test]
    fn test_build_summary_idempotent_modulo_timestamp() {
        let batch = vec![
            task_full("a", "One", Some("3rd"), Some("2024-09-03"), None),
            task_full("b", "Two", Some("Meetings"), Some("2024-09-02"), None),
            task_full("c", "Three", None, None, Some("Done")),
        ];
        let input = MetricsOrderInput::Csv("active,total".to_string());
        let first = build_summary(&batch, "Done", "Meetings", &input);
        let second = build_summary(&batch, "Done", "Meetings", &input);
        assert_eq!(first.active_tasks, second.active_tasks);
        assert_eq!(first.by_pillar, second.by_pillar);
        assert_eq!(first.by_project, second.by_project);
        assert_eq!(first.next_meeting, second.next_meeting);
        assert_eq!(first.metrics_order, second.metrics_order);
    }

    #[test]
    fn test_sanitize_metrics_order_drops_unknown_and_dupes() {
        let input = MetricsOrderInput::Csv("total,bogus,active,total".to_string());
        assert_eq!(
            sanitize_metrics_order(&input),
            vec![MetricId::Total, MetricId::Active]
        );
    }

    #[test]
    fn test_sanitize_metrics_order_list_input() {
        let input = MetricsOrderInput::List(vec![
            "Meeting".to_string(),
            " pillar ".to_string(),
            "nope".to_string(),
        ]);
        assert_eq!(
            sanitize_metrics_order(&input),
            vec![MetricId::Meeting, MetricId::Pillar]
        );
    }

    #[test]
    fn test_sanitize_metrics_order_empty_falls_back_to_default() {
        assert_eq!(
            sanitize_metrics_order(&MetricsOrderInput::Csv("bogus,,".to_string())),
            MetricId::ALL.to_vec()
        );
        assert_eq!(
            sanitize_metrics_order(&MetricsOrderInput::default()),
            MetricId::ALL.to_vec()
        );
    }
}
