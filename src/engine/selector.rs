//! Work selection - pure functions over the tracker's ready list
//!
//! The tracker already returns ready items ordered by priority (highest
//! first) and then age (oldest first); selection only takes from the front.
//! [`readiness_order`] spells out that ordering for trackers and tests that
//! need to produce it.

use crate::types::MergeRequest;
use std::cmp::Ordering;

/// Ordering contract for ready items: priority descending, then oldest first
pub fn readiness_order(a: &MergeRequest, b: &MergeRequest) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Best candidate from a tracker-ordered ready list
pub fn select_next(ready: &[MergeRequest]) -> Option<&MergeRequest> {
    ready.first()
}

/// Up to `slots` candidates from the front of a tracker-ordered ready list
pub fn select_batch(ready: Vec<MergeRequest>, slots: usize) -> Vec<MergeRequest> {
    ready.into_iter().take(slots.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssueStatus;
    use chrono::{Duration, Utc};

    fn mr(id: &str, priority: u32, age_hours: i64) -> MergeRequest {
        MergeRequest {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            status: IssueStatus::Open,
            priority,
            issue_type: "merge-request".to_string(),
            created_at: Utc::now() - Duration::hours(age_hours),
            assignee: None,
            notes: None,
        }
    }

    #[test]
    fn test_older_wins_priority_tie() {
        let mut items = vec![mr("new", 5, 1), mr("old", 5, 10)];
        items.sort_by(readiness_order);
        assert_eq!(select_next(&items).unwrap().id, "old");
    }

    #[test]
    fn test_higher_priority_beats_age() {
        let mut items = vec![mr("old-p5", 5, 100), mr("new-p9", 9, 0), mr("mid-p5", 5, 50)];
        items.sort_by(readiness_order);
        let ids: Vec<_> = items.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new-p9", "old-p5", "mid-p5"]);
    }

    #[test]
    fn test_select_next_takes_front_without_reordering() {
        let items = vec![mr("b", 1, 1), mr("a", 9, 9)];
        assert_eq!(select_next(&items).unwrap().id, "b");
        assert!(select_next(&[]).is_none());
    }

    #[test]
    fn test_select_batch_bounds() {
        let items = vec![mr("a", 1, 1), mr("b", 1, 1), mr("c", 1, 1)];
        assert_eq!(select_batch(items.clone(), 2).len(), 2);
        assert_eq!(select_batch(items.clone(), 0).len(), 1);
        assert_eq!(select_batch(items, 10).len(), 3);
        assert!(select_batch(Vec::new(), 4).is_empty());
    }
}
