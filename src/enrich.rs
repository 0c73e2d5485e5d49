//! Enrichment of raw pull requests with derived review-clock fields.
//!
//! This implements the two steps every aggregation depends on:
//! 1. Resolving the canonical `opened_for_review_at` and `first_reviewed_at`
//!    timestamps from the event and review histories, honoring reopen resets.
//! 2. Classifying the pull request into lifecycle tags against the
//!    evaluation window and deriving its merge/review durations.

use crate::model::{
    EventKind, LifecycleEvent, PullRequestRecord, RawPullRequest, ReviewRecord, Tag, Window,
};
use chrono::{DateTime, Utc};

/// Computes the derived fields for one raw pull request.
///
/// If the pull request was ever reopened, events before the last reopening
/// and reviews submitted at or before it are discarded first: history before
/// that point belongs to a previous review cycle.
pub fn enrich(raw: RawPullRequest, window: &Window) -> PullRequestRecord {
    let RawPullRequest {
        id,
        number,
        repo,
        author,
        draft,
        created_at,
        merged_at,
        closed_at,
        additions,
        deletions,
        mut events,
        mut reviews,
    } = raw;

    if let Some(reopened_at) = last_reopened_at(&events) {
        events.retain(|event| event.created_at >= reopened_at);
        reviews.retain(|review| review.submitted_at > reopened_at);
    }

    let opened_for_review_at = opened_for_review(&events, merged_at, created_at);
    let first_reviewed_at = first_reviewed(&reviews, opened_for_review_at);
    let tags = classify(draft, opened_for_review_at, merged_at, window.start);

    let (time_to_merge, time_to_review) = if tags.contains(&Tag::Merged) {
        (
            merged_at.map(|merged| merged - opened_for_review_at),
            Some(first_reviewed_at.unwrap_or(opened_for_review_at) - opened_for_review_at),
        )
    } else {
        (None, None)
    };

    PullRequestRecord {
        id,
        number,
        repo,
        author,
        draft,
        created_at,
        merged_at,
        closed_at,
        additions,
        deletions,
        events,
        reviews,
        opened_for_review_at,
        first_reviewed_at,
        tags,
        time_to_merge,
        time_to_review,
    }
}

fn last_reopened_at(events: &[LifecycleEvent]) -> Option<DateTime<Utc>> {
    events
        .iter()
        .rev()
        .find(|event| event.kind == EventKind::Reopened)
        .map(|event| event.created_at)
}

/// The canonical start of the review clock, in priority order:
/// the most recent `ready_for_review` event, else the earliest
/// `review_requested` event at or before the merge time (unconditionally if
/// never merged), else the last reopening, else the creation time.
fn opened_for_review(
    events: &[LifecycleEvent],
    merged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
) -> DateTime<Utc> {
    let last_ready_for_review = events
        .iter()
        .rev()
        .find(|event| event.kind == EventKind::ReadyForReview);

    // A review requested after merging says nothing about this review cycle.
    let first_review_requested = events.iter().find(|event| {
        event.kind == EventKind::ReviewRequested
            && merged_at.map_or(true, |merged| event.created_at <= merged)
    });

    last_ready_for_review
        .or(first_review_requested)
        .or_else(|| {
            events
                .iter()
                .rev()
                .find(|event| event.kind == EventKind::Reopened)
        })
        .map(|event| event.created_at)
        .unwrap_or(created_at)
}

/// The earliest review submitted strictly after the review clock started.
///
/// A pull request whose only reviews predate `opened_for_review_at` resolves
/// to `None`; its time-to-review is zero since it was already reviewed
/// before entering the review queue.
fn first_reviewed(reviews: &[ReviewRecord], opened_for_review_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    reviews
        .iter()
        .map(|review| review.submitted_at)
        .filter(|submitted| *submitted > opened_for_review_at)
        .min()
}

/// Assigns lifecycle tags: drafts carry the draft tag alone, everything else
/// gets one age tag and one disposition tag.
pub fn classify(
    draft: bool,
    opened_for_review_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    window_start: DateTime<Utc>,
) -> Vec<Tag> {
    if draft {
        return vec![Tag::Draft];
    }

    vec![
        if opened_for_review_at < window_start {
            Tag::Old
        } else {
            Tag::New
        },
        if merged_at.is_some() {
            Tag::Merged
        } else {
            Tag::Open
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, hour, 0, 0).unwrap()
    }

    fn event(kind: EventKind, created_at: DateTime<Utc>) -> LifecycleEvent {
        LifecycleEvent { kind, created_at }
    }

    fn review(submitted_at: DateTime<Utc>) -> ReviewRecord {
        ReviewRecord {
            reviewer: "reviewer".to_string(),
            submitted_at,
        }
    }

    fn window() -> Window {
        Window {
            start: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 24, 0, 0, 0).unwrap(),
        }
    }

    fn raw() -> RawPullRequest {
        RawPullRequest {
            id: 1,
            number: 42,
            repo: "acme/widgets".to_string(),
            author: "alice".to_string(),
            draft: false,
            created_at: at(1),
            merged_at: None,
            closed_at: None,
            additions: 10,
            deletions: 5,
            events: vec![],
            reviews: vec![],
        }
    }

    #[test]
    fn test_opened_for_review_falls_back_to_creation() {
        let pr = enrich(raw(), &window());
        assert_eq!(pr.opened_for_review_at, at(1));
    }

    #[test]
    fn test_ready_for_review_wins_over_review_requested() {
        let mut input = raw();
        input.events = vec![
            event(EventKind::ReviewRequested, at(2)),
            event(EventKind::ReadyForReview, at(3)),
            event(EventKind::ReadyForReview, at(5)),
        ];
        let pr = enrich(input, &window());
        // the most recent ready_for_review, not the first
        assert_eq!(pr.opened_for_review_at, at(5));
    }

    #[test]
    fn test_earliest_review_requested_when_never_ready() {
        let mut input = raw();
        input.events = vec![
            event(EventKind::ReviewRequested, at(4)),
            event(EventKind::ReviewRequested, at(6)),
        ];
        let pr = enrich(input, &window());
        assert_eq!(pr.opened_for_review_at, at(4));
    }

    #[test]
    fn test_review_requested_after_merge_is_ignored() {
        let mut input = raw();
        input.merged_at = Some(at(5));
        input.events = vec![event(EventKind::ReviewRequested, at(7))];
        let pr = enrich(input, &window());
        // no qualifying event, falls back to creation time
        assert_eq!(pr.opened_for_review_at, at(1));
    }

    #[test]
    fn test_reopen_discards_earlier_history() {
        let mut input = raw();
        input.events = vec![
            event(EventKind::ReadyForReview, at(2)),
            event(EventKind::Reopened, at(6)),
        ];
        // review between creation and reopening belongs to the old cycle
        input.reviews = vec![review(at(3))];
        let pr = enrich(input, &window());

        assert_eq!(pr.opened_for_review_at, at(6));
        assert_eq!(pr.first_reviewed_at, None);
        assert_eq!(pr.events.len(), 1);
        assert!(pr.reviews.is_empty());
    }

    #[test]
    fn test_reopen_keeps_later_history() {
        let mut input = raw();
        input.events = vec![
            event(EventKind::Reopened, at(4)),
            event(EventKind::ReadyForReview, at(5)),
        ];
        input.reviews = vec![review(at(3)), review(at(7))];
        let pr = enrich(input, &window());

        assert_eq!(pr.opened_for_review_at, at(5));
        assert_eq!(pr.first_reviewed_at, Some(at(7)));
        assert_eq!(pr.reviews, vec![review(at(7))]);
    }

    #[test]
    fn test_first_reviewed_must_follow_opened_for_review() {
        let mut input = raw();
        input.events = vec![event(EventKind::ReadyForReview, at(5))];
        input.reviews = vec![review(at(2)), review(at(8)), review(at(9))];
        let pr = enrich(input, &window());
        assert_eq!(pr.first_reviewed_at, Some(at(8)));
    }

    #[test]
    fn test_merged_without_qualifying_review_has_zero_time_to_review() {
        let mut input = raw();
        input.merged_at = Some(at(9));
        input.events = vec![event(EventKind::ReadyForReview, at(5))];
        input.reviews = vec![review(at(2))];
        let pr = enrich(input, &window());

        assert_eq!(pr.first_reviewed_at, None);
        assert_eq!(pr.time_to_review, Some(Duration::zero()));
        assert_eq!(pr.time_to_merge, Some(Duration::hours(4)));
    }

    #[test]
    fn test_unmerged_has_no_timings() {
        let pr = enrich(raw(), &window());
        assert_eq!(pr.time_to_merge, None);
        assert_eq!(pr.time_to_review, None);
    }

    #[test]
    fn test_draft_carries_only_draft_tag() {
        let mut input = raw();
        input.draft = true;
        input.merged_at = Some(at(9));
        let pr = enrich(input, &window());
        assert_eq!(pr.tags, vec![Tag::Draft]);
        // drafts contribute no timing samples either
        assert_eq!(pr.time_to_merge, None);
    }

    #[test]
    fn test_age_and_disposition_tags() {
        let start = window().start;

        let mut merged = raw();
        merged.created_at = start - Duration::hours(2);
        merged.merged_at = Some(at(9));
        let merged = enrich(merged, &window());
        assert_eq!(merged.tags, vec![Tag::Old, Tag::Merged]);

        let open = enrich(raw(), &window());
        assert_eq!(open.tags, vec![Tag::New, Tag::Open]);
    }

    #[test]
    fn test_opened_exactly_at_window_start_is_new() {
        let mut input = raw();
        input.created_at = window().start;
        let pr = enrich(input, &window());
        assert_eq!(pr.tags, vec![Tag::New, Tag::Open]);
    }
}
