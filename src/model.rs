//! Domain records for one metrics run.
//!
//! Raw pull requests arrive from the fetch layer with their full event and
//! review histories attached; enrichment turns them into immutable
//! `PullRequestRecord`s carrying the derived review-clock fields the
//! aggregators consume.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle category labels assigned to a pull request.
///
/// A draft pull request carries `Draft` alone; every other pull request
/// carries exactly one age tag (`Old`/`New`) and one disposition tag
/// (`Merged`/`Open`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Draft,
    Old,
    New,
    Merged,
    Open,
}

/// Issue timeline event kinds the review clock cares about.
///
/// Every other kind deserializes to `Other` and is kept but never consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Reopened,
    ReadyForReview,
    ReviewRequested,
    #[serde(other)]
    Other,
}

/// One entry in a pull request's issue event history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
}

/// A review submitted on a pull request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub reviewer: String,
    pub submitted_at: DateTime<Utc>,
}

/// A review performed by a tracked team member on someone else's pull
/// request. `team` is true when the reviewed PR's author is also tracked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewContribution {
    pub repo: String,
    pub author: String,
    pub team: bool,
}

/// The evaluation time window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A pull request as fetched, before enrichment.
#[derive(Clone, Debug)]
pub struct RawPullRequest {
    pub id: u64,
    pub number: u64,
    pub repo: String,
    pub author: String,
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub additions: u64,
    pub deletions: u64,
    /// Ordered (oldest first) issue event history.
    pub events: Vec<LifecycleEvent>,
    /// Ordered (oldest first) submitted reviews.
    pub reviews: Vec<ReviewRecord>,
}

/// An enriched pull request: the raw fields plus the derived review-clock
/// fields, computed once by `enrich` and immutable afterwards.
///
/// `events` and `reviews` hold only the effective history — anything before
/// the last reopening has been dropped.
#[derive(Clone, Debug)]
pub struct PullRequestRecord {
    pub id: u64,
    pub number: u64,
    pub repo: String,
    pub author: String,
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub additions: u64,
    pub deletions: u64,
    pub events: Vec<LifecycleEvent>,
    pub reviews: Vec<ReviewRecord>,
    /// Canonical start of the review clock.
    pub opened_for_review_at: DateTime<Utc>,
    /// Earliest review submitted strictly after `opened_for_review_at`.
    pub first_reviewed_at: Option<DateTime<Utc>>,
    pub tags: Vec<Tag>,
    /// Present only when merged.
    pub time_to_merge: Option<Duration>,
    /// Present only when merged; zero when no qualifying review exists.
    pub time_to_review: Option<Duration>,
}
