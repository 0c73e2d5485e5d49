//! Count and timing aggregation over enriched pull requests.
//!
//! Accumulators are created empty, populated monotonically within a single
//! metrics run, and combined with `merge`, which returns a fresh value so a
//! base accumulator can safely feed several roll-ups. Merging is field-wise
//! addition for counts and sequence concatenation for timings, so the result
//! never depends on iteration order.

use crate::model::{PullRequestRecord, ReviewContribution, Tag};
use chrono::Duration;
use indexmap::IndexMap;
use serde::Serialize;

/// Reserved key holding the ungrouped total of a bundle or grouping.
pub const ALL: &str = "all";

/// Per-tag and per-review counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountMetrics {
    pub draft: u64,
    pub old: u64,
    pub new: u64,
    pub merged: u64,
    pub open: u64,
    pub team_review_count: u64,
    pub other_review_count: u64,
}

impl CountMetrics {
    /// Increments the counter named by each of the record's tags.
    pub fn add_pull_request(&mut self, pr: &PullRequestRecord) {
        for tag in &pr.tags {
            match tag {
                Tag::Draft => self.draft += 1,
                Tag::Old => self.old += 1,
                Tag::New => self.new += 1,
                Tag::Merged => self.merged += 1,
                Tag::Open => self.open += 1,
            }
        }
    }

    pub fn add_review(&mut self, review: &ReviewContribution) {
        if review.team {
            self.team_review_count += 1;
        } else {
            self.other_review_count += 1;
        }
    }

    pub fn total_review_count(&self) -> u64 {
        self.team_review_count + self.other_review_count
    }

    /// Field-wise sum. Commutative and associative, so roll-ups may combine
    /// partitions in any order.
    pub fn merge(&self, other: &CountMetrics) -> CountMetrics {
        CountMetrics {
            draft: self.draft + other.draft,
            old: self.old + other.old,
            new: self.new + other.new,
            merged: self.merged + other.merged,
            open: self.open + other.open,
            team_review_count: self.team_review_count + other.team_review_count,
            other_review_count: self.other_review_count + other.other_review_count,
        }
    }
}

/// One merged pull request's contribution to the timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingEntry {
    pub additions: u64,
    pub deletions: u64,
    pub time_to_merge: Duration,
    pub time_to_review: Duration,
}

/// Extrema and totals over a timing accumulator's entries.
///
/// The optional bounds are `None` when the accumulator is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub total_diff: u64,
    pub additions: u64,
    pub deletions: u64,
    pub min_diff: Option<u64>,
    pub max_diff: Option<u64>,
    pub min_time_ms: Option<i64>,
    pub max_time_ms: Option<i64>,
}

/// Timing and diff-size samples from merged pull requests.
///
/// Only records tagged `merged` contribute; every derived statistic is
/// computed lazily from the entry sequence, and averages are `None` with
/// zero entries so they can render as "N/A" instead of dividing by zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimingMetrics {
    entries: Vec<TimingEntry>,
}

impl TimingMetrics {
    pub fn add_pull_request(&mut self, pr: &PullRequestRecord) {
        if !pr.tags.contains(&Tag::Merged) {
            return;
        }
        self.entries.push(TimingEntry {
            additions: pr.additions,
            deletions: pr.deletions,
            time_to_merge: pr.time_to_merge.unwrap_or_else(Duration::zero),
            time_to_review: pr.time_to_review.unwrap_or_else(Duration::zero),
        });
    }

    /// Concatenates the entry sequences; all derived statistics are sums or
    /// extrema over the set, so the order is irrelevant.
    pub fn merge(&self, other: &TimingMetrics) -> TimingMetrics {
        let mut entries = self.entries.clone();
        entries.extend_from_slice(&other.entries);
        TimingMetrics { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_time_to_merge(&self) -> Duration {
        self.entries
            .iter()
            .fold(Duration::zero(), |acc, entry| acc + entry.time_to_merge)
    }

    pub fn total_time_to_review(&self) -> Duration {
        self.entries
            .iter()
            .fold(Duration::zero(), |acc, entry| acc + entry.time_to_review)
    }

    /// Average time-to-merge in milliseconds, `None` with no entries.
    pub fn avg_time_to_merge(&self) -> Option<f64> {
        self.average(self.total_time_to_merge())
    }

    /// Average time-to-review in milliseconds, `None` with no entries.
    pub fn avg_time_to_review(&self) -> Option<f64> {
        self.average(self.total_time_to_review())
    }

    /// Average added line count, `None` with no entries.
    pub fn avg_additions(&self) -> Option<f64> {
        self.average_count(|entry| entry.additions)
    }

    /// Average removed line count, `None` with no entries.
    pub fn avg_deletions(&self) -> Option<f64> {
        self.average_count(|entry| entry.deletions)
    }

    pub fn summary(&self) -> DiffSummary {
        self.entries
            .iter()
            .fold(DiffSummary::default(), |mut acc, entry| {
                let total = entry.additions + entry.deletions;
                acc.total_diff += total;
                acc.additions += entry.additions;
                acc.deletions += entry.deletions;
                acc.min_diff = Some(acc.min_diff.map_or(total, |min| min.min(total)));
                acc.max_diff = Some(acc.max_diff.map_or(total, |max| max.max(total)));

                let ttm = entry.time_to_merge.num_milliseconds();
                let ttr = entry.time_to_review.num_milliseconds();
                let (lo, hi) = (ttm.min(ttr), ttm.max(ttr));
                acc.min_time_ms = Some(acc.min_time_ms.map_or(lo, |min| min.min(lo)));
                acc.max_time_ms = Some(acc.max_time_ms.map_or(hi, |max| max.max(hi)));
                acc
            })
    }

    fn average(&self, total: Duration) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        Some(total.num_milliseconds() as f64 / self.entries.len() as f64)
    }

    fn average_count(&self, field: impl Fn(&TimingEntry) -> u64) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let total: u64 = self.entries.iter().map(field).sum();
        Some(total as f64 / self.entries.len() as f64)
    }
}

/// Dimension along which records are partitioned or sub-categorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
    Repo,
    Author,
}

impl Dimension {
    fn pull_request_key<'a>(self, pr: &'a PullRequestRecord) -> &'a str {
        match self {
            Dimension::Repo => &pr.repo,
            Dimension::Author => &pr.author,
        }
    }

    fn review_key<'a>(self, review: &'a ReviewContribution) -> &'a str {
        match self {
            Dimension::Repo => &review.repo,
            Dimension::Author => &review.author,
        }
    }
}

/// One partition's metrics: counts and timings sub-categorized along a
/// dimension, each map carrying the reserved `all` total.
#[derive(Clone, Debug, Default)]
pub struct BundledMetrics {
    pub counts: IndexMap<String, CountMetrics>,
    pub timings: IndexMap<String, TimingMetrics>,
}

impl BundledMetrics {
    pub fn new() -> Self {
        let mut bundle = BundledMetrics::default();
        bundle.counts.insert(ALL.to_string(), CountMetrics::default());
        bundle.timings.insert(ALL.to_string(), TimingMetrics::default());
        bundle
    }
}

/// Grouped metrics keyed by partition, with the `all` roll-up first.
pub type GroupedBundledMetrics = IndexMap<String, BundledMetrics>;

/// Partitions records and review contributions by `group_by`, builds one
/// sub-categorized bundle per partition, and prepends the cross-group
/// roll-up under the reserved `all` key.
///
/// `groups` seeds the partitions so configured repositories and authors
/// appear even when empty; keys observed in the data but absent from the
/// seed list get buckets lazily.
pub fn build_grouped(
    records: &[PullRequestRecord],
    reviews: &[ReviewContribution],
    groups: &[String],
    group_by: Dimension,
    categorize_by: Dimension,
) -> GroupedBundledMetrics {
    let mut keys: Vec<String> = Vec::new();
    for group in groups {
        if !keys.contains(group) {
            keys.push(group.clone());
        }
    }
    for pr in records {
        let key = group_by.pull_request_key(pr);
        if !keys.iter().any(|known| known == key) {
            keys.push(key.to_string());
        }
    }
    for review in reviews {
        let key = group_by.review_key(review);
        if !keys.iter().any(|known| known == key) {
            keys.push(key.to_string());
        }
    }

    let mut grouped = GroupedBundledMetrics::new();
    grouped.insert(ALL.to_string(), BundledMetrics::new());
    for key in &keys {
        let partition_records: Vec<&PullRequestRecord> = records
            .iter()
            .filter(|pr| group_by.pull_request_key(pr) == key)
            .collect();
        let partition_reviews: Vec<&ReviewContribution> = reviews
            .iter()
            .filter(|review| group_by.review_key(review) == key)
            .collect();
        grouped.insert(
            key.clone(),
            build_bundle(&partition_records, &partition_reviews, categorize_by),
        );
    }

    let total = rollup(&grouped);
    // replaces the placeholder in place, keeping `all` first
    grouped.insert(ALL.to_string(), total);
    grouped
}

fn build_bundle(
    records: &[&PullRequestRecord],
    reviews: &[&ReviewContribution],
    categorize_by: Dimension,
) -> BundledMetrics {
    let mut bundle = BundledMetrics::new();
    for pr in records {
        bundle
            .counts
            .entry(categorize_by.pull_request_key(pr).to_string())
            .or_default()
            .add_pull_request(pr);
        bundle
            .timings
            .entry(categorize_by.pull_request_key(pr).to_string())
            .or_default()
            .add_pull_request(pr);

        bundle.counts[ALL].add_pull_request(pr);
        bundle.timings[ALL].add_pull_request(pr);
    }
    for review in reviews {
        bundle
            .counts
            .entry(categorize_by.review_key(review).to_string())
            .or_default()
            .add_review(review);
        bundle.counts[ALL].add_review(review);
    }
    bundle
}

/// Merges every partition's `all` accumulators into one total bundle,
/// skipping the reserved key itself so nothing is counted twice.
pub fn rollup(grouped: &GroupedBundledMetrics) -> BundledMetrics {
    let mut counts = CountMetrics::default();
    let mut timings = TimingMetrics::default();
    for (key, bundle) in grouped {
        if key == ALL {
            continue;
        }
        if let Some(partition_counts) = bundle.counts.get(ALL) {
            counts = counts.merge(partition_counts);
        }
        if let Some(partition_timings) = bundle.timings.get(ALL) {
            timings = timings.merge(partition_timings);
        }
    }

    let mut bundle = BundledMetrics::new();
    bundle.counts.insert(ALL.to_string(), counts);
    bundle.timings.insert(ALL.to_string(), timings);
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(repo: &str, author: &str, tags: Vec<Tag>) -> PullRequestRecord {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap();
        let merged = tags.contains(&Tag::Merged);
        PullRequestRecord {
            id: 1,
            number: 1,
            repo: repo.to_string(),
            author: author.to_string(),
            draft: tags.contains(&Tag::Draft),
            created_at,
            merged_at: merged.then(|| created_at + Duration::hours(4)),
            closed_at: None,
            additions: 100,
            deletions: 20,
            events: vec![],
            reviews: vec![],
            opened_for_review_at: created_at,
            first_reviewed_at: None,
            tags,
            time_to_merge: merged.then(|| Duration::hours(4)),
            time_to_review: merged.then(|| Duration::hours(1)),
        }
    }

    fn timed(mut pr: PullRequestRecord, ttm: Duration, ttr: Duration) -> PullRequestRecord {
        pr.time_to_merge = Some(ttm);
        pr.time_to_review = Some(ttr);
        pr
    }

    fn contribution(repo: &str, author: &str, team: bool) -> ReviewContribution {
        ReviewContribution {
            repo: repo.to_string(),
            author: author.to_string(),
            team,
        }
    }

    #[test]
    fn test_counts_follow_tags() {
        let mut counts = CountMetrics::default();
        counts.add_pull_request(&record("r", "a", vec![Tag::Old, Tag::Merged]));
        counts.add_pull_request(&record("r", "a", vec![Tag::New, Tag::Open]));
        counts.add_pull_request(&record("r", "a", vec![Tag::Draft]));

        assert_eq!(counts.draft, 1);
        assert_eq!(counts.old, 1);
        assert_eq!(counts.new, 1);
        assert_eq!(counts.merged, 1);
        assert_eq!(counts.open, 1);
    }

    #[test]
    fn test_review_counters_split_team_and_other() {
        let mut counts = CountMetrics::default();
        counts.add_review(&contribution("r", "a", true));
        counts.add_review(&contribution("r", "a", false));
        counts.add_review(&contribution("r", "a", false));

        assert_eq!(counts.team_review_count, 1);
        assert_eq!(counts.other_review_count, 2);
        assert_eq!(counts.total_review_count(), 3);
    }

    #[test]
    fn test_count_merge_is_commutative_and_associative() {
        let mut a = CountMetrics::default();
        a.add_pull_request(&record("r", "a", vec![Tag::Old, Tag::Merged]));
        let mut b = CountMetrics::default();
        b.add_pull_request(&record("r", "a", vec![Tag::New, Tag::Open]));
        let mut c = CountMetrics::default();
        c.add_review(&contribution("r", "a", true));

        assert_eq!(a.merge(&b), b.merge(&a));
        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn test_timings_only_sample_merged_records() {
        let mut timings = TimingMetrics::default();
        timings.add_pull_request(&record("r", "a", vec![Tag::Old, Tag::Open]));
        timings.add_pull_request(&record("r", "a", vec![Tag::Draft]));
        assert!(timings.is_empty());
        assert_eq!(timings.avg_time_to_merge(), None);

        timings.add_pull_request(&record("r", "a", vec![Tag::New, Tag::Merged]));
        assert_eq!(timings.len(), 1);
    }

    #[test]
    fn test_timing_merge_averages_across_all_entries() {
        let base = record("r", "a", vec![Tag::New, Tag::Merged]);

        let mut left = TimingMetrics::default();
        left.add_pull_request(&timed(base.clone(), Duration::hours(2), Duration::hours(1)));
        left.add_pull_request(&timed(base.clone(), Duration::hours(4), Duration::hours(2)));

        let mut right = TimingMetrics::default();
        right.add_pull_request(&timed(base, Duration::hours(6), Duration::hours(3)));

        let merged = left.merge(&right);
        assert_eq!(merged.len(), 3);
        // (2 + 4 + 6) / 3 hours
        assert_eq!(merged.avg_time_to_merge(), Some(4.0 * 60.0 * 60.0 * 1000.0));
        assert_eq!(merged.avg_time_to_review(), Some(2.0 * 60.0 * 60.0 * 1000.0));
        assert_eq!(merged.total_time_to_merge(), Duration::hours(12));
    }

    #[test]
    fn test_summary_tracks_extrema() {
        let base = record("r", "a", vec![Tag::New, Tag::Merged]);
        let mut small = base.clone();
        small.additions = 5;
        small.deletions = 1;

        let mut timings = TimingMetrics::default();
        timings.add_pull_request(&timed(small, Duration::hours(2), Duration::hours(3)));
        timings.add_pull_request(&timed(base, Duration::hours(4), Duration::hours(1)));

        let summary = timings.summary();
        assert_eq!(summary.total_diff, 126);
        assert_eq!(summary.additions, 105);
        assert_eq!(summary.deletions, 21);
        assert_eq!(summary.min_diff, Some(6));
        assert_eq!(summary.max_diff, Some(120));
        assert_eq!(summary.min_time_ms, Some(Duration::hours(1).num_milliseconds()));
        assert_eq!(summary.max_time_ms, Some(Duration::hours(4).num_milliseconds()));
    }

    #[test]
    fn test_empty_summary_has_no_bounds() {
        let summary = TimingMetrics::default().summary();
        assert_eq!(summary.min_diff, None);
        assert_eq!(summary.max_time_ms, None);
        assert_eq!(summary.total_diff, 0);
    }

    #[test]
    fn test_grouped_by_repo_categorized_by_author() {
        let records = vec![
            record("repo-a", "alice", vec![Tag::Old, Tag::Merged]),
            record("repo-a", "bob", vec![Tag::New, Tag::Open]),
            record("repo-b", "alice", vec![Tag::New, Tag::Merged]),
        ];
        let reviews = vec![
            contribution("repo-a", "alice", true),
            contribution("repo-b", "bob", false),
        ];
        let groups = vec!["repo-a".to_string(), "repo-b".to_string()];

        let grouped = build_grouped(&records, &reviews, &groups, Dimension::Repo, Dimension::Author);

        assert_eq!(
            grouped.keys().collect::<Vec<_>>(),
            vec!["all", "repo-a", "repo-b"]
        );

        let repo_a = &grouped["repo-a"];
        assert_eq!(repo_a.counts[ALL].old, 1);
        assert_eq!(repo_a.counts[ALL].new, 1);
        assert_eq!(repo_a.counts[ALL].team_review_count, 1);
        assert_eq!(repo_a.counts["alice"].merged, 1);
        assert_eq!(repo_a.counts["bob"].open, 1);
        assert_eq!(repo_a.timings[ALL].len(), 1);
        assert_eq!(repo_a.timings["bob"].len(), 0);
    }

    #[test]
    fn test_rollup_sums_partition_totals() {
        let records = vec![
            record("repo-a", "alice", vec![Tag::Old, Tag::Merged]),
            record("repo-a", "alice", vec![Tag::Old, Tag::Merged]),
            record("repo-a", "bob", vec![Tag::New, Tag::Open]),
            record("repo-b", "bob", vec![Tag::New, Tag::Open]),
            record("repo-b", "bob", vec![Tag::New, Tag::Merged]),
            record("repo-b", "alice", vec![Tag::New, Tag::Open]),
        ];
        let groups = vec!["repo-a".to_string(), "repo-b".to_string()];

        let grouped = build_grouped(&records, &[], &groups, Dimension::Repo, Dimension::Author);

        let all = &grouped[ALL];
        assert_eq!(all.counts[ALL].old, 2);
        assert_eq!(all.counts[ALL].new, 4);
        assert_eq!(all.counts[ALL].merged, 3);
        assert_eq!(all.counts[ALL].open, 3);
        assert_eq!(all.timings[ALL].len(), 3);
    }

    #[test]
    fn test_empty_input_yields_only_all() {
        let grouped = build_grouped(&[], &[], &[], Dimension::Repo, Dimension::Author);

        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["all"]);
        assert_eq!(grouped[ALL].counts[ALL], CountMetrics::default());
        assert!(grouped[ALL].timings[ALL].is_empty());
        assert_eq!(grouped[ALL].timings[ALL].avg_time_to_merge(), None);
    }

    #[test]
    fn test_configured_groups_appear_even_when_empty() {
        let groups = vec!["repo-a".to_string(), "repo-b".to_string()];
        let grouped = build_grouped(&[], &[], &groups, Dimension::Repo, Dimension::Author);

        assert_eq!(
            grouped.keys().collect::<Vec<_>>(),
            vec!["all", "repo-a", "repo-b"]
        );
        assert_eq!(grouped["repo-a"].counts[ALL], CountMetrics::default());
    }

    #[test]
    fn test_unseeded_keys_get_buckets_lazily() {
        let records = vec![record("surprise", "carol", vec![Tag::New, Tag::Open])];
        let grouped = build_grouped(&records, &[], &[], Dimension::Repo, Dimension::Author);

        assert_eq!(grouped["surprise"].counts[ALL].open, 1);
        assert_eq!(grouped["surprise"].counts["carol"].open, 1);
    }

    #[test]
    fn test_grouped_by_author_categorized_by_repo() {
        let records = vec![
            record("repo-a", "alice", vec![Tag::New, Tag::Merged]),
            record("repo-b", "alice", vec![Tag::New, Tag::Open]),
        ];
        let reviews = vec![contribution("repo-a", "alice", false)];
        let groups = vec!["alice".to_string()];

        let grouped = build_grouped(&records, &reviews, &groups, Dimension::Author, Dimension::Repo);

        let alice = &grouped["alice"];
        assert_eq!(alice.counts["repo-a"].merged, 1);
        assert_eq!(alice.counts["repo-b"].open, 1);
        assert_eq!(alice.counts[ALL].other_review_count, 1);
        assert_eq!(alice.timings["repo-a"].len(), 1);
    }
}
