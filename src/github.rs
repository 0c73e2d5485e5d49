//! GitHub data access.
//!
//! Listing goes through the issues API (one listing per tracked username and
//! state, paginated); each listed pull request is then hydrated with three
//! concurrent requests — the PR detail, its issue event history, and its
//! submitted reviews. Review contributions come from the GraphQL
//! contributions collection, one query per tracked username.

use crate::config::{RepoId, ReviewFilter};
use crate::model::{LifecycleEvent, RawPullRequest, ReviewContribution, ReviewRecord, Window};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const PER_PAGE: u32 = 100;

// Concurrent in-flight hydration requests per repository. Keeps latency down
// without tripping GitHub's secondary rate limits.
const CONCURRENCY_LIMIT: usize = 15;

#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
}

#[derive(Debug, Deserialize)]
struct Actor {
    login: String,
}

/// One row of the issues listing. Plain issues carry no `pull_request` link
/// and are dropped.
#[derive(Debug, Deserialize)]
struct IssueSummary {
    number: u64,
    user: Actor,
    closed_at: Option<DateTime<Utc>>,
    pull_request: Option<PullRequestLink>,
}

#[derive(Debug, Deserialize)]
struct PullRequestLink {}

#[derive(Debug, Deserialize)]
struct PullDetail {
    id: u64,
    #[serde(default)]
    draft: bool,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

#[derive(Debug, Deserialize)]
struct ReviewSummary {
    user: Option<Actor>,
    /// Absent while a review is still pending.
    submitted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct IssueListParams<'a> {
    creator: &'a str,
    state: &'a str,
    per_page: u32,
    page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct HydrateParams {
    per_page: u32,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }

        Ok(Self {
            octocrab: builder.build()?,
        })
    }

    /// Fetches every tracked team member's pull requests in `repo` that are
    /// open now or were closed within the window, with event and review
    /// histories attached.
    pub async fn fetch_team_pull_requests(
        &self,
        repo: &RepoId,
        usernames: &[String],
        window: &Window,
        max_pages: u32,
    ) -> Result<Vec<RawPullRequest>> {
        tracing::debug!(repo = %repo, "fetching pull requests");

        // Deduplicate by issue number: a PR can show up in both listings
        // when it closes between the two requests.
        let mut issues_by_number: HashMap<u64, IssueSummary> = HashMap::new();
        for username in usernames {
            let open = self
                .list_pull_issues(repo, username, "open", None, max_pages)
                .await?;

            // The listing API cannot bound the end of the range, so closed
            // records are filtered against the window after the fact.
            let closed = self
                .list_pull_issues(repo, username, "closed", Some(window.start), max_pages)
                .await?
                .into_iter()
                .filter(|issue| issue.closed_at.is_some_and(|closed_at| closed_at < window.end));

            for issue in open.into_iter().chain(closed) {
                if issue.pull_request.is_some() {
                    issues_by_number.entry(issue.number).or_insert(issue);
                }
            }
        }

        stream::iter(issues_by_number.into_values())
            .map(|issue| self.hydrate_pull_request(repo, issue))
            .buffer_unordered(CONCURRENCY_LIMIT)
            .try_collect()
            .await
    }

    /// Lists a user's PR-issues in a repository, following pagination up to
    /// `max_pages` pages.
    async fn list_pull_issues(
        &self,
        repo: &RepoId,
        creator: &str,
        state: &str,
        since: Option<DateTime<Utc>>,
        max_pages: u32,
    ) -> Result<Vec<IssueSummary>> {
        let route = format!("/repos/{}/{}/issues", repo.owner, repo.repo);
        let mut issues = Vec::new();
        let mut page = 1;

        loop {
            let params = IssueListParams {
                creator,
                state,
                per_page: PER_PAGE,
                page,
                since,
            };
            let batch: Vec<IssueSummary> = self
                .octocrab
                .get(&route, Some(&params))
                .await
                .with_context(|| format!("listing {state} issues for {creator} in {repo}"))?;

            let full_page = batch.len() == PER_PAGE as usize;
            issues.extend(batch);

            if !full_page {
                break;
            }
            if page >= max_pages {
                tracing::warn!(
                    "Hit max_github_api_pages ({}) listing {} issues for {} in {}. Data may be incomplete.",
                    max_pages,
                    state,
                    creator,
                    repo
                );
                break;
            }
            page += 1;
        }

        Ok(issues)
    }

    /// Fetches one pull request's detail, event history, and reviews
    /// concurrently and assembles the raw record.
    async fn hydrate_pull_request(&self, repo: &RepoId, issue: IssueSummary) -> Result<RawPullRequest> {
        let base = format!("/repos/{}/{}", repo.owner, repo.repo);
        let number = issue.number;
        let params = HydrateParams { per_page: PER_PAGE };

        let (detail, events, reviews) = tokio::try_join!(
            self.octocrab
                .get::<PullDetail, _, _>(format!("{base}/pulls/{number}"), None::<&()>),
            self.octocrab.get::<Vec<LifecycleEvent>, _, _>(
                format!("{base}/issues/{number}/events"),
                Some(&params)
            ),
            self.octocrab.get::<Vec<ReviewSummary>, _, _>(
                format!("{base}/pulls/{number}/reviews"),
                Some(&params)
            ),
        )
        .with_context(|| format!("hydrating {repo}#{number}"))?;

        let mut events = events;
        events.sort_by_key(|event| event.created_at);

        Ok(RawPullRequest {
            id: detail.id,
            number,
            repo: repo.to_string(),
            author: issue.user.login,
            draft: detail.draft,
            created_at: detail.created_at,
            merged_at: detail.merged_at,
            closed_at: detail.closed_at,
            additions: detail.additions,
            deletions: detail.deletions,
            events,
            reviews: to_review_records(reviews),
        })
    }

    /// Fetches each tracked username's review contributions, per the
    /// configured window policy.
    pub async fn fetch_review_contributions(
        &self,
        usernames: &[String],
        window: &Window,
        filter: ReviewFilter,
    ) -> Result<Vec<ReviewContribution>> {
        let queries = usernames.iter().map(|username| async move {
            let query = contributions_query(username, window, filter);
            let response: GraphQlResponse = self
                .octocrab
                .graphql(&serde_json::json!({ "query": query }))
                .await
                .with_context(|| format!("fetching review contributions for {username}"))?;

            let nodes = response
                .data
                .user
                .map(|user| {
                    user.contributions_collection
                        .pull_request_review_contributions
                        .nodes
                })
                .unwrap_or_default();

            Ok::<_, anyhow::Error>(contributions_from(username, usernames, nodes))
        });

        let per_user = futures::future::try_join_all(queries).await?;
        Ok(per_user.into_iter().flatten().collect())
    }
}

fn to_review_records(reviews: Vec<ReviewSummary>) -> Vec<ReviewRecord> {
    let mut records: Vec<ReviewRecord> = reviews
        .into_iter()
        .filter_map(|review| {
            Some(ReviewRecord {
                reviewer: review.user?.login,
                submitted_at: review.submitted_at?,
            })
        })
        .collect();
    records.sort_by_key(|record| record.submitted_at);
    records
}

fn contributions_query(username: &str, window: &Window, filter: ReviewFilter) -> String {
    let range = match filter {
        ReviewFilter::Window => format!(
            r#"(from: "{}", to: "{}")"#,
            window.start.to_rfc3339(),
            window.end.to_rfc3339()
        ),
        ReviewFilter::All => String::new(),
    };
    format!(
        r#"{{
  user(login: "{username}") {{
    contributionsCollection{range} {{
      pullRequestReviewContributions(first: 100) {{
        nodes {{
          pullRequest {{
            id
            author {{ login }}
            repository {{ nameWithOwner }}
          }}
        }}
      }}
    }}
  }}
}}"#
    )
}

/// Converts one user's contribution nodes, de-duplicating by reviewed PR and
/// skipping the user's own pull requests.
fn contributions_from(
    username: &str,
    usernames: &[String],
    nodes: Vec<ReviewContributionNode>,
) -> Vec<ReviewContribution> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut contributions = Vec::new();
    for node in nodes {
        let pr = node.pull_request;
        let author = pr.author.map(|author| author.login);
        if author.as_deref() == Some(username) || !seen.insert(pr.id) {
            continue;
        }
        contributions.push(ReviewContribution {
            repo: pr.repository.name_with_owner,
            author: username.to_string(),
            team: author
                .map(|login| usernames.iter().any(|name| *name == login))
                .unwrap_or(false),
        });
    }
    contributions
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: ContributionsData,
}

#[derive(Debug, Deserialize)]
struct ContributionsData {
    user: Option<ContributionsUser>,
}

#[derive(Debug, Deserialize)]
struct ContributionsUser {
    #[serde(rename = "contributionsCollection")]
    contributions_collection: ContributionsCollection,
}

#[derive(Debug, Deserialize)]
struct ContributionsCollection {
    #[serde(rename = "pullRequestReviewContributions")]
    pull_request_review_contributions: ContributionNodes,
}

#[derive(Debug, Deserialize)]
struct ContributionNodes {
    nodes: Vec<ReviewContributionNode>,
}

#[derive(Debug, Deserialize)]
struct ReviewContributionNode {
    #[serde(rename = "pullRequest")]
    pull_request: ReviewedPullRequest,
}

#[derive(Debug, Deserialize)]
struct ReviewedPullRequest {
    id: String,
    author: Option<Actor>,
    repository: RepositoryRef,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    #[serde(rename = "nameWithOwner")]
    name_with_owner: String,
}
