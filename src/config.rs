//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which names the tracked team — repositories and
//! usernames — and governs the evaluation window, review-contribution policy, and cache TTLs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration as StdDuration;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "acme").
    pub owner: String,
    /// The name of the repository (e.g., "widgets").
    pub repo: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Which review contributions count towards the review columns.
///
/// Observed team dashboards disagree on this: some bound contributions to the
/// evaluation window, some count everything the contributions API returns.
/// Both exclude self-reviews.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewFilter {
    /// Only contributions within the evaluation window (the default).
    #[default]
    Window,
    /// Every contribution the API returns, regardless of window.
    All,
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Repositories whose pull requests are tracked.
    /// Expected format: comma-separated string of "owner/repo" pairs.
    /// Example: "acme/widgets,acme/gadgets"
    #[serde(deserialize_with = "deserialize_repo_list")]
    pub tracked_repos: Vec<RepoId>,

    /// GitHub logins of the tracked team members, comma-separated.
    #[serde(deserialize_with = "deserialize_name_list")]
    pub tracked_usernames: Vec<String>,

    /// Length in days of the default evaluation window (ending now).
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Review-contribution window policy ("window" or "all").
    #[serde(default)]
    pub review_filter: ReviewFilter,

    /// Hard limit on the number of paginated requests to make to the GitHub API per listing.
    pub max_github_api_pages: u32,

    /// Time to live for cached metrics in seconds.
    pub cache_ttl_seconds: u64,

    /// Maximum number of entries to keep in the metrics cache.
    pub cache_max_capacity: u64,

    /// Optional GitHub Personal Access Token for higher rate limits.
    pub github_token: Option<String>,
}

fn default_window_days() -> i64 {
    14
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn cache_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.cache_ttl_seconds)
    }

    pub fn is_tracked_username(&self, login: &str) -> bool {
        self.tracked_usernames.iter().any(|name| name == login)
    }
}

fn deserialize_repo_list<'de, D>(deserializer: D) -> Result<Vec<RepoId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(parse_repo_list(&s))
}

fn parse_repo_list(s: &str) -> Vec<RepoId> {
    s.split(',')
        .filter_map(|part| {
            let parts: Vec<&str> = part.trim().split('/').collect();
            if parts.len() == 2 {
                Some(RepoId {
                    owner: parts[0].trim().to_string(),
                    repo: parts[1].trim().to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}

fn deserialize_name_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(parse_name_list(&s))
}

fn parse_name_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
