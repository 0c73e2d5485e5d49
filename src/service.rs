//! Service layer for querying and caching team metrics.
//!
//! This module implements `MetricsService`, the main entry point for
//! retrieving grouped review metrics. It handles:
//! 1. Checking the in-memory cache for an already-computed window.
//! 2. Fetching and enriching raw data from GitHub on a miss.
//! 3. Grouping the enriched records along both reporting dimensions.
//! 4. Keeping the default window warm in the background.

use crate::config::AppConfig;
use crate::enrich;
use crate::github::GitHubClient;
use crate::metrics::{self, Dimension, GroupedBundledMetrics};
use crate::model::{PullRequestRecord, Window};
use anyhow::Result;
use chrono::{Datelike, Duration, TimeZone, Utc};
use moka::future::Cache;
use std::time::Duration as StdDuration;

const END_OF_DAY_HOUR: u32 = 23;
const END_OF_DAY_MIN: u32 = 59;
const END_OF_DAY_SEC: u32 = 59;

/// Metrics for one evaluation window, grouped along both reporting
/// dimensions the overlay renders: one table by repository (categorized by
/// author) and one by author (categorized by repository).
#[derive(Clone, Debug)]
pub struct TeamMetrics {
    pub window: Window,
    pub by_repo: GroupedBundledMetrics,
    pub by_author: GroupedBundledMetrics,
}

#[derive(Clone)]
pub struct MetricsService {
    cache: Cache<Window, TeamMetrics>,
    client: GitHubClient,
    config: AppConfig,
}

impl MetricsService {
    /// Initializes a new MetricsService.
    ///
    /// This sets up the GitHub client, the in-memory cache, and starts the
    /// background task keeping the default window warm.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = GitHubClient::new(config.github_token.clone())?;

        let cache = Cache::builder()
            .max_capacity(config.cache_max_capacity)
            .time_to_live(config.cache_ttl())
            .build();

        let service = Self {
            cache,
            client,
            config: config.clone(),
        };

        service.start_background_refresh();

        Ok(service)
    }

    /// Retrieves metrics for a window, computing them if not cached
    /// (read-through).
    pub async fn get(&self, window: Window) -> Result<TeamMetrics> {
        if let Some(metrics) = self.cache.get(&window).await {
            return Ok(metrics);
        }

        let metrics = self.fetch_and_compute(window).await?;

        self.cache.insert(window, metrics.clone()).await;

        Ok(metrics)
    }

    /// The trailing configured window, pinned to the end of the current UTC
    /// day so repeated requests within a day share one cache entry.
    pub fn default_window(&self) -> Window {
        let now = Utc::now();
        let end = Utc
            .with_ymd_and_hms(
                now.year(),
                now.month(),
                now.day(),
                END_OF_DAY_HOUR,
                END_OF_DAY_MIN,
                END_OF_DAY_SEC,
            )
            .unwrap();
        Window {
            start: end - Duration::days(self.config.window_days),
            end,
        }
    }

    /// Starts a background task that periodically recomputes the default
    /// window so the overlay's first request of the day is served warm.
    fn start_background_refresh(&self) {
        let service = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            tracing::info!("Starting background refresh task for the default window");
            // Refresh at half the TTL so the entry never goes cold.
            let mut interval =
                tokio::time::interval(StdDuration::from_secs(config.cache_ttl_seconds / 2));

            loop {
                interval.tick().await;
                let window = service.default_window();
                tracing::info!(start = %window.start, end = %window.end, "Refreshing default window");

                match service.fetch_and_compute(window).await {
                    Ok(metrics) => {
                        service.cache.insert(window, metrics).await;
                        tracing::info!("Refreshed default window metrics");
                    }
                    Err(e) => {
                        tracing::error!("Failed to refresh default window: {}", e);
                    }
                }
            }
        });
    }

    /// Fetches raw data for every tracked repository, enriches it, and
    /// groups it along both reporting dimensions.
    async fn fetch_and_compute(&self, window: Window) -> Result<TeamMetrics> {
        let config = &self.config;

        let mut records: Vec<PullRequestRecord> = Vec::new();
        for repo in &config.tracked_repos {
            let raw = self
                .client
                .fetch_team_pull_requests(
                    repo,
                    &config.tracked_usernames,
                    &window,
                    config.max_github_api_pages,
                )
                .await?;
            records.extend(raw.into_iter().map(|pr| enrich::enrich(pr, &window)));
        }

        let reviews = self
            .client
            .fetch_review_contributions(&config.tracked_usernames, &window, config.review_filter)
            .await?;

        tracing::debug!(
            records = records.len(),
            reviews = reviews.len(),
            "computing grouped metrics"
        );

        let repo_keys: Vec<String> = config
            .tracked_repos
            .iter()
            .map(|repo| repo.to_string())
            .collect();

        let by_repo = metrics::build_grouped(
            &records,
            &reviews,
            &repo_keys,
            Dimension::Repo,
            Dimension::Author,
        );
        let by_author = metrics::build_grouped(
            &records,
            &reviews,
            &config.tracked_usernames,
            Dimension::Author,
            Dimension::Repo,
        );

        Ok(TeamMetrics {
            window,
            by_repo,
            by_author,
        })
    }
}
