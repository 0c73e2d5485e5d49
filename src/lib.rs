pub mod config;
pub mod enrich;
pub mod format;
pub mod github;
pub mod metrics;
pub mod model;
pub mod service;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use config::{AppConfig, RepoId};
use indexmap::IndexMap;
use metrics::{BundledMetrics, CountMetrics, DiffSummary, GroupedBundledMetrics, TimingMetrics};
use model::Window;
use serde::{Deserialize, Serialize};
use service::{MetricsService, TeamMetrics};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Service for querying team metrics.
    pub service: MetricsService,
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
}

impl AppState {
    /// Initializes the application state, including the metrics service.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let service = MetricsService::new(&config)?;
        Ok(Self { service, config })
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/team", get(get_team))
        .route("/api/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        // the overlay is injected into a host page, so requests arrive cross-origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "review-metrics",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The tracked team, as configured. The overlay uses this to label its form.
#[derive(Serialize)]
pub struct TeamResponse {
    pub repos: Vec<RepoId>,
    pub usernames: Vec<String>,
}

pub async fn get_team(State(state): State<Arc<AppState>>) -> Json<TeamResponse> {
    Json(TeamResponse {
        repos: state.config.tracked_repos.clone(),
        usernames: state.config.tracked_usernames.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

pub async fn get_metrics(
    Query(query): Query<WindowQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TeamMetricsResponse>, (axum::http::StatusCode, String)> {
    let default = state.service.default_window();
    let window = Window {
        start: query.start.unwrap_or(default.start),
        end: query.end.unwrap_or(default.end),
    };

    match state.service.get(window).await {
        Ok(metrics) => {
            tracing::debug!(start = %window.start, end = %window.end, "Returning metrics");
            Ok(Json(TeamMetricsResponse::from(&metrics)))
        }
        Err(e) => {
            tracing::error!("Failed to compute metrics: {}", e);

            if let Some(octocrab::Error::GitHub { source, .. }) =
                e.downcast_ref::<octocrab::Error>()
            {
                // Brittle string matching; octocrab does not surface the raw
                // HTTP status here.
                if source.message.to_lowercase().contains("rate limit") {
                    return Err((
                        axum::http::StatusCode::TOO_MANY_REQUESTS,
                        "GitHub Rate Limit Exceeded".to_string(),
                    ));
                }
                if source.message.to_lowercase().contains("not found") {
                    return Err((
                        axum::http::StatusCode::NOT_FOUND,
                        "Repository Not Found".to_string(),
                    ));
                }
            }

            Err((
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            ))
        }
    }
}

/// The public response structure for team metrics.
///
/// Grouped maps keep their insertion order — `all` first, then configured
/// repositories/usernames — so the overlay can render rows as-is.
#[derive(Debug, Serialize)]
pub struct TeamMetricsResponse {
    pub window: WindowInfo,
    pub by_repo: GroupedResponse,
    pub by_author: GroupedResponse,
}

/// The evaluation window the metrics were computed for.
#[derive(Debug, Serialize)]
pub struct WindowInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Header label, e.g. "6/1/2026 to 6/15/2026".
    pub label: String,
}

pub type GroupedResponse = IndexMap<String, BundleResponse>;

#[derive(Debug, Serialize)]
pub struct BundleResponse {
    pub counts: IndexMap<String, CountsCell>,
    pub timings: IndexMap<String, TimingsCell>,
}

/// One counts table cell: the raw counters plus the combined review total.
#[derive(Debug, Serialize)]
pub struct CountsCell {
    #[serde(flatten)]
    pub counts: CountMetrics,
    pub reviews: u64,
}

/// One timings table cell. Averages are `null`/"N/A" when the accumulator
/// holds no merged pull requests.
#[derive(Debug, Serialize)]
pub struct TimingsCell {
    pub samples: usize,
    pub total_time_to_merge_ms: i64,
    pub total_time_to_review_ms: i64,
    pub avg_time_to_merge_ms: Option<f64>,
    pub avg_time_to_review_ms: Option<f64>,
    /// Humanized averages for direct table rendering.
    pub avg_time_to_merge: String,
    pub avg_time_to_review: String,
    pub avg_diff: String,
    pub diff: DiffSummary,
}

impl From<&TeamMetrics> for TeamMetricsResponse {
    fn from(metrics: &TeamMetrics) -> Self {
        TeamMetricsResponse {
            window: WindowInfo {
                start: metrics.window.start,
                end: metrics.window.end,
                label: format!(
                    "{} to {}",
                    format::format_date(&metrics.window.start),
                    format::format_date(&metrics.window.end)
                ),
            },
            by_repo: grouped_response(&metrics.by_repo),
            by_author: grouped_response(&metrics.by_author),
        }
    }
}

fn grouped_response(grouped: &GroupedBundledMetrics) -> GroupedResponse {
    grouped
        .iter()
        .map(|(key, bundle)| (key.clone(), BundleResponse::from(bundle)))
        .collect()
}

impl From<&BundledMetrics> for BundleResponse {
    fn from(bundle: &BundledMetrics) -> Self {
        BundleResponse {
            counts: bundle
                .counts
                .iter()
                .map(|(key, counts)| (key.clone(), CountsCell::from(counts)))
                .collect(),
            timings: bundle
                .timings
                .iter()
                .map(|(key, timings)| (key.clone(), TimingsCell::from(timings)))
                .collect(),
        }
    }
}

impl From<&CountMetrics> for CountsCell {
    fn from(counts: &CountMetrics) -> Self {
        CountsCell {
            counts: counts.clone(),
            reviews: counts.total_review_count(),
        }
    }
}

impl From<&TimingMetrics> for TimingsCell {
    fn from(timings: &TimingMetrics) -> Self {
        TimingsCell {
            samples: timings.len(),
            total_time_to_merge_ms: timings.total_time_to_merge().num_milliseconds(),
            total_time_to_review_ms: timings.total_time_to_review().num_milliseconds(),
            avg_time_to_merge_ms: timings.avg_time_to_merge(),
            avg_time_to_review_ms: timings.avg_time_to_review(),
            avg_time_to_merge: format::humanize_duration(timings.avg_time_to_merge()),
            avg_time_to_review: format::humanize_duration(timings.avg_time_to_review()),
            avg_diff: format::diff_summary(timings.avg_additions(), timings.avg_deletions()),
            diff: timings.summary(),
        }
    }
}
