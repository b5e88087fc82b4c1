use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub user_id: Option<String>,
    pub operation: Option<String>,
    pub level: Option<String>,
}

/// Per-episode status inside a progress projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeStatus {
    pub score: u32,
    pub max_score: u32,
    pub best_score: u32,
    pub is_perfect: bool,
    pub attempts: u32,
    pub time_completed: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    /// Keyed by episode number; only attempted episodes appear.
    pub progress_map: BTreeMap<u32, EpisodeStatus>,
    pub next_episode: u32,
    pub total_episodes: u32,
    pub completed_count: u32,
    pub perfect_count: u32,
}
