use std::collections::BTreeMap;

use crate::models::{
    progress::{EpisodeStatus, ProgressResponse},
    user::User,
    Level, Operation, MAX_SCORE,
};

/// Picks the episode to present next: the first one in `1..=total` that is
/// unattempted or not yet perfect, or `total` once everything is perfect.
pub fn next_episode(progress: &BTreeMap<u32, EpisodeStatus>, total: u32) -> u32 {
    (1..=total)
        .find(|episode| {
            progress
                .get(episode)
                .map(|status| !status.is_perfect)
                .unwrap_or(true)
        })
        .unwrap_or(total)
}

/// Read-only projection of a user's completions for one operation/level.
pub fn build_progress(user: &User, operation: Operation, level: Level) -> ProgressResponse {
    let progress_map: BTreeMap<u32, EpisodeStatus> = user
        .completed_episodes
        .iter()
        .filter(|ep| ep.operation == operation && ep.level == level)
        .map(|ep| {
            (
                ep.episode,
                EpisodeStatus {
                    score: ep.score,
                    max_score: ep.max_score,
                    best_score: ep.best_score,
                    is_perfect: ep.best_score == MAX_SCORE,
                    attempts: ep.attempts,
                    time_completed: ep.time_completed,
                },
            )
        })
        .collect();

    let total_episodes = level.episode_count();

    ProgressResponse {
        next_episode: next_episode(&progress_map, total_episodes),
        total_episodes,
        completed_count: progress_map.len() as u32,
        perfect_count: progress_map.values().filter(|s| s.is_perfect).count() as u32,
        progress_map,
    }
}
