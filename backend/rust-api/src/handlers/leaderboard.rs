use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    error::ApiResult,
    models::leaderboard::LeaderboardEntry,
    services::{leaderboard_service::LeaderboardService, AppState},
};

/// GET /api/leaderboard - top 100 by total points
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let service = LeaderboardService::new(
        state.mongo.clone(),
        state.redis.clone(),
        state.config.leaderboard_cache_ttl_seconds,
    );

    Ok(Json(service.top().await?))
}
