use axum::{
    extract::{Query, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    middlewares::auth::{ensure_same_user, JwtClaims},
    models::{
        progress::{ProgressQuery, ProgressResponse},
        Level, Operation,
    },
    services::{quiz_service::QuizService, AppState},
};

/// GET /api/progress?userId=&operation=&level= (protected)
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Json<ProgressResponse>> {
    let (Some(user_id), Some(operation), Some(level)) =
        (query.user_id, query.operation, query.level)
    else {
        return Err(ApiError::validation(
            "User ID, operation, and level are required",
        ));
    };

    let operation: Operation = operation.parse().map_err(ApiError::Validation)?;
    let level: Level = level.parse().map_err(ApiError::Validation)?;
    ensure_same_user(&claims, &user_id)?;

    let service = QuizService::new(state.mongo.clone(), state.redis.clone());
    let progress = service.get_progress(&user_id, operation, level).await?;

    Ok(Json(progress))
}
