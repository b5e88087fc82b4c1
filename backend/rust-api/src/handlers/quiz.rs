use axum::{
    extract::{Query, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    extractors::AppJson,
    middlewares::auth::{ensure_same_user, JwtClaims},
    models::{
        quiz::{EpisodeQuery, QuizEpisodeResponse, SubmitScoreRequest, SubmitScoreResponse},
        EpisodeKey, Level, Operation,
    },
    services::{
        quiz_service::{parse_episode_param, QuizService, ScoreSubmission},
        AppState,
    },
};

/// GET /api/quiz?operation=&level=&episode=
pub async fn get_episode(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EpisodeQuery>,
) -> ApiResult<Json<QuizEpisodeResponse>> {
    let (Some(operation), Some(level), Some(episode)) =
        (query.operation, query.level, query.episode)
    else {
        return Err(ApiError::validation(
            "Operation, level, and episode are required",
        ));
    };

    let operation: Operation = operation.parse().map_err(ApiError::Validation)?;
    let level: Level = level.parse().map_err(ApiError::Validation)?;
    let key = EpisodeKey::new(operation, level, parse_episode_param(&episode)?);

    let service = QuizService::new(state.mongo.clone(), state.redis.clone());
    let episode = service.get_or_create_episode(key).await?;

    Ok(Json(QuizEpisodeResponse::from(episode)))
}

/// POST /api/quiz (protected) - submit the final score of an episode
pub async fn submit_score(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<SubmitScoreRequest>,
) -> ApiResult<Json<SubmitScoreResponse>> {
    let submission = ScoreSubmission::parse(req)?;
    ensure_same_user(&claims, &submission.user_id)?;

    let service = QuizService::new(state.mongo.clone(), state.redis.clone());
    let response = service.submit_score(&submission).await?;

    Ok(Json(response))
}
