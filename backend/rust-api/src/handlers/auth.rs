use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiResult,
    extractors::AppJson,
    middlewares::auth::{JwtClaims, JwtService, TOKEN_COOKIE},
    models::user::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UserProfile},
    services::{auth_service::AuthService, AppState},
};

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.mongo.clone(),
        state.redis.clone(),
        JwtService::new(&state.config.jwt_secret),
        state.config.token_ttl_days,
    )
}

fn session_cookie(state: &AppState, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .build()
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!("Registering new user: {}", req.username);

    let user = auth_service(&state).register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully".to_string(),
            user: UserProfile::from(user),
        }),
    ))
}

/// POST /api/auth/login - token in body and as HTTP-only cookie
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!("Login attempt for: {}", req.email_or_username);

    let (token, user) = auth_service(&state).login(req).await?;

    let cookie = session_cookie(
        &state,
        token.clone(),
        time::Duration::days(state.config.token_ttl_days),
    );

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            token,
            user: UserProfile::from(user),
        }),
    ))
}

/// POST /api/auth/logout - clears the session cookie
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let cookie = session_cookie(&state, String::new(), time::Duration::ZERO);

    (
        jar.add(cookie),
        Json(json!({ "message": "Logged out successfully" })),
    )
}

/// GET /api/auth/me (protected)
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> ApiResult<Json<UserProfile>> {
    tracing::debug!("Getting current user profile for user_id: {}", claims.sub);

    let user = auth_service(&state).get_user_by_id(&claims.sub).await?;
    Ok(Json(UserProfile::from(user)))
}

/// GET /api/auth/user/{user_id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let user = auth_service(&state).get_user_by_id(&user_id).await?;
    Ok(Json(UserProfile::from(user)))
}
