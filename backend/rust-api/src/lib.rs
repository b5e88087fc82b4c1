use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest(
            "/api",
            api_routes(app_state.clone()).layer(cors),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
}

fn api_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public_routes = Router::new()
        .route("/quiz", get(handlers::quiz::get_episode))
        .route("/leaderboard", get(handlers::leaderboard::get_leaderboard));

    let protected_routes = Router::new()
        .route("/quiz", post(handlers::quiz::submit_score))
        .route("/progress", get(handlers::progress::get_progress))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    public_routes
        .merge(protected_routes)
        .nest("/auth", auth_routes(app_state))
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route("/user/{user_id}", get(handlers::auth::get_user));

    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::get_current_user))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    register_route
        .merge(login_route)
        .merge(public_routes)
        .merge(protected_routes)
}
