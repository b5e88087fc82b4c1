use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bind_addr: String,
    pub cookie_secure: bool,
    pub leaderboard_cache_ttl_seconds: u64,
    pub otel_enabled: bool,
    pub otel_endpoint: String,
    pub log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Local .env is optional; real deployments set the environment directly
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "mathquiz".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                format!("redis://{}:{}/0", host, port)
            });

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!("Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let token_ttl_days = settings
            .get_int("auth.token_ttl_days")
            .ok()
            .or_else(|| parse_env("JWT_TTL_DAYS"))
            .filter(|days| *days > 0)
            .unwrap_or(7);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let cookie_secure = settings
            .get_bool("auth.cookie_secure")
            .ok()
            .or_else(|| parse_env("COOKIE_SECURE"))
            .unwrap_or(app_env == "prod");

        let leaderboard_cache_ttl_seconds = settings
            .get_int("leaderboard.cache_ttl_seconds")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .or_else(|| parse_env("LEADERBOARD_CACHE_TTL_SECONDS"))
            .unwrap_or(30);

        let otel_enabled = settings
            .get_bool("telemetry.enabled")
            .ok()
            .or_else(|| parse_env("OTEL_ENABLED"))
            .unwrap_or(false);

        let otel_endpoint = settings
            .get_string("telemetry.otlp_endpoint")
            .or_else(|_| env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
            .unwrap_or_else(|_| "http://localhost:4318".to_string());

        let log_json = settings
            .get_string("telemetry.log_format")
            .or_else(|_| env::var("LOG_FORMAT"))
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            token_ttl_days,
            bind_addr,
            cookie_secure,
            leaderboard_cache_ttl_seconds,
            otel_enabled,
            otel_endpoint,
            log_json,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
