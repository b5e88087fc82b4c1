use anyhow::Context;
use tracing_subscriber::fmt::init;

use mathquiz_api::{
    config::Config,
    models::{EpisodeKey, Level, Operation},
    services::{quiz_service::QuizService, AppState},
};

/// Pre-generates every episode so the first player of each one does not pay
/// for generation. Safe to re-run: stored episodes are left untouched.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();

    let config = Config::load().context("Failed to load configuration")?;

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("Failed to connect to MongoDB")?;

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).context("Failed to create Redis client")?;

    let app_state = AppState::new(config, mongo_client, redis_client)
        .await
        .context("Failed to initialize app state")?;

    let service = QuizService::new(app_state.mongo.clone(), app_state.redis.clone());
    service.ensure_indexes().await?;

    let mut seeded = 0usize;
    for operation in Operation::ALL {
        for level in Level::ALL {
            for episode in 1..=level.episode_count() {
                let key = EpisodeKey::new(operation, level, episode);
                service
                    .get_or_create_episode(key)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to seed {}: {:?}", key, e))?;
                seeded += 1;
            }
        }
    }

    tracing::info!("Seeded {} quiz episodes", seeded);
    Ok(())
}
