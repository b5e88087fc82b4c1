use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use redis::aio::ConnectionManager;

use crate::metrics::{record_cache_hit, record_cache_miss, track_cache_operation, track_db_operation};
use crate::models::leaderboard::{rank_rows, LeaderboardEntry, LeaderboardRow};

pub const LEADERBOARD_CACHE_KEY: &str = "leaderboard:top100";
pub const LEADERBOARD_LIMIT: i64 = 100;

pub struct LeaderboardService {
    mongo: Database,
    redis: ConnectionManager,
    cache_ttl_seconds: u64,
}

impl LeaderboardService {
    pub fn new(mongo: Database, redis: ConnectionManager, cache_ttl_seconds: u64) -> Self {
        Self {
            mongo,
            redis,
            cache_ttl_seconds,
        }
    }

    /// Top users by total points. Served from Redis when cached; a cache
    /// failure falls back to MongoDB.
    pub async fn top(&self) -> Result<Vec<LeaderboardEntry>> {
        if self.cache_ttl_seconds > 0 {
            match self.read_cache().await {
                Ok(Some(entries)) => {
                    record_cache_hit();
                    return Ok(entries);
                }
                Ok(None) => record_cache_miss(),
                Err(e) => tracing::warn!("Leaderboard cache read failed: {:#}", e),
            }
        }

        let entries = self.load().await?;

        if self.cache_ttl_seconds > 0 {
            if let Err(e) = self.write_cache(&entries).await {
                tracing::warn!("Leaderboard cache write failed: {:#}", e);
            }
        }

        Ok(entries)
    }

    async fn load(&self) -> Result<Vec<LeaderboardEntry>> {
        let users: Collection<LeaderboardRow> = self.mongo.collection("users");
        let options = FindOptions::builder()
            .projection(doc! { "name": 1, "username": 1, "totalPoints": 1 })
            .sort(doc! { "totalPoints": -1 })
            .limit(LEADERBOARD_LIMIT)
            .build();

        let rows: Vec<LeaderboardRow> = track_db_operation("find", "users", async {
            users
                .find(doc! {})
                .with_options(options)
                .await
                .context("Failed to query leaderboard")?
                .try_collect::<Vec<_>>()
                .await
                .context("Failed to read leaderboard rows")
        })
        .await?;

        Ok(rank_rows(rows))
    }

    async fn read_cache(&self) -> Result<Option<Vec<LeaderboardEntry>>> {
        let mut conn = self.redis.clone();
        let cached: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(LEADERBOARD_CACHE_KEY)
                .query_async(&mut conn)
                .await
                .context("Failed to read leaderboard cache")
        })
        .await?;

        cached
            .map(|json| serde_json::from_str(&json).context("Failed to decode cached leaderboard"))
            .transpose()
    }

    async fn write_cache(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(entries).context("Failed to encode leaderboard")?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(LEADERBOARD_CACHE_KEY)
                .arg(self.cache_ttl_seconds)
                .arg(&json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to write leaderboard cache")
        })
        .await
    }

    /// Drops the cached ranking after points change. Failures only delay
    /// freshness until the TTL expires.
    pub async fn invalidate(mut redis: ConnectionManager) {
        let result = track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(LEADERBOARD_CACHE_KEY)
                .query_async::<()>(&mut redis)
                .await
                .context("Failed to invalidate leaderboard cache")
        })
        .await;

        if let Err(e) = result {
            tracing::warn!("{:#}", e);
        }
    }
}
