use anyhow::Context;
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use redis::aio::ConnectionManager;

use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_score_submission, track_db_operation, EPISODES_GENERATED_TOTAL};
use crate::models::{
    progress::ProgressResponse,
    quiz::{QuizEpisode, SubmitScoreRequest, SubmitScoreResponse},
    user::User,
    EpisodeKey, Level, Operation, QUESTIONS_PER_EPISODE,
};
use crate::services::leaderboard_service::LeaderboardService;
use crate::services::progress::build_progress;
use crate::services::question_generator::generate_quiz_questions;
use crate::services::scoring::{reconcile, validate_score, Reconciliation};
use crate::utils::mongo::is_duplicate_key;
use crate::utils::retry::{retry_async_if, RetryConfig};
use crate::utils::time::chrono_to_bson;

pub const EPISODES_COLLECTION: &str = "quiz_episodes";
pub const USERS_COLLECTION: &str = "users";

/// A validated score submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSubmission {
    pub user_id: String,
    pub key: EpisodeKey,
    pub score: u32,
}

impl ScoreSubmission {
    /// Parses the raw request body. `episode` may arrive as a number or a
    /// numeric string.
    pub fn parse(req: SubmitScoreRequest) -> ApiResult<Self> {
        let (Some(user_id), Some(operation), Some(level), Some(episode), Some(score)) = (
            req.user_id.filter(|s| !s.trim().is_empty()),
            req.operation,
            req.level,
            req.episode,
            req.score,
        ) else {
            return Err(ApiError::validation("All fields are required"));
        };

        let operation: Operation = operation.parse().map_err(ApiError::Validation)?;
        let level: Level = level.parse().map_err(ApiError::Validation)?;
        let episode = parse_episode_value(&episode)?;
        let score = validate_score(score)?;

        Ok(Self {
            user_id: user_id.trim().to_string(),
            key: EpisodeKey::new(operation, level, episode),
            score,
        })
    }
}

fn parse_episode_value(value: &serde_json::Value) -> ApiResult<u32> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::validation("Episode must be a positive integer"))
}

/// Parses the `episode` query parameter of `GET /api/quiz`.
pub fn parse_episode_param(raw: &str) -> ApiResult<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::validation("Episode must be a positive integer"))
}

fn episode_filter(key: &EpisodeKey) -> Document {
    doc! {
        "operation": key.operation.as_str(),
        "level": key.level.as_str(),
        "episode": i64::from(key.episode),
    }
}

struct AppliedScore {
    reconciliation: Reconciliation,
    total_points: i64,
}

pub struct QuizService {
    mongo: Database,
    redis: ConnectionManager,
}

impl QuizService {
    pub fn new(mongo: Database, redis: ConnectionManager) -> Self {
        Self { mongo, redis }
    }

    fn episodes(&self) -> Collection<QuizEpisode> {
        self.mongo.collection::<QuizEpisode>(EPISODES_COLLECTION)
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection::<User>(USERS_COLLECTION)
    }

    /// Creates the uniqueness and sort indexes the service relies on.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        self.episodes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "operation": 1, "level": 1, "episode": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .name("operation_level_episode_unique".to_string())
                            .build(),
                    )
                    .build(),
            )
            .await
            .context("Failed to create quiz_episodes index")?;

        let users = self.users();
        for field in ["username", "email"] {
            let mut keys = Document::new();
            keys.insert(field, 1);
            users
                .create_index(
                    IndexModel::builder()
                        .keys(keys)
                        .options(
                            IndexOptions::builder()
                                .unique(true)
                                .name(format!("{}_unique", field))
                                .build(),
                        )
                        .build(),
                )
                .await
                .with_context(|| format!("Failed to create users.{} index", field))?;
        }

        users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "totalPoints": -1 })
                    .options(
                        IndexOptions::builder()
                            .name("total_points_desc".to_string())
                            .build(),
                    )
                    .build(),
            )
            .await
            .context("Failed to create users.totalPoints index")?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    async fn find_episode(&self, key: &EpisodeKey) -> anyhow::Result<Option<QuizEpisode>> {
        track_db_operation("find_one", EPISODES_COLLECTION, async {
            self.episodes()
                .find_one(episode_filter(key))
                .await
                .context("Failed to query quiz episode")
        })
        .await
    }

    /// Returns the stored episode, generating and persisting it on first access.
    pub async fn get_or_create_episode(&self, key: EpisodeKey) -> ApiResult<QuizEpisode> {
        if !key.is_in_range() {
            return Err(ApiError::validation(format!(
                "Episode must be between 1 and {} for {} level",
                key.level.episode_count(),
                key.level
            )));
        }

        if let Some(existing) = self.find_episode(&key).await? {
            tracing::debug!(episode = %key, "Serving stored quiz episode");
            return Ok(existing);
        }

        let questions = generate_quiz_questions(key.operation, key.level, QUESTIONS_PER_EPISODE);
        let mut episode = QuizEpisode::new(key, questions, Utc::now());

        let inserted = track_db_operation("insert_one", EPISODES_COLLECTION, async {
            match self.episodes().insert_one(&episode).await {
                Ok(result) => Ok(Some(result.inserted_id)),
                Err(e) if is_duplicate_key(&e) => Ok(None),
                Err(e) => Err(anyhow::Error::new(e).context("Failed to insert quiz episode")),
            }
        })
        .await?;

        match inserted {
            Some(id) => {
                episode.id = id.as_object_id();
                EPISODES_GENERATED_TOTAL
                    .with_label_values(&[key.operation.as_str(), key.level.as_str()])
                    .inc();
                tracing::info!(episode = %key, "Generated new quiz episode");
                Ok(episode)
            }
            None => {
                // Another request created it first; everyone gets the stored set.
                tracing::debug!(episode = %key, "Lost episode creation race, re-reading");
                self.find_episode(&key).await?.ok_or_else(|| {
                    ApiError::Internal(anyhow::anyhow!(
                        "Quiz episode {} missing after duplicate key insert",
                        key
                    ))
                })
            }
        }
    }

    /// Applies a submitted score: reconcile against the stored completion and
    /// persist it together with the `totalPoints` increment.
    pub async fn submit_score(&self, submission: &ScoreSubmission) -> ApiResult<SubmitScoreResponse> {
        let key = submission.key;

        let episode = self
            .find_episode(&key)
            .await?
            .ok_or_else(|| ApiError::not_found("Quiz episode not found"))?;

        let user_id = ObjectId::parse_str(&submission.user_id)
            .map_err(|_| ApiError::validation("Invalid user ID format"))?;

        let applied = retry_async_if(
            RetryConfig::default(),
            |e: &ApiError| matches!(e, ApiError::Conflict(_)),
            || self.try_apply_score(user_id, key, submission.score, episode.points_per_question),
        )
        .await?;

        let reconciliation = applied.reconciliation;
        record_score_submission(
            key.level.as_str(),
            reconciliation.is_new_best,
            reconciliation.points_delta,
        );

        if reconciliation.points_delta > 0 {
            LeaderboardService::invalidate(self.redis.clone()).await;
        }

        tracing::info!(
            user_id = %submission.user_id,
            episode = %key,
            score = submission.score,
            points_delta = reconciliation.points_delta,
            is_new_best = reconciliation.is_new_best,
            "Score submitted"
        );

        let completion = reconciliation.updated_completion;
        let is_improvement = reconciliation.is_new_best && completion.attempts > 1;
        let message = if is_improvement {
            "Quiz completed successfully - New best score!"
        } else {
            "Quiz completed successfully"
        };

        Ok(SubmitScoreResponse {
            message: message.to_string(),
            points_earned: reconciliation.points_delta,
            total_score: submission.score,
            total_points: applied.total_points,
            is_perfect: completion.is_perfect,
            is_new_best: reconciliation.is_new_best,
            attempts: completion.attempts,
            best_score: completion.best_score,
        })
    }

    /// One read-reconcile-write round. The write only matches if the stored
    /// completion is still the one that was read; otherwise `Conflict`.
    async fn try_apply_score(
        &self,
        user_id: ObjectId,
        key: EpisodeKey,
        score: u32,
        points_per_question: u32,
    ) -> ApiResult<AppliedScore> {
        let users = self.users();

        let user = track_db_operation("find_one", USERS_COLLECTION, async {
            users
                .find_one(doc! { "_id": user_id })
                .await
                .context("Failed to query user")
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

        let existing = user.completion_for(&key);
        let now = Utc::now();
        let reconciliation = reconcile(existing, key, score, points_per_question, now);

        let completion = mongodb::bson::to_bson(&reconciliation.updated_completion)
            .context("Failed to serialize episode completion")?;
        let key_match = episode_filter(&key);

        let (filter, update) = match existing {
            None => (
                doc! {
                    "_id": user_id,
                    "completedEpisodes": { "$not": { "$elemMatch": key_match } },
                },
                doc! {
                    "$push": { "completedEpisodes": completion },
                    "$inc": { "totalPoints": reconciliation.points_delta },
                    "$set": { "updatedAt": chrono_to_bson(now) },
                },
            ),
            Some(previous) => {
                let mut elem = key_match;
                if previous.attempts == 1 {
                    // Rows written before attempts were tracked have no field.
                    elem.insert("attempts", doc! { "$in": [1_i64, Bson::Null] });
                } else {
                    elem.insert("attempts", i64::from(previous.attempts));
                }
                (
                    doc! {
                        "_id": user_id,
                        "completedEpisodes": { "$elemMatch": elem },
                    },
                    doc! {
                        "$set": {
                            "completedEpisodes.$": completion,
                            "updatedAt": chrono_to_bson(now),
                        },
                        "$inc": { "totalPoints": reconciliation.points_delta },
                    },
                )
            }
        };

        let updated = track_db_operation("find_one_and_update", USERS_COLLECTION, async {
            users
                .find_one_and_update(filter, update)
                .with_options(
                    FindOneAndUpdateOptions::builder()
                        .return_document(ReturnDocument::After)
                        .build(),
                )
                .await
                .context("Failed to persist episode completion")
        })
        .await?;

        match updated {
            Some(user) => Ok(AppliedScore {
                reconciliation,
                total_points: user.total_points,
            }),
            None => {
                tracing::warn!(
                    user_id = %user_id.to_hex(),
                    episode = %key,
                    "Concurrent submission changed the completion, retrying"
                );
                Err(ApiError::Conflict(
                    "Score was updated concurrently, please resubmit".to_string(),
                ))
            }
        }
    }

    pub async fn get_progress(
        &self,
        user_id: &str,
        operation: Operation,
        level: Level,
    ) -> ApiResult<ProgressResponse> {
        let object_id = ObjectId::parse_str(user_id)
            .map_err(|_| ApiError::validation("Invalid user ID format"))?;

        let user = track_db_operation("find_one", USERS_COLLECTION, async {
            self.users()
                .find_one(doc! { "_id": object_id })
                .await
                .context("Failed to query user")
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

        Ok(build_progress(&user, operation, level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(episode: serde_json::Value, score: i64) -> SubmitScoreRequest {
        SubmitScoreRequest {
            user_id: Some("65f1c0ffee0000000000beef".to_string()),
            operation: Some("Addition".to_string()),
            level: Some("hard".to_string()),
            episode: Some(episode),
            score: Some(score),
        }
    }

    #[test]
    fn parses_numeric_and_string_episode() {
        let from_number = ScoreSubmission::parse(request(json!(2), 8)).unwrap();
        let from_string = ScoreSubmission::parse(request(json!("2"), 8)).unwrap();

        assert_eq!(from_number, from_string);
        assert_eq!(
            from_number.key,
            EpisodeKey::new(Operation::Addition, Level::Hard, 2)
        );
        assert_eq!(from_number.score, 8);
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut req = request(json!(1), 5);
        req.level = None;

        let err = ScoreSubmission::parse(req).unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg == "All fields are required"));
    }

    #[test]
    fn bad_values_are_validation_errors() {
        assert!(matches!(
            ScoreSubmission::parse(request(json!(0), 5)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            ScoreSubmission::parse(request(json!("two"), 5)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            ScoreSubmission::parse(request(json!(1), 11)),
            Err(ApiError::Validation(_))
        ));

        let mut req = request(json!(1), 5);
        req.operation = Some("modulo".to_string());
        assert!(matches!(
            ScoreSubmission::parse(req),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn episode_param_must_be_positive() {
        assert_eq!(parse_episode_param(" 3 ").unwrap(), 3);
        assert!(parse_episode_param("0").is_err());
        assert!(parse_episode_param("-1").is_err());
        assert!(parse_episode_param("abc").is_err());
    }

    #[test]
    fn filter_uses_stored_field_names() {
        let key = EpisodeKey::new(Operation::Mixed, Level::Extreme, 3);
        let filter = episode_filter(&key);

        assert_eq!(filter.get_str("operation").unwrap(), "mixed");
        assert_eq!(filter.get_str("level").unwrap(), "extreme");
        assert_eq!(filter.get_i64("episode").unwrap(), 3);
    }
}
