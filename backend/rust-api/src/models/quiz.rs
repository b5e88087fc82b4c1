use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::user::bson_datetime_as_chrono;
use super::{EpisodeKey, Level, Operation};

/// One generated arithmetic question. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(alias = "question")]
    pub question_text: String,
    pub answer: i64,
    pub operation: Operation,
    pub level: Level,
}

/// Shared episode stored in MongoDB "quiz_episodes" collection.
/// Unique on `(operation, level, episode)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizEpisode {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub operation: Operation,
    pub level: Level,
    pub episode: u32,
    pub questions: Vec<Question>,
    #[serde(rename = "timeLimit")]
    pub time_limit_seconds: u32,
    pub points_per_question: u32,
    #[serde(default = "default_unlocked")]
    pub is_unlocked: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

fn default_unlocked() -> bool {
    true
}

impl QuizEpisode {
    pub fn new(key: EpisodeKey, questions: Vec<Question>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            operation: key.operation,
            level: key.level,
            episode: key.episode,
            questions,
            time_limit_seconds: key.level.time_limit_seconds(),
            points_per_question: key.level.points_per_question(),
            is_unlocked: true,
            created_at,
        }
    }

    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.operation, self.level, self.episode)
    }
}

/// Episode as returned to clients: same shape, id rendered as hex.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizEpisodeResponse {
    pub id: String,
    pub operation: Operation,
    pub level: Level,
    pub episode: u32,
    pub questions: Vec<Question>,
    pub time_limit: u32,
    pub points_per_question: u32,
    pub is_unlocked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<QuizEpisode> for QuizEpisodeResponse {
    fn from(episode: QuizEpisode) -> Self {
        Self {
            id: episode.id.map(|id| id.to_hex()).unwrap_or_default(),
            operation: episode.operation,
            level: episode.level,
            episode: episode.episode,
            questions: episode.questions,
            time_limit: episode.time_limit_seconds,
            points_per_question: episode.points_per_question,
            is_unlocked: episode.is_unlocked,
            created_at: episode.created_at,
        }
    }
}

/// Query string for `GET /api/quiz`. Fields stay raw strings so that
/// malformed values surface as validation errors rather than extractor
/// rejections.
#[derive(Debug, Deserialize)]
pub struct EpisodeQuery {
    pub operation: Option<String>,
    pub level: Option<String>,
    pub episode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreRequest {
    pub user_id: Option<String>,
    pub operation: Option<String>,
    pub level: Option<String>,
    pub episode: Option<serde_json::Value>,
    pub score: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreResponse {
    pub message: String,
    pub points_earned: i64,
    pub total_score: u32,
    pub total_points: i64,
    pub is_perfect: bool,
    pub is_new_best: bool,
    pub attempts: u32,
    pub best_score: u32,
}
