use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use mongodb::bson::oid::ObjectId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{EpisodeKey, Level, Operation, MAX_SCORE};

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();
}

/// User model stored in MongoDB "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub profile_picture: String,
    #[serde(default)]
    pub total_points: i64,
    #[serde(default)]
    pub completed_episodes: Vec<EpisodeCompletion>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn completion_for(&self, key: &EpisodeKey) -> Option<&EpisodeCompletion> {
        self.completed_episodes.iter().find(|ep| ep.matches(key))
    }
}

/// A user's record for one episode. `best_score` never decreases and
/// `is_perfect` always mirrors `best_score == MAX_SCORE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredCompletion")]
pub struct EpisodeCompletion {
    pub operation: Operation,
    pub level: Level,
    pub episode: u32,
    pub score: u32,
    pub max_score: u32,
    pub best_score: u32,
    pub is_perfect: bool,
    pub attempts: u32,
    #[serde(with = "bson_datetime_as_chrono")]
    pub time_completed: DateTime<Utc>,
}

/// Completion as found in the store. Older rows may lack `bestScore`,
/// `maxScore`, `isPerfect` or `attempts`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCompletion {
    operation: Operation,
    level: Level,
    episode: u32,
    score: u32,
    max_score: Option<u32>,
    best_score: Option<u32>,
    attempts: Option<u32>,
    #[serde(with = "bson_datetime_as_chrono")]
    time_completed: DateTime<Utc>,
}

impl From<StoredCompletion> for EpisodeCompletion {
    fn from(stored: StoredCompletion) -> Self {
        let best_score = stored.best_score.unwrap_or(stored.score);
        Self {
            operation: stored.operation,
            level: stored.level,
            episode: stored.episode,
            score: stored.score,
            max_score: stored.max_score.unwrap_or(MAX_SCORE),
            best_score,
            is_perfect: best_score == MAX_SCORE,
            attempts: stored.attempts.unwrap_or(1),
            time_completed: stored.time_completed,
        }
    }
}

impl EpisodeCompletion {
    pub fn matches(&self, key: &EpisodeKey) -> bool {
        self.operation == key.operation && self.level == key.level && self.episode == key.episode
    }
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(crate) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| D::Error::custom("timestamp out of range"))
    }
}

/// User profile returned to client (without sensitive data)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    pub total_points: i64,
    pub completed_episodes: Vec<EpisodeCompletion>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            username: user.username,
            email: user.email,
            profile_picture: user.profile_picture,
            total_points: user.total_points,
            completed_episodes: user.completed_episodes,
            created_at: user.created_at,
        }
    }
}

/// Request to register a new user
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: String,

    #[validate(
        length(
            min = 3,
            max = 32,
            message = "Username must be between 3 and 32 characters"
        ),
        regex(
            path = *USERNAME_RE,
            message = "Username may only contain letters, digits, '_', '.' and '-'"
        )
    )]
    pub username: String,

    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
}

impl RegisterRequest {
    /// Trims and lowercases the identifying fields the way they are stored.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            username: self.username.trim().to_lowercase(),
            email: self.email.trim().to_lowercase(),
            password: self.password,
        }
    }
}

/// Request to login
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email/username is required"))]
    pub email_or_username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

/// Response after successful login (token is also set as HTTP-only cookie)
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}
