use crate::error::{ApiError, ApiResult};
use crate::metrics::{track_db_operation, AUTH_EVENTS_TOTAL};
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{LoginRequest, RegisterRequest, User};
use crate::utils::mongo::is_duplicate_key;
use anyhow::{anyhow, Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};
use redis::aio::ConnectionManager;
use validator::Validate;

const MAX_FAILED_ATTEMPTS: u32 = 5;
const FAILED_ATTEMPTS_WINDOW_SECONDS: u64 = 900;

pub struct AuthService {
    mongo: Database,
    redis: ConnectionManager,
    jwt_service: JwtService,
    token_ttl_days: i64,
}

impl AuthService {
    pub fn new(
        mongo: Database,
        redis: ConnectionManager,
        jwt_service: JwtService,
        token_ttl_days: i64,
    ) -> Self {
        Self {
            mongo,
            redis,
            jwt_service,
            token_ttl_days,
        }
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection::<User>("users")
    }

    /// Hash a password using bcrypt
    pub fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, DEFAULT_COST).context("Failed to hash password")
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        verify(password, hash).context("Failed to verify password")
    }

    /// Register a new user. Username and email are stored lowercased and
    /// must both be unused.
    pub async fn register(&self, req: RegisterRequest) -> ApiResult<User> {
        let req = req.normalized();
        req.validate()?;

        let users = self.users();
        let existing = track_db_operation("find_one", "users", async {
            users
                .find_one(doc! {
                    "$or": [ { "email": &req.email }, { "username": &req.username } ]
                })
                .await
                .context("Failed to check existing user")
        })
        .await?;

        if existing.is_some() {
            record_auth_event("register", "conflict");
            return Err(ApiError::Conflict(
                "User with this email or username already exists".to_string(),
            ));
        }

        let password_hash = self.hash_password(&req.password)?;

        let now = Utc::now();
        let mut user = User {
            id: None,
            name: req.name,
            username: req.username,
            email: req.email,
            password_hash,
            profile_picture: String::new(),
            total_points: 0,
            completed_episodes: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let inserted = match users.insert_one(&user).await {
            Ok(result) => result,
            Err(e) if is_duplicate_key(&e) => {
                // A concurrent registration took the name between check and insert.
                record_auth_event("register", "conflict");
                return Err(ApiError::Conflict(
                    "User with this email or username already exists".to_string(),
                ));
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to insert user").into()),
        };

        user.id = Some(
            inserted
                .inserted_id
                .as_object_id()
                .ok_or_else(|| anyhow!("Failed to get inserted user ID"))?,
        );

        record_auth_event("register", "success");
        tracing::info!(username = %user.username, "User registered");

        Ok(user)
    }

    /// Login by email or username. Returns the signed token and the user.
    pub async fn login(&self, req: LoginRequest) -> ApiResult<(String, User)> {
        req.validate()?;
        let identifier = req.email_or_username.trim().to_lowercase();

        // Lockout is best effort: a Redis failure leaves the account unlocked.
        let locked = self
            .check_failed_attempts(&identifier)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed login lookup unavailable: {:#}", e);
                false
            });

        if locked {
            record_auth_event("login", "locked");
            tracing::warn!(identifier = %identifier, "Login locked after repeated failures");
            return Err(ApiError::TooManyRequests(
                "Too many failed login attempts. Please try again later.".to_string(),
            ));
        }

        let users = self.users();
        let user = track_db_operation("find_one", "users", async {
            users
                .find_one(doc! {
                    "$or": [ { "email": &identifier }, { "username": &identifier } ]
                })
                .await
                .context("Failed to query user")
        })
        .await?;

        let user = match user {
            Some(user) if self.verify_password(&req.password, &user.password_hash)? => user,
            _ => {
                let count = self
                    .increment_failed_attempts(&identifier)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Failed to count login failure: {:#}", e);
                        0
                    });
                record_auth_event("login", "failure");
                tracing::warn!(
                    identifier = %identifier,
                    failed_attempts = count,
                    "Failed login attempt"
                );
                return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
            }
        };

        if let Err(e) = self.clear_failed_attempts(&identifier).await {
            tracing::warn!("Failed to reset login failures: {:#}", e);
        }

        let user_id = user.id.ok_or_else(|| anyhow!("User ID not found"))?;
        let token = self.generate_token(&user_id)?;

        record_auth_event("login", "success");
        tracing::info!(user_id = %user_id.to_hex(), "Successful login");

        Ok((token, user))
    }

    /// Signs a JWT for the user valid for the configured number of days.
    pub fn generate_token(&self, user_id: &ObjectId) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::days(self.token_ttl_days);

        let claims = JwtClaims {
            sub: user_id.to_hex(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.jwt_service
            .generate_token(&claims)
            .map_err(|e| anyhow!("Failed to generate token: {}", e))
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> ApiResult<User> {
        let object_id = ObjectId::parse_str(user_id)
            .map_err(|_| ApiError::validation("Invalid user ID format"))?;

        let users = self.users();
        track_db_operation("find_one", "users", async {
            users
                .find_one(doc! { "_id": object_id })
                .await
                .context("Failed to query user")
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
    }

    /// True once the identifier reached the failure limit inside the window.
    pub async fn check_failed_attempts(&self, identifier: &str) -> Result<bool> {
        let key = failed_attempts_key(identifier);
        let mut conn = self.redis.clone();

        let count: Option<u32> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to query failed login attempts")?;

        Ok(count.unwrap_or(0) >= MAX_FAILED_ATTEMPTS)
    }

    /// Returns the count after incrementing. The window starts at the first
    /// failure.
    pub async fn increment_failed_attempts(&self, identifier: &str) -> Result<u32> {
        let key = failed_attempts_key(identifier);
        let mut conn = self.redis.clone();

        let count: u32 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to increment failed login attempts")?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(FAILED_ATTEMPTS_WINDOW_SECONDS)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to set TTL for failed login attempts")?;
        }

        Ok(count)
    }

    pub async fn clear_failed_attempts(&self, identifier: &str) -> Result<()> {
        let key = failed_attempts_key(identifier);
        let mut conn = self.redis.clone();

        redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear failed login attempts")?;

        Ok(())
    }
}

fn failed_attempts_key(identifier: &str) -> String {
    format!("failed_login:{}", identifier)
}

fn record_auth_event(event: &str, result: &str) {
    AUTH_EVENTS_TOTAL.with_label_values(&[event, result]).inc();
}
