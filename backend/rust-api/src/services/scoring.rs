//! Point award and best-score reconciliation for a submitted episode score.

use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::{user::EpisodeCompletion, EpisodeKey, MAX_SCORE};

/// Outcome of applying one submission to a user's episode record.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Exact amount to add to the user's running `totalPoints`.
    pub points_delta: i64,
    pub updated_completion: EpisodeCompletion,
    pub is_new_best: bool,
}

/// Rejects raw scores outside `0..=MAX_SCORE`.
pub fn validate_score(score: i64) -> Result<u32, ApiError> {
    u32::try_from(score)
        .ok()
        .filter(|s| *s <= MAX_SCORE)
        .ok_or_else(|| ApiError::validation(format!("Score must be between 0 and {}", MAX_SCORE)))
}

/// Applies a submitted score to the existing completion (if any).
///
/// Only an improvement over the stored best earns points, and only the
/// marginal improvement. Every submission counts as an attempt.
pub fn reconcile(
    existing: Option<&EpisodeCompletion>,
    key: EpisodeKey,
    submitted_score: u32,
    points_per_question: u32,
    completed_at: DateTime<Utc>,
) -> Reconciliation {
    let ppq = i64::from(points_per_question);

    match existing {
        None => Reconciliation {
            points_delta: i64::from(submitted_score) * ppq,
            updated_completion: EpisodeCompletion {
                operation: key.operation,
                level: key.level,
                episode: key.episode,
                score: submitted_score,
                max_score: MAX_SCORE,
                best_score: submitted_score,
                is_perfect: submitted_score == MAX_SCORE,
                attempts: 1,
                time_completed: completed_at,
            },
            is_new_best: true,
        },
        Some(previous) if submitted_score > previous.best_score => {
            let improvement = i64::from(submitted_score - previous.best_score);
            Reconciliation {
                points_delta: improvement * ppq,
                updated_completion: EpisodeCompletion {
                    score: submitted_score,
                    best_score: submitted_score,
                    is_perfect: submitted_score == MAX_SCORE,
                    attempts: previous.attempts.saturating_add(1),
                    time_completed: completed_at,
                    ..previous.clone()
                },
                is_new_best: true,
            }
        }
        Some(previous) => Reconciliation {
            points_delta: 0,
            updated_completion: EpisodeCompletion {
                is_perfect: previous.best_score == MAX_SCORE,
                attempts: previous.attempts.saturating_add(1),
                ..previous.clone()
            },
            is_new_best: false,
        },
    }
}
