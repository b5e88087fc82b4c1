use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub mod leaderboard;
pub mod progress;
pub mod quiz;
pub mod user;

/// Highest raw score a single episode can award.
pub const MAX_SCORE: u32 = 10;

/// Number of questions generated for every episode.
pub const QUESTIONS_PER_EPISODE: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Mixed,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Addition,
        Operation::Subtraction,
        Operation::Multiplication,
        Operation::Division,
        Operation::Mixed,
    ];

    /// Operations a `mixed` quiz draws from below the extreme level.
    pub const BASIC: [Operation; 4] = [
        Operation::Addition,
        Operation::Subtraction,
        Operation::Multiplication,
        Operation::Division,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Addition => "addition",
            Operation::Subtraction => "subtraction",
            Operation::Multiplication => "multiplication",
            Operation::Division => "division",
            Operation::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "addition" => Ok(Operation::Addition),
            "subtraction" => Ok(Operation::Subtraction),
            "multiplication" => Ok(Operation::Multiplication),
            "division" => Ok(Operation::Division),
            "mixed" => Ok(Operation::Mixed),
            _ => Err(format!("Invalid operation: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Easy,
    Medium,
    Hard,
    Extreme,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Easy, Level::Medium, Level::Hard, Level::Extreme];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Easy => "easy",
            Level::Medium => "medium",
            Level::Hard => "hard",
            Level::Extreme => "extreme",
        }
    }

    pub fn episode_count(&self) -> u32 {
        match self {
            Level::Extreme => 3,
            _ => 5,
        }
    }

    pub fn points_per_question(&self) -> u32 {
        match self {
            Level::Easy => 1,
            Level::Medium => 2,
            Level::Hard => 3,
            Level::Extreme => 5,
        }
    }

    pub fn time_limit_seconds(&self) -> u32 {
        match self {
            Level::Easy => 60,
            Level::Medium => 120,
            Level::Hard => 180,
            Level::Extreme => 240,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Ok(Level::Easy),
            "medium" => Ok(Level::Medium),
            "hard" => Ok(Level::Hard),
            "extreme" => Ok(Level::Extreme),
            _ => Err(format!("Invalid level: {}", value)),
        }
    }
}

/// Identifies one shared episode: the `(operation, level, episode)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpisodeKey {
    pub operation: Operation,
    pub level: Level,
    pub episode: u32,
}

impl EpisodeKey {
    pub fn new(operation: Operation, level: Level, episode: u32) -> Self {
        Self {
            operation,
            level,
            episode,
        }
    }

    /// Checks the episode number against the level's episode count.
    pub fn is_in_range(&self) -> bool {
        (1..=self.level.episode_count()).contains(&self.episode)
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.operation, self.level, self.episode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operations_case_insensitively() {
        assert_eq!("Addition".parse::<Operation>(), Ok(Operation::Addition));
        assert_eq!(" mixed ".parse::<Operation>(), Ok(Operation::Mixed));
        assert!("modulo".parse::<Operation>().is_err());
    }

    #[test]
    fn parses_levels() {
        for level in Level::ALL {
            assert_eq!(level.as_str().parse::<Level>(), Ok(level));
        }
        assert!("insane".parse::<Level>().is_err());
    }

    #[test]
    fn level_tables() {
        let points: Vec<u32> = Level::ALL.iter().map(|l| l.points_per_question()).collect();
        let limits: Vec<u32> = Level::ALL.iter().map(|l| l.time_limit_seconds()).collect();
        let episodes: Vec<u32> = Level::ALL.iter().map(|l| l.episode_count()).collect();

        assert_eq!(points, vec![1, 2, 3, 5]);
        assert_eq!(limits, vec![60, 120, 180, 240]);
        assert_eq!(episodes, vec![5, 5, 5, 3]);
    }

    #[test]
    fn episode_range_depends_on_level() {
        assert!(EpisodeKey::new(Operation::Addition, Level::Easy, 5).is_in_range());
        assert!(!EpisodeKey::new(Operation::Addition, Level::Extreme, 4).is_in_range());
        assert!(!EpisodeKey::new(Operation::Division, Level::Hard, 0).is_in_range());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Operation::Multiplication).unwrap(),
            "\"multiplication\""
        );
        assert_eq!(serde_json::to_string(&Level::Extreme).unwrap(), "\"extreme\"");
    }
}
