use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Projection of a user document read for the leaderboard; email and
/// password hash are never loaded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub total_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub username: String,
    pub total_points: i64,
    pub rank: u32,
}

/// Ranks rows already sorted by points, starting at 1.
pub fn rank_rows(rows: Vec<LeaderboardRow>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| LeaderboardEntry {
            id: row.id.to_hex(),
            name: row.name,
            username: row.username,
            total_points: row.total_points,
            rank: index as u32 + 1,
        })
        .collect()
}
