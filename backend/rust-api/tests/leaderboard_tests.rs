use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::send;

#[tokio::test]
async fn test_leaderboard_is_ranked_and_public() {
    let Some(app) = common::create_test_app().await else {
        return;
    };
    let (user_id, token) = common::signed_in_user(&app).await;

    send(
        &app,
        "GET",
        "/api/quiz?operation=addition&level=extreme&episode=3",
        None,
        None,
    )
    .await;
    let submitted = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(json!({
            "userId": user_id,
            "operation": "addition",
            "level": "extreme",
            "episode": 3,
            "score": 10,
        })),
    )
    .await;
    assert_eq!(submitted.status, StatusCode::OK);

    let response = send(&app, "GET", "/api/leaderboard", None, None).await;
    assert_eq!(response.status, StatusCode::OK);

    let entries = response.body.as_array().unwrap();
    assert!(!entries.is_empty());
    assert!(entries.len() <= 100);

    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(entry["rank"], index + 1);
        assert!(entry.get("email").is_none());
        assert!(entry.get("passwordHash").is_none());
    }

    let points: Vec<i64> = entries
        .iter()
        .map(|e| e["totalPoints"].as_i64().unwrap())
        .collect();
    assert!(points.windows(2).all(|w| w[0] >= w[1]));
}
