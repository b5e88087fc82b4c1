use axum::http::StatusCode;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use serde_json::{json, Value};

mod common;

use common::send;

fn submission(user_id: &str, operation: &str, level: &str, episode: Value, score: i64) -> Value {
    json!({
        "userId": user_id,
        "operation": operation,
        "level": level,
        "episode": episode,
        "score": score,
    })
}

#[tokio::test]
async fn test_get_episode_is_idempotent() {
    let Some(app) = common::create_test_app().await else {
        return;
    };
    let uri = "/api/quiz?operation=multiplication&level=medium&episode=4";

    let first = send(&app, "GET", uri, None, None).await;
    let second = send(&app, "GET", uri, None, None).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(first.body["questions"], second.body["questions"]);
    assert_eq!(first.body["id"], second.body["id"]);
    assert_eq!(first.body["questions"].as_array().unwrap().len(), 10);
    assert_eq!(first.body["timeLimit"], 120);
    assert_eq!(first.body["pointsPerQuestion"], 2);
}

#[tokio::test]
async fn test_concurrent_first_requests_share_questions() {
    let Some(app) = common::create_test_app().await else {
        return;
    };
    let uri = "/api/quiz?operation=mixed&level=extreme&episode=2";

    let (a, b, c) = tokio::join!(
        send(&app, "GET", uri, None, None),
        send(&app, "GET", uri, None, None),
        send(&app, "GET", uri, None, None),
    );

    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(a.body["questions"], b.body["questions"]);
    assert_eq!(b.body["questions"], c.body["questions"]);
}

#[tokio::test]
async fn test_get_episode_validation() {
    let Some(app) = common::create_test_app().await else {
        return;
    };

    for uri in [
        "/api/quiz?operation=addition&level=easy",
        "/api/quiz?operation=modulo&level=easy&episode=1",
        "/api/quiz?operation=addition&level=legendary&episode=1",
        "/api/quiz?operation=addition&level=easy&episode=0",
        "/api/quiz?operation=addition&level=extreme&episode=4",
        "/api/quiz?operation=addition&level=easy&episode=abc",
    ] {
        let response = send(&app, "GET", uri, None, None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(response.body["error"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn test_submit_score_reconciles_points() {
    let Some(app) = common::create_test_app().await else {
        return;
    };
    let (user_id, token) = common::signed_in_user(&app).await;

    let episode = send(
        &app,
        "GET",
        "/api/quiz?operation=subtraction&level=extreme&episode=1",
        None,
        None,
    )
    .await;
    assert_eq!(episode.status, StatusCode::OK);

    let first = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(submission(&user_id, "subtraction", "extreme", json!(1), 6)),
    )
    .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert_eq!(first.body["pointsEarned"], 30);
    assert_eq!(first.body["totalPoints"], 30);
    assert_eq!(first.body["isNewBest"], true);
    assert_eq!(first.body["attempts"], 1);

    let improved = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(submission(&user_id, "subtraction", "extreme", json!("1"), 9)),
    )
    .await;
    assert_eq!(improved.status, StatusCode::OK);
    assert_eq!(improved.body["pointsEarned"], 15);
    assert_eq!(improved.body["totalPoints"], 45);
    assert_eq!(improved.body["bestScore"], 9);
    assert_eq!(
        improved.body["message"],
        "Quiz completed successfully - New best score!"
    );

    let worse = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(submission(&user_id, "subtraction", "extreme", json!(1), 4)),
    )
    .await;
    assert_eq!(worse.status, StatusCode::OK);
    assert_eq!(worse.body["pointsEarned"], 0);
    assert_eq!(worse.body["totalPoints"], 45);
    assert_eq!(worse.body["bestScore"], 9);
    assert_eq!(worse.body["totalScore"], 4);
    assert_eq!(worse.body["isNewBest"], false);
    assert_eq!(worse.body["attempts"], 3);
}

#[tokio::test]
async fn test_concurrent_submissions_do_not_lose_updates() {
    let Some(app) = common::create_test_app().await else {
        return;
    };
    let (user_id, token) = common::signed_in_user(&app).await;

    send(
        &app,
        "GET",
        "/api/quiz?operation=addition&level=hard&episode=5",
        None,
        None,
    )
    .await;

    let body = || Some(submission(&user_id, "addition", "hard", json!(5), 10));
    let (a, b, c) = tokio::join!(
        send(&app, "POST", "/api/quiz", Some(&token), body()),
        send(&app, "POST", "/api/quiz", Some(&token), body()),
        send(&app, "POST", "/api/quiz", Some(&token), body()),
    );

    let applied = [&a, &b, &c]
        .iter()
        .filter(|r| r.status == StatusCode::OK)
        .count();
    assert!(applied >= 1);
    for response in [&a, &b, &c] {
        assert!(
            response.status == StatusCode::OK || response.status == StatusCode::CONFLICT,
            "unexpected status {}",
            response.status
        );
    }

    let progress = send(
        &app,
        "GET",
        &format!(
            "/api/progress?userId={}&operation=addition&level=hard",
            user_id
        ),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(progress.status, StatusCode::OK);
    assert_eq!(progress.body["progressMap"]["5"]["attempts"], applied);

    let me = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
    // Points for a perfect hard episode are awarded exactly once.
    assert_eq!(me.body["totalPoints"], 30);
}

#[tokio::test]
async fn test_legacy_completion_is_reconciled_in_place() {
    let Some((app, mongo)) = common::create_test_app_with_db().await else {
        return;
    };
    let (user_id, token) = common::signed_in_user(&app).await;

    send(
        &app,
        "GET",
        "/api/quiz?operation=subtraction&level=easy&episode=3",
        None,
        None,
    )
    .await;

    // Row written before bestScore, isPerfect and attempts were stored.
    mongo
        .collection::<Document>("users")
        .update_one(
            doc! { "_id": ObjectId::parse_str(&user_id).unwrap() },
            doc! {
                "$set": {
                    "totalPoints": 10_i64,
                    "completedEpisodes": [{
                        "operation": "subtraction",
                        "level": "easy",
                        "episode": 3_i64,
                        "score": 10_i64,
                        "timeCompleted": BsonDateTime::now(),
                    }],
                },
            },
        )
        .await
        .unwrap();

    let response = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(submission(&user_id, "subtraction", "easy", json!(3), 4)),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["pointsEarned"], 0);
    assert_eq!(response.body["bestScore"], 10);
    assert_eq!(response.body["isPerfect"], true);
    assert_eq!(response.body["attempts"], 2);
    assert_eq!(response.body["totalPoints"], 10);

    let progress = send(
        &app,
        "GET",
        &format!(
            "/api/progress?userId={}&operation=subtraction&level=easy",
            user_id
        ),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(progress.status, StatusCode::OK);
    assert_eq!(progress.body["progressMap"]["3"]["isPerfect"], true);
    assert_eq!(progress.body["perfectCount"], 1);
}

#[tokio::test]
async fn test_submit_requires_auth_and_ownership() {
    let Some(app) = common::create_test_app().await else {
        return;
    };
    let (user_id, _) = common::signed_in_user(&app).await;
    let (_, other_token) = common::signed_in_user(&app).await;

    let body = submission(&user_id, "addition", "easy", json!(1), 5);

    let anonymous = send(&app, "POST", "/api/quiz", None, Some(body.clone())).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let impostor = send(&app, "POST", "/api/quiz", Some(&other_token), Some(body)).await;
    assert_eq!(impostor.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_validation() {
    let Some(app) = common::create_test_app().await else {
        return;
    };
    let (user_id, token) = common::signed_in_user(&app).await;

    let missing = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(json!({ "userId": user_id, "operation": "addition" })),
    )
    .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["error"], "All fields are required");

    let out_of_range = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(submission(&user_id, "addition", "easy", json!(1), 11)),
    )
    .await;
    assert_eq!(out_of_range.status, StatusCode::BAD_REQUEST);

    let bad_json = send(
        &app,
        "POST",
        "/api/quiz",
        Some(&token),
        Some(Value::String("not an object".to_string())),
    )
    .await;
    assert_eq!(bad_json.status, StatusCode::BAD_REQUEST);
    assert!(bad_json.body["error"].is_string());
}
