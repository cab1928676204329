// End-to-end tests against PostgreSQL. Each test returns early unless
// TEST_DATABASE_URL points at a database the tests may create tables in.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tokio::task::JoinSet;
use tower::ServiceExt;
use uuid::Uuid;

use common::{database_app, error_body, get_request, json_body, json_request, unique_email, STRONG_PASSWORD};
use study_assistant_api::{auth::otp, db::StoredFile, AppState};

struct TestUser {
    id: Uuid,
    email: String,
    access_token: String,
    refresh_token: String,
}

async fn signup(app: &Router) -> TestUser {
    let email = unique_email();
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/signup/",
            None,
            json!({ "email": email, "password": STRONG_PASSWORD, "first_name": "Test" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    TestUser {
        id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
        email,
        access_token: body["access_token"].as_str().unwrap().to_string(),
        refresh_token: body["refresh_token"].as_str().unwrap().to_string(),
    }
}

/// A one-file batch owned by `user`, still pending extraction.
async fn pending_batch(state: &AppState, user: &TestUser) -> (Uuid, Uuid) {
    let batch_id = Uuid::new_v4();
    let file = StoredFile {
        id: Uuid::new_v4(),
        file_name: "notes.txt".to_string(),
        file_path: "/nonexistent/notes.txt".to_string(),
    };
    let attachments = state.db.create_attachments(user.id, batch_id, &[file]).await.unwrap();
    (batch_id, attachments[0].id)
}

async fn summary_for(app: &Router, state: &AppState, user: &TestUser) -> Uuid {
    let (batch_id, attachment_id) = pending_batch(state, user).await;
    state.db.mark_attachment_processing(attachment_id).await.unwrap();
    state.db.mark_attachment_completed(attachment_id, "Ownership rules").await.unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/get_summary/",
            Some(&user.access_token),
            json!({ "batch_id": batch_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["summary"]["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_signup_and_signin() {
    let Some((app, _)) = database_app().await else { return };
    let user = signup(&app).await;
    assert!(!user.access_token.is_empty());
    assert!(!user.refresh_token.is_empty());

    let response = app
        .clone()
        .oneshot(get_request("/api/userinfo/", Some(&user.access_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], user.email.as_str());
    assert!(body.get("password_hash").is_none());

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/signup/",
            None,
            json!({ "email": user.email.to_uppercase(), "password": STRONG_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let (_, message) = error_body(response).await;
    assert_eq!(message, "User already exists.");

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/signin/",
            None,
            json!({ "email": user.email, "password": "Wr0ng!pass" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let (_, message) = error_body(response).await;
    assert_eq!(message, "Invalid credentials.");

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/signin/",
            None,
            json!({ "email": user.email, "password": STRONG_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Login successful.");
    assert!(body["access_token"].is_string());
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let Some((app, _)) = database_app().await else { return };
    let user = signup(&app).await;

    let refresh = |token: &str| json_request(Method::POST, "/api/refresh_token/", None, json!({ "refresh_token": token }));

    let response = app.clone().oneshot(refresh(&user.refresh_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = json_body(response).await["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rotated, user.refresh_token);

    let response = app.clone().oneshot(refresh(&user.refresh_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let (_, message) = error_body(response).await;
    assert_eq!(message, "Token is blacklisted");

    // signing out revokes the rotated token as well
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/signout/",
            Some(&user.access_token),
            json!({ "refresh_token": rotated }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(refresh(&rotated)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_summary_requires_owned_completed_batch() {
    let Some((app, state)) = database_app().await else { return };
    let owner = signup(&app).await;
    let stranger = signup(&app).await;
    let (batch_id, attachment_id) = pending_batch(&state, &owner).await;

    let summarize = |token: &str, batch: Uuid| {
        json_request(Method::POST, "/get_summary/", Some(token), json!({ "batch_id": batch }))
    };

    let response = app.clone().oneshot(summarize(&stranger.access_token, batch_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(summarize(&owner.access_token, Uuid::new_v4())).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(summarize(&owner.access_token, batch_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let (_, message) = error_body(response).await;
    assert_eq!(message, "Not all files have been processed yet.");

    state.db.mark_attachment_processing(attachment_id).await.unwrap();
    state.db.mark_attachment_completed(attachment_id, "Borrowing rules").await.unwrap();

    let response = app.clone().oneshot(summarize(&owner.access_token, batch_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Summary generated successfully.");
    let summary_id = body["summary"]["id"].clone();

    let response = app.clone().oneshot(summarize(&owner.access_token, batch_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Summary retrieved.");
    assert_eq!(body["summary"]["id"], summary_id);

    let response = app
        .oneshot(get_request("/user/summaries/", Some(&stranger.access_token)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_bookmarks_are_scoped_per_user() {
    let Some((app, state)) = database_app().await else { return };
    let owner = signup(&app).await;
    let stranger = signup(&app).await;
    let summary_id = summary_for(&app, &state, &owner).await;

    let bookmark = |token: &str| {
        json_request(
            Method::POST,
            "/api/bookmarks/",
            Some(token),
            json!({ "content_type": "summary", "object_id": summary_id }),
        )
    };

    let response = app.clone().oneshot(bookmark(&owner.access_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bookmark_id = json_body(response).await["id"].as_str().unwrap().to_string();

    let response = app.clone().oneshot(bookmark(&owner.access_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.clone().oneshot(bookmark(&stranger.access_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get_request("/api/bookmarks/?content_type=summary", Some(&owner.access_token)))
        .await
        .unwrap();
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["object_id"], summary_id.to_string());

    let response = app
        .clone()
        .oneshot(get_request("/api/bookmarks/?content_type=quiz", Some(&owner.access_token)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!([]));

    let response = app
        .clone()
        .oneshot(get_request("/api/bookmarks/", Some(&stranger.access_token)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!([]));

    let delete = |token: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/bookmarks/{}", bookmark_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete(&stranger.access_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(delete(&owner.access_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wrong_codes_respect_attempt_limit() {
    let Some((app, state)) = database_app().await else { return };
    let user = signup(&app).await;
    let max_attempts = state.config.auth.otp_max_attempts;

    let expires_at = Utc::now() + chrono::Duration::minutes(10);
    state
        .db
        .create_password_reset_otp(user.id, &otp::hash_otp("123456"), expires_at)
        .await
        .unwrap();

    let verify = |code: &str| {
        json_request(
            Method::POST,
            "/api/verify_otp/",
            None,
            json!({ "email": user.email, "otp": code, "new_password": "N3w!password" }),
        )
    };

    let mut guesses = JoinSet::new();
    for _ in 0..40 {
        let app = app.clone();
        let request = verify("654321");
        guesses.spawn(async move {
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            error_body(response).await.1
        });
    }

    let mut checked = 0;
    while let Some(message) = guesses.join_next().await {
        match message.unwrap().as_str() {
            "Invalid or expired code." => checked += 1,
            "Too many failed attempts. Please request a new code." => {}
            other => panic!("unexpected message: {}", other),
        }
    }
    assert_eq!(checked, max_attempts);

    let reset = state.db.active_password_reset_otp(user.id).await.unwrap().unwrap();
    assert_eq!(reset.attempts, max_attempts);

    // the right code no longer helps once the attempts are used up
    let response = app.oneshot(verify("123456")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let (_, message) = error_body(response).await;
    assert_eq!(message, "Too many failed attempts. Please request a new code.");
}

#[tokio::test]
async fn test_password_reset_with_correct_code() {
    let Some((app, state)) = database_app().await else { return };
    let user = signup(&app).await;

    let expires_at = Utc::now() + chrono::Duration::minutes(10);
    state
        .db
        .create_password_reset_otp(user.id, &otp::hash_otp("246810"), expires_at)
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/verify_otp/",
            None,
            json!({ "email": user.email, "otp": "246810", "new_password": "N3w!password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/signin/",
            None,
            json!({ "email": user.email, "password": "N3w!password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.db.active_password_reset_otp(user.id).await.unwrap().is_none());
}

fn picture_upload(token: &str, file_name: &str) -> Request<Body> {
    const BOUNDARY: &str = "X-PROFILE-PICTURE-BOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"profile_picture\"; filename=\"{}\"\r\n", file_name)
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(b"\x89PNG\r\n\x1a\nnot really an image");
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::PUT)
        .uri("/api/update_account/")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_replacing_profile_picture_removes_previous_file() {
    let Some((app, state)) = database_app().await else { return };
    let user = signup(&app).await;
    let stored_path = |url: &str| {
        state
            .config
            .media
            .root
            .join("profile_pics")
            .join(url.rsplit('/').next().unwrap())
    };

    let response = app.clone().oneshot(picture_upload(&user.access_token, "me.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = json_body(response).await["profile_picture"].as_str().unwrap().to_string();
    assert!(stored_path(&first).exists());

    let response = app.oneshot(picture_upload(&user.access_token, "me-again.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = json_body(response).await["profile_picture"].as_str().unwrap().to_string();

    assert_ne!(first, second);
    assert!(!stored_path(&first).exists());
    assert!(stored_path(&second).exists());
}
