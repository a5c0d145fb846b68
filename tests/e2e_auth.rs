//! E2E tests for registration and the session lifecycle

mod common;

use common::TestServer;

fn register_form(username: &str, email: &str) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .text("username", username.to_string())
        .text("email", email.to_string())
        .text("fullName", "Test Person")
        .text("password", "a sufficiently long password")
}

#[tokio::test]
async fn test_register_returns_user_without_credentials() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/v1/users/register"))
        .multipart(register_form("dana", "dana@example.com"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["data"]["username"], "dana");
    assert!(body["data"].get("passwordHash").is_none());
    assert!(body["data"].get("password").is_none());
    assert!(body["data"].get("refreshToken").is_none());
}

#[tokio::test]
async fn test_register_rejects_blank_required_field() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/v1/users/register"))
        .multipart(register_form("   ", "blank@example.com"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let server = TestServer::new().await;

    let first = server
        .client
        .post(server.url("/api/v1/users/register"))
        .multipart(register_form("erin", "erin@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);

    let second = server
        .client
        .post(server.url("/api/v1/users/register"))
        .multipart(register_form("other", "erin@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn test_login_sets_cookies_and_returns_pair() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;

    let response = server
        .client
        .post(server.url("/api/v1/users/login"))
        .json(&serde_json::json!({
            "username": "alice",
            "password": "hunter2hunter2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let cookies: Vec<String> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));

    let body: serde_json::Value = response.json().await.unwrap();
    let returned_refresh = body["data"]["refreshToken"].as_str().unwrap();
    assert!(body["data"]["accessToken"].as_str().is_some());
    assert!(body["data"]["user"].get("passwordHash").is_none());

    // the persisted refresh token equals the one returned to the client
    let user_id = body["data"]["user"]["id"].as_str().unwrap();
    let stored = server.state.db.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some(returned_refresh));
}

#[tokio::test]
async fn test_login_requires_username_or_email() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/v1/users/login"))
        .json(&serde_json::json!({"password": "whatever"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_login_failure_does_not_reveal_which_check_failed() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;

    let wrong_password = server
        .client
        .post(server.url("/api/v1/users/login"))
        .json(&serde_json::json!({"username": "alice", "password": "wrong"}))
        .send()
        .await
        .unwrap();
    let unknown_user = server
        .client
        .post(server.url("/api/v1/users/login"))
        .json(&serde_json::json!({"username": "nobody", "password": "wrong"}))
        .send()
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), 401);
    assert_eq!(unknown_user.status(), 401);

    let wrong_body: serde_json::Value = wrong_password.json().await.unwrap();
    let unknown_body: serde_json::Value = unknown_user.json().await.unwrap();
    assert_eq!(wrong_body["message"], unknown_body["message"]);
}

#[tokio::test]
async fn test_refresh_rotates_and_is_single_use() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;
    let (_, original_refresh) = server.login("alice", "hunter2hunter2").await;

    // first use succeeds and rotates the pair
    let first = server
        .client
        .post(server.url("/api/v1/users/refresh-token"))
        .json(&serde_json::json!({"refreshToken": original_refresh}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let body: serde_json::Value = first.json().await.unwrap();
    let rotated_refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated_refresh, original_refresh);

    // replaying the original fails: it was revoked by the rotation
    let replay = server
        .client
        .post(server.url("/api/v1/users/refresh-token"))
        .json(&serde_json::json!({"refreshToken": original_refresh}))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);

    // the rotated token still works
    let second = server
        .client
        .post(server.url("/api/v1/users/refresh-token"))
        .json(&serde_json::json!({"refreshToken": rotated_refresh}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
}

#[tokio::test]
async fn test_refresh_requires_a_token() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/v1/users/refresh-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_refresh_rejects_forged_token() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;

    let response = server
        .client
        .post(server.url("/api/v1/users/refresh-token"))
        .json(&serde_json::json!({"refreshToken": "forged.token"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;
    let (access, _) = server.login("alice", "hunter2hunter2").await;

    let response = server
        .client
        .post(server.url("/api/v1/users/refresh-token"))
        .json(&serde_json::json!({"refreshToken": access}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_logout_clears_session_and_is_idempotent() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;
    let (access, refresh) = server.login("alice", "hunter2hunter2").await;

    let logout = server
        .client
        .post(server.url("/api/v1/users/logout"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), 200);

    // the persisted refresh token is gone, so refreshing fails
    let refresh_after = server
        .client
        .post(server.url("/api/v1/users/refresh-token"))
        .json(&serde_json::json!({"refreshToken": refresh}))
        .send()
        .await
        .unwrap();
    assert_eq!(refresh_after.status(), 401);

    // logging out again is not an error (access token is still valid)
    let again = server
        .client
        .post(server.url("/api/v1/users/logout"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 200);
}

#[tokio::test]
async fn test_logout_requires_auth() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/v1/users/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_get_user_with_bearer_token() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;
    let (access, _) = server.login("alice", "hunter2hunter2").await;

    let response = server
        .client
        .get(server.url("/api/v1/users/get-user"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["username"], "alice");

    let garbage = server
        .client
        .get(server.url("/api/v1/users/get-user"))
        .bearer_auth("garbage.token")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), 401);
}

#[tokio::test]
async fn test_change_password_flow() {
    let server = TestServer::new().await;
    server.seed_user("alice", "old password 123").await;
    let (access, _) = server.login("alice", "old password 123").await;

    // confirm mismatch
    let mismatch = server
        .client
        .post(server.url("/api/v1/users/change-password"))
        .bearer_auth(&access)
        .json(&serde_json::json!({
            "oldPassword": "old password 123",
            "newPassword": "new password 456",
            "confirmPassword": "different",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(mismatch.status(), 400);

    // wrong old password
    let wrong_old = server
        .client
        .post(server.url("/api/v1/users/change-password"))
        .bearer_auth(&access)
        .json(&serde_json::json!({
            "oldPassword": "not the old one",
            "newPassword": "new password 456",
            "confirmPassword": "new password 456",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_old.status(), 401);

    // success
    let change = server
        .client
        .post(server.url("/api/v1/users/change-password"))
        .bearer_auth(&access)
        .json(&serde_json::json!({
            "oldPassword": "old password 123",
            "newPassword": "new password 456",
            "confirmPassword": "new password 456",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(change.status(), 200);

    // old password no longer logs in, the new one does
    let old_login = server
        .client
        .post(server.url("/api/v1/users/login"))
        .json(&serde_json::json!({"username": "alice", "password": "old password 123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(old_login.status(), 401);
    server.login("alice", "new password 456").await;
}

#[tokio::test]
async fn test_update_details() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;
    server.seed_user("bob", "hunter2hunter2").await;
    let (access, _) = server.login("alice", "hunter2hunter2").await;

    // nothing to update
    let empty = server
        .client
        .patch(server.url("/api/v1/users/update-details"))
        .bearer_auth(&access)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    // taken username conflicts
    let taken = server
        .client
        .patch(server.url("/api/v1/users/update-details"))
        .bearer_auth(&access)
        .json(&serde_json::json!({"username": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(taken.status(), 409);

    let renamed = server
        .client
        .patch(server.url("/api/v1/users/update-details"))
        .bearer_auth(&access)
        .json(&serde_json::json!({"username": "alice2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(renamed.status(), 200);
    let body: serde_json::Value = renamed.json().await.unwrap();
    assert_eq!(body["data"]["username"], "alice2");
}
