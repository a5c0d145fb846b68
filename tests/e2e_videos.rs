//! E2E tests for video listing, reads with view accounting, and
//! owner-gated mutation

mod common;

use common::TestServer;

/// Wait for the detached view-accounting task to land
async fn wait_for_views(server: &TestServer, video_id: &str, expected: i64) {
    for _ in 0..50 {
        let video = server.state.db.get_video(video_id).await.unwrap().unwrap();
        if video.views == expected {
            return;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
    panic!("views never reached {} for video {}", expected, video_id);
}

#[tokio::test]
async fn test_anonymous_listing_excludes_unpublished() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_video(&alice, "public talk", true).await;
    server.seed_video(&alice, "secret draft", false).await;

    let response = server
        .client
        .get(server.url("/api/v1/videos"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "public talk");
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn test_owner_listing_includes_unpublished() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_video(&alice, "public talk", true).await;
    server.seed_video(&alice, "secret draft", false).await;
    let (access, _) = server.login("alice", "hunter2hunter2").await;

    // same owner filter, authenticated as the owner
    let response = server
        .client
        .get(server.url(&format!("/api/v1/videos?userId={}", alice.id)))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["total"], 2);

    // anonymous caller with the same filter still sees only published
    let response = server
        .client
        .get(server.url(&format!("/api/v1/videos?userId={}", alice.id)))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn test_listing_rejects_malformed_owner_filter() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/api/v1/videos?userId=not-a-valid-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_listing_search_sort_and_pagination() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    let rust_intro = server.seed_video(&alice, "rust intro", true).await;
    server.seed_video(&alice, "rust advanced", true).await;
    server.seed_video(&alice, "gardening", true).await;
    server.state.db.increment_views(&rust_intro.id).await.unwrap();

    // substring search
    let response = server
        .client
        .get(server.url("/api/v1/videos?query=RUST"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["total"], 2);

    // sort by views descending puts the viewed one first
    let response = server
        .client
        .get(server.url("/api/v1/videos?sortBy=views&sortType=desc"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["items"][0]["title"], "rust intro");

    // pagination metadata
    let response = server
        .client
        .get(server.url("/api/v1/videos?limit=2&page=2"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["totalPages"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    // no matches: empty result set, not an error
    let response = server
        .client
        .get(server.url("/api/v1/videos?query=nothing+matches+this"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_non_owner_read_increments_views() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    let video = server.seed_video(&alice, "watched", true).await;

    // anonymous read counts
    let response = server
        .client
        .get(server.url(&format!("/api/v1/videos/{}", video.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    wait_for_views(&server, &video.id, 1).await;

    // owner read does not count
    let (access, _) = server.login("alice", "hunter2hunter2").await;
    let response = server
        .client
        .get(server.url(&format!("/api/v1/videos/{}", video.id)))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    let stored = server.state.db.get_video(&video.id).await.unwrap().unwrap();
    assert_eq!(stored.views, 1);
}

#[tokio::test]
async fn test_repeat_reads_count_views_but_dedup_history() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_user("bob", "hunter2hunter2").await;
    let video = server.seed_video(&alice, "rewatched", true).await;
    let (bob_access, _) = server.login("bob", "hunter2hunter2").await;

    for _ in 0..2 {
        let response = server
            .client
            .get(server.url(&format!("/api/v1/videos/{}", video.id)))
            .bearer_auth(&bob_access)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    // two reads increment twice, but the history keeps one entry
    wait_for_views(&server, &video.id, 2).await;

    let history = server
        .client
        .get(server.url("/api/v1/users/history"))
        .bearer_auth(&bob_access)
        .send()
        .await
        .unwrap();
    assert_eq!(history.status(), 200);
    let body: serde_json::Value = history.json().await.unwrap();
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["title"], "rewatched");
    assert_eq!(entries[0]["owner"]["username"], "alice");
}

#[tokio::test]
async fn test_watch_history_requires_auth_and_keeps_order() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_user("bob", "hunter2hunter2").await;
    let first = server.seed_video(&alice, "first watched", true).await;
    let second = server.seed_video(&alice, "second watched", true).await;

    let anonymous = server
        .client
        .get(server.url("/api/v1/users/history"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    let (bob_access, _) = server.login("bob", "hunter2hunter2").await;
    for video in [&first, &second] {
        server
            .client
            .get(server.url(&format!("/api/v1/videos/{}", video.id)))
            .bearer_auth(&bob_access)
            .send()
            .await
            .unwrap();
        wait_for_views(&server, &video.id, 1).await;
    }

    let history = server
        .client
        .get(server.url("/api/v1/users/history"))
        .bearer_auth(&bob_access)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = history.json().await.unwrap();
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["title"], "first watched");
    assert_eq!(entries[1]["title"], "second watched");
}

#[tokio::test]
async fn test_unpublished_video_readable_only_by_owner() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_user("bob", "hunter2hunter2").await;
    let draft = server.seed_video(&alice, "draft", false).await;

    let anonymous = server
        .client
        .get(server.url(&format!("/api/v1/videos/{}", draft.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 403);

    let (bob_access, _) = server.login("bob", "hunter2hunter2").await;
    let other = server
        .client
        .get(server.url(&format!("/api/v1/videos/{}", draft.id)))
        .bearer_auth(&bob_access)
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), 403);

    let (alice_access, _) = server.login("alice", "hunter2hunter2").await;
    let owner = server
        .client
        .get(server.url(&format!("/api/v1/videos/{}", draft.id)))
        .bearer_auth(&alice_access)
        .send()
        .await
        .unwrap();
    assert_eq!(owner.status(), 200);
}

#[tokio::test]
async fn test_get_video_id_validation() {
    let server = TestServer::new().await;

    let malformed = server
        .client
        .get(server.url("/api/v1/videos/not-a-valid-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);

    let missing = server
        .client
        .get(server.url("/api/v1/videos/01ARZ3NDEKTSV4RRFFQ69G5FAV"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_delete_requires_ownership() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_user("bob", "hunter2hunter2").await;
    let video = server.seed_video(&alice, "keep me", true).await;

    let (bob_access, _) = server.login("bob", "hunter2hunter2").await;
    let forbidden = server
        .client
        .delete(server.url(&format!("/api/v1/videos/{}", video.id)))
        .bearer_auth(&bob_access)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    // video untouched
    assert!(server.state.db.get_video(&video.id).await.unwrap().is_some());

    let (alice_access, _) = server.login("alice", "hunter2hunter2").await;
    let deleted = server
        .client
        .delete(server.url(&format!("/api/v1/videos/{}", video.id)))
        .bearer_auth(&alice_access)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);
    assert!(server.state.db.get_video(&video.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_toggle_publish_requires_ownership() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_user("bob", "hunter2hunter2").await;
    let video = server.seed_video(&alice, "toggleable", true).await;

    let (bob_access, _) = server.login("bob", "hunter2hunter2").await;
    let forbidden = server
        .client
        .patch(server.url(&format!("/api/v1/videos/toggle/publish/{}", video.id)))
        .bearer_auth(&bob_access)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    let (alice_access, _) = server.login("alice", "hunter2hunter2").await;
    let toggled = server
        .client
        .patch(server.url(&format!("/api/v1/videos/toggle/publish/{}", video.id)))
        .bearer_auth(&alice_access)
        .send()
        .await
        .unwrap();
    assert_eq!(toggled.status(), 200);
    let body: serde_json::Value = toggled.json().await.unwrap();
    assert_eq!(body["data"]["isPublished"], false);

    let again = server
        .client
        .patch(server.url(&format!("/api/v1/videos/toggle/publish/{}", video.id)))
        .bearer_auth(&alice_access)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = again.json().await.unwrap();
    assert_eq!(body["data"]["isPublished"], true);
}

#[tokio::test]
async fn test_update_video_details() {
    let server = TestServer::new().await;
    let alice = server.seed_user("alice", "hunter2hunter2").await;
    server.seed_user("bob", "hunter2hunter2").await;
    let video = server.seed_video(&alice, "original title", true).await;

    // non-owner is rejected
    let (bob_access, _) = server.login("bob", "hunter2hunter2").await;
    let forbidden = server
        .client
        .patch(server.url(&format!("/api/v1/videos/{}", video.id)))
        .bearer_auth(&bob_access)
        .multipart(reqwest::multipart::Form::new().text("title", "hijacked"))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    let (alice_access, _) = server.login("alice", "hunter2hunter2").await;

    // nothing to update
    let empty = server
        .client
        .patch(server.url(&format!("/api/v1/videos/{}", video.id)))
        .bearer_auth(&alice_access)
        .multipart(reqwest::multipart::Form::new().text("ignored", "x"))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    // title-only update succeeds without touching media
    let updated = server
        .client
        .patch(server.url(&format!("/api/v1/videos/{}", video.id)))
        .bearer_auth(&alice_access)
        .multipart(reqwest::multipart::Form::new().text("title", "better title"))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);
    let body: serde_json::Value = updated.json().await.unwrap();
    assert_eq!(body["data"]["title"], "better title");
    assert_eq!(body["data"]["description"], "about original title");
}

#[tokio::test]
async fn test_publish_requires_auth_and_files() {
    let server = TestServer::new().await;
    server.seed_user("alice", "hunter2hunter2").await;

    let anonymous = server
        .client
        .post(server.url("/api/v1/videos/publish"))
        .multipart(reqwest::multipart::Form::new().text("title", "no auth"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    let (access, _) = server.login("alice", "hunter2hunter2").await;
    let missing_files = server
        .client
        .post(server.url("/api/v1/videos/publish"))
        .bearer_auth(&access)
        .multipart(reqwest::multipart::Form::new().text("title", "files absent"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_files.status(), 400);
}
