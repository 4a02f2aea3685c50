use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{header::SET_COOKIE, StatusCode};
use serde_json::{json, Value};

use kata_auth::{Role, TokenIssuer};
use kata_infra::{AccountStore, MemoryStore};

struct TestServer {
    base_url: String,
    store: Arc<MemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let store = Arc::new(MemoryStore::new());
        let issuer = Arc::new(TokenIssuer::new(b"test-secret"));
        let services = Arc::new(kata_api::app::services::from_store(
            store.clone() as Arc<dyn AccountStore>,
            issuer,
        ));
        let app = kata_api::app::build_router(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }

    async fn register(&self, client: &reqwest::Client, username: &str) {
        let res = client
            .post(format!("{}/auth/register", self.base_url))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "hunter2hunter2",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    async fn login(&self, client: &reqwest::Client, username: &str) -> reqwest::Response {
        client
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "username": username, "password": "hunter2hunter2" }))
            .send()
            .await
            .unwrap()
    }

    /// Register, optionally promote, and return a bearer access token.
    async fn login_as(&self, client: &reqwest::Client, username: &str, role: Role) -> String {
        self.register(client, username).await;
        if role != Role::Learner {
            let account = self
                .store
                .find_account_by_username(username)
                .await
                .unwrap()
                .unwrap();
            self.store.set_role(account.id, role).await.unwrap();
        }

        let res = self.login(client, username).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Pull the refresh cookie pair (`refresh_token=...`) out of Set-Cookie.
fn refresh_cookie_pair(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .map(|v| v.split(';').next().unwrap().to_string())
}

#[tokio::test]
async fn protected_endpoints_require_a_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for path in ["/auth/me", "/exercises", "/leaderboard", "/accounts"] {
        let res = client
            .get(format!("{}{}", srv.base_url, path))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "path {path}");
    }
}

#[tokio::test]
async fn login_sets_httponly_cookie_and_keeps_refresh_out_of_the_body() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.register(&client, "alice").await;

    let res = srv.login(&client, "alice").await;
    assert_eq!(res.status(), StatusCode::OK);

    let set_cookie = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .expect("login must set the refresh cookie")
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Secure"));
    let refresh_value = set_cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("refresh_token=")
        .to_string();

    let body: Value = res.json().await.unwrap();
    assert!(body["access_token"].is_string());
    assert_eq!(body["user"]["access_scope"], "full");
    assert_eq!(body["user"]["is_email_verified"], false);
    // The refresh token must not appear anywhere in the JSON body.
    assert!(!body.to_string().contains(&refresh_value));
}

#[tokio::test]
async fn refresh_works_only_through_the_cookie() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.register(&client, "alice").await;

    // No cookie at all: rejected before any token decoding.
    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let login = srv.login(&client, "alice").await;
    let cookie = refresh_cookie_pair(&login).unwrap();

    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let new_access = body["access_token"].as_str().unwrap();

    // The new access token authenticates as the same subject.
    let res = client
        .get(format!("{}/auth/me", srv.base_url))
        .bearer_auth(new_access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["username"], "alice");

    // An access token in the cookie is the wrong kind.
    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .header("Cookie", format!("refresh_token={new_access}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_the_cookie_with_matching_attributes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.login_as(&client, "alice", Role::Learner).await;

    let res = client
        .post(format!("{}/auth/logout", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let cleared = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .expect("logout must re-issue the cookie")
        .to_string();
    assert!(cleared.starts_with("refresh_token=;"));
    assert!(cleared.contains("Max-Age=0"));
    assert!(cleared.contains("HttpOnly"));
    assert!(cleared.contains("Path=/"));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.register(&client, "alice").await;

    let res = client
        .post(format!("{}/auth/register", srv.base_url))
        .json(&json!({
            "username": "alice",
            "email": "second@example.com",
            "password": "hunter2hunter2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_failure_is_generic_for_unknown_accounts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/auth/login", srv.base_url))
        .json(&json!({ "username": "nonexistent", "password": "whatever" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: Value = res.json().await.unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(!message.contains("username"));
    assert!(!message.contains("hash"));
}

#[tokio::test]
async fn unverified_account_past_grace_is_restricted_to_exercises() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.register(&client, "newbie").await;

    // 50 minutes old, still unverified.
    srv.store
        .set_account_created_at("newbie", Utc::now() - ChronoDuration::minutes(50));

    let res = srv.login(&client, "newbie").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["access_scope"], "exercises_only");
    let token = body["access_token"].as_str().unwrap().to_string();

    let denied = client
        .get(format!("{}/leaderboard", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let allowed = client
        .get(format!("{}/exercises", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    // Verification lifts the restriction immediately.
    let res = client
        .post(format!("{}/auth/verify-email", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["access_scope"], "full");

    let res = client
        .get(format!("{}/leaderboard", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn author_ownership_and_moderator_archive() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let author_a = srv.login_as(&client, "author-a", Role::Author).await;
    let author_b = srv.login_as(&client, "author-b", Role::Author).await;
    let moderator = srv.login_as(&client, "moderator", Role::Moderator).await;

    let res = client
        .post(format!("{}/exercises", srv.base_url))
        .bearer_auth(&author_a)
        .json(&json!({ "title": "binary search" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let exercise_id = body["exercise"]["id"].as_str().unwrap().to_string();

    // Author A attempts their own exercise before any moderation happens.
    let res = client
        .post(format!("{}/exercises/{}/attempts", srv.base_url, exercise_id))
        .bearer_auth(&author_a)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // Another author cannot delete it.
    let res = client
        .delete(format!("{}/exercises/{}", srv.base_url, exercise_id))
        .bearer_auth(&author_b)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // A moderator archives it (soft).
    let res = client
        .post(format!("{}/exercises/{}/archive", srv.base_url, exercise_id))
        .bearer_auth(&moderator)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Archived exercises disappear from the listing but are not removed, and
    // the author's past attempt survives.
    let res = client
        .get(format!("{}/exercises", srv.base_url))
        .bearer_auth(&author_a)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert!(body["exercises"].as_array().unwrap().is_empty());

    let exercise = srv
        .store
        .find_exercise(exercise_id.parse().unwrap())
        .await
        .unwrap()
        .expect("archived exercise still exists");
    assert!(exercise.is_archived);

    let res = client
        .get(format!("{}/stats", srv.base_url))
        .bearer_auth(&author_a)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["stats"]["attempts"], 1);
}

#[tokio::test]
async fn learners_cannot_create_exercises_or_list_accounts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.login_as(&client, "learner", Role::Learner).await;

    let res = client
        .post(format!("{}/exercises", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(format!("{}/accounts", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn account_deletion_cascades_and_invalidates_login() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let victim_token = srv.login_as(&client, "victim", Role::Learner).await;
    let other_token = srv.login_as(&client, "other", Role::Learner).await;

    let victim = srv
        .store
        .find_account_by_username("victim")
        .await
        .unwrap()
        .unwrap();
    srv.store.seed_dependent("progress", victim.id);
    srv.store.seed_dependent("notifications", victim.id);
    srv.store.seed_dependent("challenge_attempts", victim.id);

    // A different learner may not delete the account.
    let res = client
        .delete(format!("{}/accounts/{}", srv.base_url, victim.id))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // The owner may.
    let res = client
        .delete(format!("{}/accounts/{}", srv.base_url, victim.id))
        .bearer_auth(&victim_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let counts = srv.store.count_dependent_rows(victim.id).await.unwrap();
    assert!(counts.iter().all(|(_, n)| *n == 0));

    let res = srv.login(&client, "victim").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn badge_stats_are_reachable_under_restriction() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.register(&client, "newbie").await;
    srv.store
        .set_account_created_at("newbie", Utc::now() - ChronoDuration::minutes(50));

    let res = srv.login(&client, "newbie").await;
    let body: Value = res.json().await.unwrap();
    let token = body["access_token"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/badges/stats", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["badges"]["total_awarded"], 0);
}
