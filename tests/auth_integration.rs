//! Full-stack auth tests against a live Postgres instance.
//!
//! Each test spins up the app on a random port with a throwaway database.
//! Run with `cargo test -- --ignored` when Postgres is available.

use booklet::configuration::{get_configuration, DatabaseSettings};
use booklet::startup::run;
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
    pub jwt: booklet::configuration::JwtSettings,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let jwt = configuration.jwt.clone();
    let server = run(listener, connection_pool.clone(), jwt.clone()).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
        jwt,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn register_user(app: &TestApp, email: &str, password: &str) {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/users", app.address))
        .json(&json!({
            "email": email,
            "password": password,
            "first_name": "Test",
            "last_name": "User"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());
}

async fn login(app: &TestApp, email: &str, password: &str) -> Value {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/auth/login", app.address))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    response.json().await.expect("Failed to parse response")
}

// --- Registration ---

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn register_returns_201_and_persists_the_user() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "SecurePass123").await;

    let (email, role): (String, String) =
        sqlx::query_as("SELECT email, role FROM users WHERE email = 'john@example.com'")
            .fetch_one(&app.db_pool)
            .await
            .expect("Failed to fetch created user");

    assert_eq!(email, "john@example.com");
    assert_eq!(role, "USER");
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn registration_issues_a_usable_token_pair() {
    let app = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/users", app.address))
        .json(&json!({
            "email": "fresh@example.com",
            "password": "Secret1$pass",
            "first_name": "Fresh",
            "last_name": "User"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.unwrap();

    // Signed in straight away, no separate login call needed.
    assert_eq!(body["user"]["email"], "fresh@example.com");
    let access = body["access_token"].as_str().expect("missing access_token");
    let refresh = body["refresh_token"].as_str().expect("missing refresh_token");

    let claims = booklet::auth::decode_token(access, &app.jwt).expect("access token must decode");
    assert_eq!(claims.subject(), "fresh@example.com");
    assert!(claims.is_access());

    // The refresh token was persisted as an active record.
    let response = client
        .post(format!("{}/api/v1/auth/refresh", app.address))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn duplicate_registration_returns_409() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "SecurePass123").await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/users", app.address))
        .json(&json!({
            "email": "john@example.com",
            "password": "OtherPass456",
            "first_name": "Other",
            "last_name": "John"
        }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(409, response.status().as_u16());
}

// --- Login ---

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn login_returns_a_decodable_access_token() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;

    let body = login(&app, "a@b.com", "Secret1$pass").await;
    let access = body["access_token"].as_str().expect("missing access_token");
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");

    let claims = booklet::auth::decode_token(access, &app.jwt).expect("access token must decode");
    assert_eq!(claims.subject(), "a@b.com");
    assert!(claims.is_access());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn login_with_wrong_password_returns_401() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/auth/login", app.address))
        .json(&json!({ "email": "a@b.com", "password": "WrongPass1" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["status"], 401);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn inactive_account_login_looks_like_a_bad_password() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;

    sqlx::query("UPDATE users SET active = false WHERE email = 'a@b.com'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to deactivate user");

    let client = reqwest::Client::new();
    let correct = client
        .post(format!("{}/api/v1/auth/login", app.address))
        .json(&json!({ "email": "a@b.com", "password": "Secret1$pass" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, correct.status().as_u16());
    let correct_body: Value = correct.json().await.unwrap();

    let wrong = client
        .post(format!("{}/api/v1/auth/login", app.address))
        .json(&json!({ "email": "a@b.com", "password": "Wrong1$pass" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, wrong.status().as_u16());
    let wrong_body: Value = wrong.json().await.unwrap();

    // The right password against a disabled account must be
    // indistinguishable from a wrong one.
    assert_eq!(correct_body["message"], wrong_body["message"]);
}

// --- Refresh rotation ---

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn refresh_token_is_strictly_single_use() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;
    let pair0 = login(&app, "a@b.com", "Secret1$pass").await;
    let t0 = pair0["refresh_token"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();

    // First rotation succeeds.
    let response = client
        .post(format!("{}/api/v1/auth/refresh", app.address))
        .json(&json!({ "refresh_token": t0 }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let pair1: Value = response.json().await.unwrap();
    let r1 = pair1["refresh_token"].as_str().unwrap().to_string();

    // Replaying the consumed token fails even though it is still
    // cryptographically valid and unexpired.
    let response = client
        .post(format!("{}/api/v1/auth/refresh", app.address))
        .json(&json!({ "refresh_token": t0 }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());

    // The freshly minted token still works.
    let response = client
        .post(format!("{}/api/v1/auth/refresh", app.address))
        .json(&json!({ "refresh_token": r1 }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn unknown_refresh_token_returns_401() {
    let app = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/auth/refresh", app.address))
        .json(&json!({ "refresh_token": "ey.not-issued-here.sig" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn validate_does_not_consume_the_token() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;
    let pair = login(&app, "a@b.com", "Secret1$pass").await;
    let refresh_token = pair["refresh_token"].as_str().unwrap();

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let response = client
            .post(format!("{}/api/v1/auth/validate", app.address))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(200, response.status().as_u16());
    }

    // Still usable after repeated validation.
    let response = client
        .post(format!("{}/api/v1/auth/refresh", app.address))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
}

// --- Logout ---

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn logout_is_idempotent_and_kills_the_refresh_token() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;
    let pair = login(&app, "a@b.com", "Secret1$pass").await;
    let refresh_token = pair["refresh_token"].as_str().unwrap();

    let client = reqwest::Client::new();

    // Twice in a row: the second call is a no-op, not an error.
    for _ in 0..2 {
        let response = client
            .post(format!("{}/api/v1/auth/logout", app.address))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(200, response.status().as_u16());
    }

    let response = client
        .post(format!("{}/api/v1/auth/refresh", app.address))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

// --- Request authentication ---

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn protected_route_works_with_access_token() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;
    let pair = login(&app, "a@b.com", "Secret1$pass").await;
    let access_token = pair["access_token"].as_str().unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/users/me", app.address))
        .bearer_auth(access_token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "a@b.com");
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn refresh_token_never_authenticates_a_protected_request() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;
    let pair = login(&app, "a@b.com", "Secret1$pass").await;
    let refresh_token = pair["refresh_token"].as_str().unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/users/me", app.address))
        .bearer_auth(refresh_token)
        .send()
        .await
        .expect("Failed to execute request.");

    // Treated as unauthenticated, so the guard rejects it.
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn garbage_bearer_token_is_rejected_with_structured_body() {
    let app = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/users/me", app.address))
        .bearer_auth("definitely.not.a-token")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["status"], 401);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["path"], "/api/v1/users/me");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn missing_bearer_on_protected_route_returns_401_from_the_guard() {
    let app = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/users/me", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn non_admin_cannot_list_users() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;
    let pair = login(&app, "a@b.com", "Secret1$pass").await;
    let access_token = pair["access_token"].as_str().unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/users", app.address))
        .bearer_auth(access_token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn admin_can_replace_and_deactivate_an_account() {
    let app = spawn_app().await;
    register_user(&app, "admin@example.com", "Secret1$pass").await;
    sqlx::query("UPDATE users SET role = 'ADMIN' WHERE email = 'admin@example.com'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to promote user");
    let pair = login(&app, "admin@example.com", "Secret1$pass").await;
    let admin_token = pair["access_token"].as_str().unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/users", app.address))
        .json(&json!({
            "email": "bob@example.com",
            "password": "Secret1$pass",
            "first_name": "Bob",
            "last_name": "Builder"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());
    let created: Value = response.json().await.unwrap();
    let bob_id = created["user"]["id"].as_str().unwrap().to_string();

    // Full replacement of the profile.
    let response = client
        .put(format!("{}/api/v1/users/{}", app.address, bob_id))
        .bearer_auth(admin_token)
        .json(&json!({
            "email": "bob@example.com",
            "first_name": "Robert",
            "last_name": "Builder"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["first_name"], "Robert");

    // Partial update flipping the account inactive signs Bob out.
    let response = client
        .patch(format!("{}/api/v1/users/{}", app.address, bob_id))
        .bearer_auth(admin_token)
        .json(&json!({ "active": false }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["active"], false);

    let response = client
        .post(format!("{}/api/v1/auth/login", app.address))
        .json(&json!({ "email": "bob@example.com", "password": "Secret1$pass" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn patch_me_updates_only_the_given_fields() {
    let app = spawn_app().await;
    register_user(&app, "a@b.com", "Secret1$pass").await;
    let pair = login(&app, "a@b.com", "Secret1$pass").await;
    let access_token = pair["access_token"].as_str().unwrap();

    let client = reqwest::Client::new();
    let response = client
        .patch(format!("{}/api/v1/users/me", app.address))
        .bearer_auth(access_token)
        .json(&json!({ "first_name": "Renamed" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["first_name"], "Renamed");
    assert_eq!(body["last_name"], "User");
    assert_eq!(body["email"], "a@b.com");
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn promoted_admin_can_list_users() {
    let app = spawn_app().await;
    register_user(&app, "admin@example.com", "Secret1$pass").await;

    sqlx::query("UPDATE users SET role = 'ADMIN' WHERE email = 'admin@example.com'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to promote user");

    // A fresh login picks up the new role in the claims.
    let pair = login(&app, "admin@example.com", "Secret1$pass").await;
    let access_token = pair["access_token"].as_str().unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/users", app.address))
        .bearer_auth(access_token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["total"], 1);
}
