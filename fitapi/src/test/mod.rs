//! End-to-end tests through the full router: credential resolution, both gates and the error
//! envelope together.

use std::{sync::Arc, time::Duration};

use axum::http::{StatusCode, header};
use axum_test::TestServer;
use serde_json::Value;

use crate::{
    AppState, build_router,
    auth::roles::{Role, RoleHierarchy},
    db::handlers::{InMemoryUsers, UserStore},
    test_utils::{FailingSessions, create_test_app, create_test_config, login_as, seed_user},
};

fn assert_envelope(body: &Value, status: u16, message: &str) {
    assert_eq!(body["status"], status);
    assert_eq!(body["message"], message);
    assert!(body.get("data").is_none(), "error bodies carry no data: {body}");
    let timestamp = body["timestamp"].as_str().expect("timestamp should be a string");
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[test_log::test]
fn test_default_hierarchy_relations() {
    let hierarchy = RoleHierarchy::default();

    assert!(hierarchy.satisfies(Role::Admin, Role::User));
    assert!(!hierarchy.satisfies(Role::User, Role::Admin));
    assert!(!hierarchy.satisfies(Role::Moderator, Role::Admin));
}

#[test_log::test(tokio::test)]
async fn test_expired_session_falls_back_to_bearer_then_role_gate_rejects() {
    let (server, state) = create_test_app(create_test_config()).await;
    let member = seed_user(&state, "member@example.com", "password123", Role::User).await;

    let expired = state.sessions.create_session(member.id, Duration::ZERO).await.unwrap();
    let bearer = state.tokens.issue(member.id).unwrap();

    // The bearer token identifies the caller as USER
    let response = server
        .get("/auth/me")
        .add_header(header::COOKIE, format!("session={}", expired.token))
        .add_header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["id"], member.id.to_string());
    assert_eq!(body["data"]["role"], "USER");

    // ... which does not satisfy ADMIN
    let response = server
        .get("/users")
        .add_header(header::COOKIE, format!("session={}", expired.token))
        .add_header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_envelope(&response.json(), 403, "Insufficient permissions");
}

#[test_log::test(tokio::test)]
async fn test_no_credentials_is_401_before_role_check() {
    let (server, _state) = create_test_app(create_test_config()).await;

    for path in ["/users", "/auth/me"] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_envelope(&response.json(), 401, "Not authenticated");
    }
}

#[test_log::test(tokio::test)]
async fn test_role_gate_lets_inheriting_roles_through() {
    let (server, state) = create_test_app(create_test_config()).await;
    let member = seed_user(&state, "member@example.com", "password123", Role::User).await;
    seed_user(&state, "admin@example.com", "password123", Role::Admin).await;

    // ADMIN inherits MODERATOR, so the MODERATOR route is open to it
    let admin = login_as(&server, "admin@example.com", "password123").await;
    server
        .get(&format!("/users/{}", member.id))
        .add_header(header::COOKIE, admin)
        .await
        .assert_status_ok();
}

#[test_log::test(tokio::test)]
async fn test_session_wins_over_bearer_for_other_user() {
    let (server, state) = create_test_app(create_test_config()).await;
    seed_user(&state, "member@example.com", "password123", Role::User).await;
    let admin = seed_user(&state, "admin@example.com", "password123", Role::Admin).await;

    let member_cookie = login_as(&server, "member@example.com", "password123").await;
    let admin_bearer = state.tokens.issue(admin.id).unwrap();

    // Identities are never merged; the session is authoritative
    server
        .get("/users")
        .add_header(header::COOKIE, member_cookie)
        .add_header(header::AUTHORIZATION, format!("Bearer {admin_bearer}"))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[test_log::test(tokio::test)]
async fn test_malformed_authorization_is_401() {
    let (server, state) = create_test_app(create_test_config()).await;
    let admin = seed_user(&state, "admin@example.com", "password123", Role::Admin).await;
    let token = state.tokens.issue(admin.id).unwrap();

    for value in [
        format!("bearer {token}"),
        format!("Token {token}"),
        token.clone(),
        "Bearer not-a-jwt".to_string(),
        "Basic YWRtaW46cGFzc3dvcmQ=".to_string(),
    ] {
        server
            .get("/auth/me")
            .add_header(header::AUTHORIZATION, value)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

#[test_log::test(tokio::test)]
async fn test_forged_session_cookie_is_401() {
    let (server, _state) = create_test_app(create_test_config()).await;

    server
        .get("/auth/me")
        .add_header(header::COOKIE, "session=not-a-real-session")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[test_log::test(tokio::test)]
async fn test_duplicate_session_cookies_try_each_value() {
    let (server, state) = create_test_app(create_test_config()).await;
    seed_user(&state, "member@example.com", "password123", Role::User).await;
    let cookie = login_as(&server, "member@example.com", "password123").await;

    server
        .get("/auth/me")
        .add_header(header::COOKIE, format!("session=stale-from-old-path; {cookie}"))
        .await
        .assert_status_ok();
}

#[test_log::test(tokio::test)]
async fn test_custom_cookie_name() {
    let mut config = create_test_config();
    config.auth.session.cookie_name = "fit_session".to_string();
    let (server, state) = create_test_app(config).await;
    seed_user(&state, "member@example.com", "password123", Role::User).await;

    let cookie = login_as(&server, "member@example.com", "password123").await;
    assert!(cookie.starts_with("fit_session="));

    server.get("/auth/me").add_header(header::COOKIE, cookie.clone()).await.assert_status_ok();

    // The default name is no longer recognised
    let renamed = cookie.replacen("fit_session=", "session=", 1);
    server
        .get("/auth/me")
        .add_header(header::COOKIE, renamed)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[test_log::test(tokio::test)]
async fn test_custom_hierarchy_changes_gate_outcomes() {
    // Flat hierarchy: nobody inherits anything
    let mut config = create_test_config();
    config.auth.role_hierarchy = [(Role::User, vec![]), (Role::Moderator, vec![]), (Role::Admin, vec![])]
        .into_iter()
        .collect();
    let (server, state) = create_test_app(config).await;
    let member = seed_user(&state, "member@example.com", "password123", Role::User).await;
    seed_user(&state, "admin@example.com", "password123", Role::Admin).await;

    let admin = login_as(&server, "admin@example.com", "password123").await;
    server
        .get("/users")
        .add_header(header::COOKIE, admin.clone())
        .await
        .assert_status_ok();
    server
        .get(&format!("/users/{}", member.id))
        .add_header(header::COOKIE, admin)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[test_log::test(tokio::test)]
async fn test_session_storage_outage_still_admits_bearer() {
    let users: Arc<dyn UserStore> = Arc::new(InMemoryUsers::new());
    let state = AppState::from_config(create_test_config(), users, Arc::new(FailingSessions)).unwrap();
    let admin = seed_user(&state, "admin@example.com", "password123", Role::Admin).await;
    let bearer = state.tokens.issue(admin.id).unwrap();
    let server = TestServer::new(build_router(&state)).unwrap();

    server
        .get("/users")
        .add_header(header::COOKIE, "session=whatever")
        .add_header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .await
        .assert_status_ok();

    // Without a bearer token the outage is indistinguishable from a bad cookie
    server
        .get("/users")
        .add_header(header::COOKIE, "session=whatever")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[test_log::test(tokio::test)]
async fn test_unknown_route_is_404_not_401() {
    let (server, _state) = create_test_app(create_test_config()).await;
    server.get("/nowhere").await.assert_status(StatusCode::NOT_FOUND);
}
