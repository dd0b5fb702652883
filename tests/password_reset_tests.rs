mod common;

use common::*;
use serde_json::json;

async fn forgot(app: &TestApp, email: &str) -> axum::http::Response<axum::body::Body> {
    app.send(request(
        "POST",
        "/api/forgot-password",
        None,
        Some(json!({ "email": email })),
    ))
    .await
}

async fn reset(
    app: &TestApp,
    token: &str,
    password: &str,
) -> axum::http::Response<axum::body::Body> {
    app.send(request(
        "POST",
        "/api/reset-password",
        None,
        Some(json!({ "token": token, "password": password })),
    ))
    .await
}

#[tokio::test]
async fn test_forgot_password_response_does_not_reveal_accounts() {
    let app = test_app().await;
    register(&app, "alice@example.com", TEST_PASSWORD).await;

    let known = forgot(&app, "alice@example.com").await;
    assert_eq!(known.status(), 200);
    let known = body_json(known).await;

    let unknown = forgot(&app, "nobody@example.com").await;
    assert_eq!(unknown.status(), 200);
    let unknown = body_json(unknown).await;

    assert_eq!(known, unknown);
    assert_eq!(known["message"], "Verification Email has been sent.");

    let sent = app.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "alice@example.com");
    assert!(sent[0].link.starts_with("http://localhost:3000/reset-password?token="));
}

#[tokio::test]
async fn test_reset_with_unknown_token_fails() {
    let app = test_app().await;

    let response = reset(&app, "deadbeef", "new-password-1").await;
    assert_eq!(response.status(), 400);
    assert_eq!(body_json(response).await["error"], "Invalid or outdated Token.");
}

#[tokio::test]
async fn test_reset_with_expired_token_fails() {
    let app = test_app().await;
    register(&app, "bob@example.com", TEST_PASSWORD).await;
    forgot(&app, "bob@example.com").await;
    let token = app.mailer.last_token().unwrap();

    // Push the stored expiry into the past
    sqlx::query("UPDATE users SET password_reset_expires = 1 WHERE email = ?")
        .bind("bob@example.com")
        .execute(app.db.pool())
        .await
        .unwrap();

    let response = reset(&app, &token, "new-password-1").await;
    assert_eq!(response.status(), 400);
    assert_eq!(body_json(response).await["error"], "Invalid or outdated Token.");
}

#[tokio::test]
async fn test_reset_enforces_password_policy() {
    let app = test_app().await;
    register(&app, "carol@example.com", TEST_PASSWORD).await;
    forgot(&app, "carol@example.com").await;
    let token = app.mailer.last_token().unwrap();

    let response = reset(&app, &token, "short").await;
    assert_eq!(response.status(), 400);

    // The token survives a rejected password
    let response = reset(&app, &token, "long-enough-password").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_reset_changes_password_and_revokes_sessions() {
    let app = test_app().await;
    let cookies = register_and_login(&app, "dave@example.com").await;
    forgot(&app, "dave@example.com").await;
    let token = app.mailer.last_token().unwrap();

    let response = reset(&app, &token, "brand-new-password").await;
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["message"], "Password has been reset.");

    // Every existing session is gone
    let response = app.send(get("/api/auth/session", Some(&cookies.header()))).await;
    assert_eq!(response.status(), 401);

    let old = login(&app, "dave@example.com", TEST_PASSWORD, false).await;
    assert_eq!(old.status(), 401);
    let new = login(&app, "dave@example.com", "brand-new-password", false).await;
    assert_eq!(new.status(), 200);

    // Tokens are single use
    let response = reset(&app, &token, "another-password").await;
    assert_eq!(response.status(), 400);
}
