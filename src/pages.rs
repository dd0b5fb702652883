//! Placeholder HTML pages.
//!
//! Only enough markup for the page guard to have something to protect. The
//! protected pages are reached through `page_guard`, which puts the resolved
//! session into request extensions.

use axum::{
    Extension, Router,
    extract::Query,
    response::{Html, Redirect},
    routing::get,
};
use serde::Deserialize;

use crate::auth::AuthenticatedSession;

pub fn router() -> Router {
    Router::new()
        .route("/", get(Redirect::to("/dashboard")))
        .route("/login", get(login_page))
        .route("/access-denied", get(access_denied_page))
        .route("/reset-password", get(reset_password_page))
        .route("/dashboard", get(protected_page))
        .route("/grades", get(protected_page))
        .route("/timetable", get(protected_page))
        .route("/admin", get(protected_page))
        .route("/editor", get(protected_page))
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body>{}</body></html>",
        title, body
    ))
}

/// Minimal escaping for values echoed into markup.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginQuery {
    error: Option<String>,
    callback_url: Option<String>,
}

async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    let mut body = String::from("<h1>Login</h1>");
    if let Some(error) = query.error {
        body.push_str(&format!(
            "<p class=\"error\" data-error=\"{0}\">Your session has ended ({0}). Please log in again.</p>",
            escape(&error)
        ));
    }
    if let Some(callback) = query.callback_url {
        body.push_str(&format!(
            "<input type=\"hidden\" name=\"callbackUrl\" value=\"{}\">",
            escape(&callback)
        ));
    }
    page("Login", &body)
}

async fn access_denied_page() -> Html<String> {
    page(
        "Access denied",
        "<h1>Access denied</h1><p>Your role does not permit this page.</p>",
    )
}

async fn reset_password_page() -> Html<String> {
    page("Reset password", "<h1>Choose a new password</h1>")
}

async fn protected_page(Extension(session): Extension<AuthenticatedSession>) -> Html<String> {
    page(
        "Gradebook",
        &format!(
            "<h1>Gradebook</h1><p data-user-id=\"{}\" data-role=\"{}\">Signed in.</p>",
            session.user_id,
            session.role.as_str()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&"), "&lt;a href=&quot;x&quot;&gt;&amp;");
    }
}
