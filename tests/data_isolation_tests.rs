mod common;

use common::*;
use serde_json::{Value, json};

async fn send_json(
    app: &TestApp,
    method: &str,
    uri: &str,
    cookies: &Cookies,
    body: Option<Value>,
) -> (u16, Value) {
    let response = app
        .send(request(method, uri, Some(&cookies.header()), body))
        .await;
    let status = response.status().as_u16();
    (status, body_json(response).await)
}

async fn create_subject(app: &TestApp, cookies: &Cookies, name: &str) -> i64 {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/subjects",
        cookies,
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, 201);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_subjects_are_per_user() {
    let app = test_app().await;
    let alice = register_and_login(&app, "alice@example.com").await;
    let bob = register_and_login(&app, "bob@example.com").await;

    let math = create_subject(&app, &alice, "Math").await;

    // Names are unique per user only
    let (status, _) = send_json(&app, "POST", "/api/subjects", &alice, Some(json!({ "name": "Math" }))).await;
    assert_eq!(status, 409);
    create_subject(&app, &bob, "Math").await;

    let (_, list) = send_json(&app, "GET", "/api/subjects", &alice, None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "Math");

    let uri = format!("/api/subjects/{}", math);
    let (status, _) = send_json(&app, "PUT", &uri, &bob, Some(json!({ "name": "Stolen" }))).await;
    assert_eq!(status, 404);
    let (status, _) = send_json(&app, "DELETE", &uri, &bob, None).await;
    assert_eq!(status, 404);

    let (status, body) = send_json(&app, "PUT", &uri, &alice, Some(json!({ "name": "Algebra" }))).await;
    assert_eq!(status, 200);
    assert_eq!(body["name"], "Algebra");
    let (status, _) = send_json(&app, "DELETE", &uri, &alice, None).await;
    assert_eq!(status, 204);
}

#[tokio::test]
async fn test_grades_are_per_user() {
    let app = test_app().await;
    let alice = register_and_login(&app, "carol@example.com").await;
    let bob = register_and_login(&app, "dave@example.com").await;
    let subject = create_subject(&app, &alice, "Physics").await;

    // Grades cannot be attached to someone else's subject
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/grades",
        &bob,
        Some(json!({ "subjectId": subject, "value": 1.0, "year": 2024 })),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Subject not found");

    let (status, grade) = send_json(
        &app,
        "POST",
        "/api/grades",
        &alice,
        Some(json!({ "subjectId": subject, "value": 2.5, "year": 2024 })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(grade["subjectName"], "Physics");
    let id = grade["id"].as_i64().unwrap();

    let (_, list) = send_json(&app, "GET", "/api/grades", &bob, None).await;
    assert!(list.as_array().unwrap().is_empty());

    let uri = format!("/api/grades/{}", id);
    let (status, _) = send_json(&app, "PUT", &uri, &bob, Some(json!({ "value": 1.0, "year": 2024 }))).await;
    assert_eq!(status, 404);
    let (status, _) = send_json(&app, "DELETE", &uri, &bob, None).await;
    assert_eq!(status, 404);

    let (status, updated) = send_json(&app, "PUT", &uri, &alice, Some(json!({ "value": 1.5, "year": 2025 }))).await;
    assert_eq!(status, 200);
    assert_eq!(updated["value"], 1.5);
    assert_eq!(updated["year"], 2025);
}

#[tokio::test]
async fn test_delete_grades_by_subject_and_year() {
    let app = test_app().await;
    let cookies = register_and_login(&app, "erin@example.com").await;
    let subject = create_subject(&app, &cookies, "History").await;

    for (value, year) in [(1.0, 2023), (2.0, 2024), (3.0, 2024)] {
        send_json(
            &app,
            "POST",
            "/api/grades",
            &cookies,
            Some(json!({ "subjectId": subject, "value": value, "year": year })),
        )
        .await;
    }

    let target = json!({ "subjectId": subject, "year": 2024 });
    let (status, _) = send_json(&app, "DELETE", "/api/grades/by-subject-and-year", &cookies, Some(target.clone())).await;
    assert_eq!(status, 204);

    let (_, list) = send_json(&app, "GET", "/api/grades", &cookies, None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["year"], 2023);

    let (status, body) = send_json(&app, "DELETE", "/api/grades/by-subject-and-year", &cookies, Some(target)).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "No grades found for this subject and year");
}

#[tokio::test]
async fn test_timetable_replaces_grid_and_drops_foreign_subjects() {
    let app = test_app().await;
    let alice = register_and_login(&app, "frank@example.com").await;
    let bob = register_and_login(&app, "gina@example.com").await;
    let own = create_subject(&app, &alice, "Biology").await;
    let foreign = create_subject(&app, &bob, "Chemistry").await;

    let grid = json!({ "data": [
        { "label": "08:00", "cells": [{ "subjectId": own }, { "subjectId": foreign }, {}] },
        { "label": "09:00", "cells": [{ "subjectId": own }] }
    ]});
    let (status, saved) = send_json(&app, "POST", "/api/timetable", &alice, Some(grid)).await;
    assert_eq!(status, 200);
    let rows = saved.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["label"], "08:00");
    assert_eq!(rows[0]["cells"][0]["subjectName"], "Biology");
    assert!(rows[0]["cells"][1]["subjectId"].is_null());
    assert!(rows[0]["cells"][2]["subjectId"].is_null());

    let (_, fetched) = send_json(&app, "GET", "/api/timetable", &alice, None).await;
    assert_eq!(fetched, saved);

    let (_, other) = send_json(&app, "GET", "/api/timetable", &bob, None).await;
    assert!(other.as_array().unwrap().is_empty());

    // A second save replaces the first
    let grid = json!({ "data": [{ "label": "10:00", "cells": [] }] });
    let (_, saved) = send_json(&app, "POST", "/api/timetable", &alice, Some(grid)).await;
    assert_eq!(saved.as_array().unwrap().len(), 1);

    let (status, _) = send_json(&app, "POST", "/api/timetable", &alice, Some(json!({}))).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_appointments_are_per_user() {
    let app = test_app().await;
    let alice = register_and_login(&app, "hank@example.com").await;
    let bob = register_and_login(&app, "ivan@example.com").await;

    let future = (chrono::Utc::now() + chrono::Duration::days(3)).to_rfc3339();
    let (status, created) = send_json(
        &app,
        "POST",
        "/api/appointments",
        &alice,
        Some(json!({ "title": "Exam", "date": future })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(created["title"], "Exam");
    let id = created["id"].as_i64().unwrap();

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/appointments",
        &alice,
        Some(json!({ "title": "Bad", "date": "next tuesday" })),
    )
    .await;
    assert_eq!(status, 400);

    let (_, list) = send_json(&app, "GET", "/api/appointments", &alice, None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, list) = send_json(&app, "GET", "/api/appointments?all=true", &bob, None).await;
    assert!(list.as_array().unwrap().is_empty());

    let uri = format!("/api/appointments?id={}", id);
    let (status, _) = send_json(&app, "DELETE", &uri, &bob, None).await;
    assert_eq!(status, 404);
    let (status, _) = send_json(&app, "DELETE", "/api/appointments", &alice, None).await;
    assert_eq!(status, 400);
    let (status, _) = send_json(&app, "DELETE", &uri, &alice, None).await;
    assert_eq!(status, 204);
}

#[tokio::test]
async fn test_data_routes_require_session() {
    let app = test_app().await;

    for uri in ["/api/subjects", "/api/grades", "/api/timetable", "/api/appointments"] {
        let response = app.send(get(uri, None)).await;
        assert_eq!(response.status(), 401, "{}", uri);
    }
}
