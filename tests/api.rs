use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use lecture_server::{
    api,
    catalog::Catalog,
    identity::{USER_ID_HEADER, USER_ROLE_HEADER},
};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn test_app() -> Router {
    let catalog = Catalog::in_memory().await.unwrap();
    api::app(Arc::new(catalog), Duration::from_secs(5))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<(i64, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder
            .header(USER_ID_HEADER, id.to_string())
            .header(USER_ROLE_HEADER, role);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

const TEACHER: Option<(i64, &str)> = Some((1, "teacher"));
const STUDENT: Option<(i64, &str)> = Some((7, "student"));

#[tokio::test]
async fn test_limits_lecture_walkthrough() {
    let app = test_app().await;

    let (status, module) = call(
        &app,
        "POST",
        "/api/modules",
        TEACHER,
        Some(json!({
            "title": "Limits",
            "course": "Calculus",
            "type": "text",
            "content": { "text": "..." }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(module["id"], 1);
    assert_eq!(module["module_type"], "text");
    assert_eq!(module["author_id"], 1);

    let (status, lecture) = call(
        &app,
        "POST",
        "/api/lectures",
        TEACHER,
        Some(json!({ "title": "Intro", "course_name": "Calculus", "module_ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let lecture_id = lecture["id"].as_i64().unwrap();

    let (status, lecture) = call(&app, "GET", &format!("/api/lectures/{lecture_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        lecture["modules"],
        json!([{ "id": 1, "order": 0, "title": "Limits", "type": "text" }])
    );

    let (status, progress) = call(
        &app,
        "POST",
        &format!("/api/lectures/{lecture_id}/start"),
        STUDENT,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["current_module_index"], 0);
    assert_eq!(progress["completed_module_ids"], json!([]));
    assert_eq!(progress["student_id"], 7);

    let (status, progress) = call(
        &app,
        "POST",
        &format!("/api/lectures/{lecture_id}/complete"),
        STUDENT,
        Some(json!({ "module_id": 1, "score": 90 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["completed_module_ids"], json!([1]));
    assert_eq!(progress["current_module_index"], 1);

    let (status, progress) = call(
        &app,
        "GET",
        &format!("/api/lectures/{lecture_id}/progress"),
        STUDENT,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["progress_percent"], 100);
    assert_eq!(progress["scores"]["1"], 90.0);
}

#[tokio::test]
async fn test_error_statuses() {
    let app = test_app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/modules",
        TEACHER,
        Some(json!({ "title": "Limits", "course": "Calculus", "module_type": "bogus", "content": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("bogus"));

    let (status, _) = call(&app, "GET", "/api/modules/5", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/lectures",
        TEACHER,
        Some(json!({ "title": "Intro", "course_name": "Calculus", "module_ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        "POST",
        "/api/lectures",
        TEACHER,
        Some(json!({ "title": "Intro", "course_name": "Calculus", "module_ids": [3] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Modules not found: [3]");

    let (status, _) = call(
        &app,
        "POST",
        "/api/courses",
        None,
        Some(json!({ "name": "Topology" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        "POST",
        "/api/courses",
        STUDENT,
        Some(json!({ "name": "Topology" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "POST", "/api/courses", TEACHER, Some(json!({ "name": "Economics" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reorder_and_list() {
    let app = test_app().await;
    for title in ["A", "B", "C"] {
        let (status, _) = call(
            &app,
            "POST",
            "/api/modules",
            TEACHER,
            Some(json!({
                "title": title,
                "course": "Algebra",
                "module_type": "question",
                "content": [{ "question": "1+1?", "answers": ["1", "2"], "correct": 1 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, lecture) = call(
        &app,
        "POST",
        "/api/lectures",
        TEACHER,
        Some(json!({ "title": "Sums", "course_name": "Algebra", "module_ids": [1, 2, 3] })),
    )
    .await;
    let id = lecture["id"].as_i64().unwrap();

    let (status, lecture) = call(
        &app,
        "POST",
        &format!("/api/lectures/{id}/move"),
        TEACHER,
        Some(json!({ "index": 0, "direction": "down" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lecture["module_ids"], json!([2, 1, 3]));

    let (_, lecture) = call(
        &app,
        "POST",
        &format!("/api/lectures/{id}/move"),
        TEACHER,
        Some(json!({ "index": 2, "direction": "down" })),
    )
    .await;
    assert_eq!(lecture["module_ids"], json!([2, 1, 3]));

    let (status, modules) = call(
        &app,
        "GET",
        "/api/modules?course_name=Algebra&module_type=question&search=b",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(modules.as_array().unwrap().len(), 1);
    assert_eq!(modules[0]["title"], "B");

    let (_, lectures) = call(&app, "GET", "/api/lectures?course_name=Algebra", None, None).await;
    assert_eq!(lectures[0]["modules_count"], 3);

    let (status, _) = call(&app, "DELETE", "/api/modules/1", TEACHER, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(&app, "DELETE", &format!("/api/lectures/{id}"), TEACHER, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", "/api/modules/1", TEACHER, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_openapi_document() {
    let app = test_app().await;
    let (status, doc) = call(&app, "GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/lectures/{id}/complete"].is_object());
    assert!(doc["paths"]["/api/modules"].is_object());
}
