mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::Router;
use serde_json::{Value, json};
use tower::ServiceExt;

use broll_studio::web;

use common::*;

fn app(h: &Harness) -> Router {
    web::router(h.studio.clone(), h.media_dir.path())
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let h = harness().await;
    let response = app(&h).oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn credential_can_be_cleared_and_selected() {
    let h = harness().await;

    let response = app(&h).oneshot(get("/api/credential")).await.unwrap();
    assert_eq!(read_json(response).await, json!({ "selected": true }));

    let response = app(&h)
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/credential")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!h.studio.credential_status().selected);

    let response = app(&h)
        .oneshot(json_request(
            Method::PUT,
            "/api/credential",
            json!({ "api_key": "  new-key  " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(h.studio.credential_status().selected);
}

#[tokio::test]
async fn invalid_image_count_is_a_bad_request() {
    let h = harness().await;
    let response = app(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/images",
            json!({ "prompt": "a harbour", "count": 9 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "validation");
    assert!(h.backend.keys_seen.lock().is_empty());
}

#[tokio::test]
async fn missing_credential_is_unauthorized() {
    let h = harness_with(FakeBackend::new(), None, fast_poll()).await;
    let response = app(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/prompts/enhance",
            json!({ "prompt": "a cat" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["kind"], "credential");
}

#[tokio::test]
async fn video_request_is_accepted_and_listed_as_pending() {
    let h = harness().await;
    h.backend.script_operation("city at dusk", vec![running()]);

    let response = app(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/videos",
            json!({ "prompt": "city at dusk", "aspect_ratio": "9:16" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = read_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app(&h)
        .oneshot(get(&format!("/api/videos/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job = read_json(response).await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["prompt"], "city at dusk");
    assert!(job["progress"].is_string());

    let response = app(&h).oneshot(get("/api/videos")).await.unwrap();
    let listing = read_json(response).await;
    assert_eq!(listing["pending"], 1);
    assert_eq!(listing["jobs"].as_array().unwrap().len(), 1);

    h.studio.shutdown().await;
}

#[tokio::test]
async fn unknown_video_job_is_not_found() {
    let h = harness().await;
    let response = app(&h)
        .oneshot(get(&format!("/api/videos/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let h = harness().await;
    let boundary = "XBOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{boundary}--\r\n"
    );
    let response = app(&h)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/uploads")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.studio.images().is_empty());
}

#[tokio::test]
async fn unknown_aspect_ratio_is_a_validation_error() {
    let h = harness().await;
    let response = app(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/images",
            json!({ "prompt": "a harbour", "count": 1, "aspect_ratio": "21:9" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("aspect_ratio"));
    assert!(h.backend.keys_seen.lock().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let h = harness().await;
    let response = app(&h)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/videos")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"prompt\": "))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["kind"], "validation");
    assert!(h.studio.video_jobs().is_empty());
}

#[tokio::test]
async fn malformed_path_parameters_are_validation_errors() {
    let h = harness().await;
    for uri in ["/api/videos/not-a-uuid", "/api/suggestions/first"] {
        let request = if uri.starts_with("/api/videos") {
            get(uri)
        } else {
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };
        let response = app(&h).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(read_json(response).await["kind"], "validation", "{uri}");
    }
}
