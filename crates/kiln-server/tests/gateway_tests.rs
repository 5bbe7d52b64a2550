//! Gateway behavior over the real router, scheduler, and stub runtime.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use http_body_util::BodyExt;
use kiln_scheduler::{InferenceScheduler, ResponseAggregator, StubRuntime};
use kiln_server::{build_router, AppState, ChatApiResponse, ErrorBody};
use kiln_types::{ChatRequest, CompletionStatus, GenerationParams, SchedulerConfig};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn test_app() -> (Router, Arc<InferenceScheduler>) {
    test_app_with(Duration::ZERO)
}

fn test_app_with(token_delay: Duration) -> (Router, Arc<InferenceScheduler>) {
    let config = SchedulerConfig {
        concurrency: 1,
        max_queue_depth: 4,
        ..Default::default()
    };
    let runtime = Arc::new(StubRuntime::new(token_delay));
    let scheduler = InferenceScheduler::spawn(config, runtime).unwrap();
    let state = AppState {
        scheduler: Arc::clone(&scheduler),
        defaults: GenerationParams::default(),
        started_at: chrono::Utc::now(),
    };
    (build_router(state), scheduler)
}

fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn buffered_chat_round_trip() {
    let (app, scheduler) = test_app();

    let response = app
        .oneshot(chat_request(r#"{"message": "hello world"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: ChatApiResponse = body_json(response).await;
    assert_eq!(body.status, CompletionStatus::Complete);
    assert_eq!(body.reply, "echo: hello world ");
    assert_eq!(body.usage.completion_tokens, 3);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let (app, scheduler) = test_app();

    let response = app
        .oneshot(chat_request(r#"{"message": ""}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "invalid_request");
    scheduler.shutdown().await;
}

#[tokio::test]
async fn out_of_range_temperature_is_rejected() {
    let (app, scheduler) = test_app();

    let response = app
        .oneshot(chat_request(r#"{"message": "hi", "temperature": 9.5}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn max_tokens_caps_the_reply() {
    let (app, scheduler) = test_app();

    let response = app
        .oneshot(chat_request(
            r#"{"message": "one two three four five", "max_tokens": 2}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: ChatApiResponse = body_json(response).await;
    assert_eq!(body.usage.completion_tokens, 2);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn streaming_reply_ends_with_done_frame() {
    let (app, scheduler) = test_app();

    let response = app
        .oneshot(chat_request(r#"{"message": "a b", "stream": true}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#""delta":"echo: ""#));
    assert!(text.contains(r#""status":"complete""#));
    // Terminal marker appears exactly once, then the done frame.
    assert_eq!(text.matches(r#""status":"#).count(), 1);
    assert!(text.trim_end().ends_with("data: [DONE]"));
    scheduler.shutdown().await;
}

#[tokio::test]
async fn deadline_with_no_output_is_a_gateway_timeout() {
    let (app, scheduler) = test_app_with(Duration::from_millis(200));

    let response = app
        .oneshot(chat_request(r#"{"message": "slow reply", "timeout_ms": 5}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "deadline_exceeded");
    scheduler.shutdown().await;
}

#[tokio::test]
async fn streaming_client_disconnect_cancels_generation() {
    let (app, scheduler) = test_app_with(Duration::from_millis(20));

    let message = ["token"; 64].join(" ");
    let body = format!(r#"{{"message": "{message}", "stream": true}}"#);
    let response = app.oneshot(chat_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Read one chunk, then hang up mid-stream.
    let mut data = response.into_body().into_data_stream();
    assert!(data.next().await.is_some());
    drop(data);

    // The worker notices within a token boundary or two.
    for _ in 0..500 {
        let stats = scheduler.stats();
        if stats.cancelled == 1 && stats.running == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let stats = scheduler.stats();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.running, 0);

    // The slot is free for the next request.
    let handle = scheduler.submit(ChatRequest::new("after")).unwrap();
    let done = ResponseAggregator::buffer(handle).await;
    assert_eq!(done.status, CompletionStatus::Complete);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn health_reports_scheduler_stats() {
    let (app, scheduler) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["scheduler"]["completed"].is_u64());
    scheduler.shutdown().await;
}
