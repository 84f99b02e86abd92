/*!
 * HTTP endpoint tests, driven through the router with `oneshot`
 */

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use ksl_review::database::Repository;
use ksl_review::progress::{NdjsonDecoder, ProgressEvent};
use ksl_review::providers::mock::MockProvider;
use ksl_review::server::{AppState, build_router};
use ksl_review::translation::FinalStatus;

use crate::common::{coordinator, init_logging, sample_csv};

const UPLOAD_LIMIT: usize = 64 * 1024;

fn test_router(repository: Option<Repository>) -> axum::Router {
    let state = AppState::new(coordinator(MockProvider::working()), repository, UPLOAD_LIMIT);
    build_router(state)
}

async fn send(app: &axum::Router, method: Method, path: &str, body: Body) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder().method(method).uri(path).body(body).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

fn decode_events(body: &[u8]) -> Vec<ProgressEvent> {
    let mut decoder = NdjsonDecoder::new();
    let events: Vec<ProgressEvent> = decoder.feed(body).into_iter().map(Result::unwrap).collect();
    assert_eq!(decoder.pending(), 0, "stream must end with a newline");
    events
}

#[tokio::test]
async fn test_healthEndpoint_shouldReportStatus() {
    let app = test_router(None);

    let (status, _, body) = send(&app, Method::GET, "/api/health", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["persistence"], false);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_modelInfoEndpoint_shouldDescribeProvider() {
    let app = test_router(None);

    let (status, _, body) = send(&app, Method::GET, "/api/model-info", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["provider"], "mock");
    assert_eq!(body["model_id"], "mock-model");
    assert_eq!(body["is_fine_tuned"], false);
}

#[tokio::test]
async fn test_translateCsv_withValidUpload_shouldStreamProgressThenComplete() {
    init_logging();
    let app = test_router(None);

    let (status, content_type, body) =
        send(&app, Method::POST, "/api/translate-csv", Body::from(sample_csv())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/x-ndjson"));

    let events = decode_events(&body);
    assert_eq!(events.len(), 4);
    assert!(events[..3].iter().all(|e| matches!(e, ProgressEvent::Progress(_))));

    let ProgressEvent::Complete(payload) = &events[3] else {
        panic!("expected complete, got {:?}", events[3]);
    };
    let ids: Vec<&str> = payload.results.iter().map(|r| r.sentence_id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
    assert!(payload.results.iter().all(|r| r.final_status == FinalStatus::Success1st));
    assert_eq!(payload.results[0].human_reference.as_deref(), Some("{안녕하세요}"));
    assert_eq!(payload.results[2].source_text, "사과, 배를 샀어요");
    assert_eq!(payload.statistics.successful, 3);
}

#[tokio::test]
async fn test_translateCsv_withRetries_shouldSerializeAttemptFields() {
    let app = test_router(None);

    let (_, _, body) = send(&app, Method::POST, "/api/translate-csv", Body::from(sample_csv())).await;

    let last_line = body
        .split(|b| *b == b'\n')
        .filter(|l| !l.is_empty())
        .last()
        .unwrap();
    let complete: Value = serde_json::from_slice(last_line).unwrap();
    assert_eq!(complete["type"], "complete");

    let first = &complete["results"][0];
    assert_eq!(first["sentenceId"], "s1");
    assert_eq!(first["finalStatus"], "success_1st");
    assert!(first["attempt_1_result"].is_object());
    assert!(first.get("attempt_2_result").is_none());
}

#[tokio::test]
async fn test_translateCsv_withMissingColumn_shouldReturnErrorLine() {
    let app = test_router(None);

    let (status, content_type, body) = send(
        &app,
        Method::POST,
        "/api/translate-csv",
        Body::from("id,text\n1,안녕하세요\n"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type.as_deref(), Some("application/x-ndjson"));
    let events = decode_events(&body);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ProgressEvent::Error { error } => assert!(error.contains("korean_text")),
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_translateCsv_withPanickingProvider_shouldEndWithErrorEvent() {
    init_logging();
    let provider = MockProvider::scripted(|prompt, _params| panic!("provider bug on {}", prompt));
    let app = build_router(AppState::new(coordinator(provider), None, UPLOAD_LIMIT));

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/translate-csv",
        Body::from("sentence_id,korean_text\ns1,안녕하세요\n"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = decode_events(&body);
    match events.last() {
        Some(ProgressEvent::Error { error }) => assert!(error.contains("provider bug on 안녕하세요")),
        other => panic!("expected a terminal error event, got {:?}", other),
    }
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Complete(_))));
}

#[tokio::test]
async fn test_translateCsv_withOversizedBody_shouldReject() {
    let app = test_router(None);
    let mut csv = String::from("sentence_id,korean_text\n");
    while csv.len() <= UPLOAD_LIMIT {
        csv.push_str("s,오늘 날씨가 좋네요\n");
    }

    let (status, _, body) = send(&app, Method::POST, "/api/translate-csv", Body::from(csv)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let events = decode_events(&body);
    assert!(matches!(&events[0], ProgressEvent::Error { error } if error.contains("limit")));
}

#[tokio::test]
async fn test_storedBatch_withPersistence_shouldBeQueryableAndRemovable() {
    init_logging();
    let repository = Repository::new_in_memory().unwrap();
    let app = test_router(Some(repository));

    let (_, _, body) = send(&app, Method::POST, "/api/translate-csv", Body::from(sample_csv())).await;
    let events = decode_events(&body);
    let Some(ProgressEvent::Complete(payload)) = events.last() else {
        panic!("expected complete as the last event");
    };
    let batch_id = payload.upload_batch_id.clone().expect("run should be stored");

    let path = format!("/api/batches/{}", batch_id);
    let (status, _, body) = send(&app, Method::GET, &path, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["batch"]["stored_records"], 3);
    assert_eq!(body["stats"]["total"], 3);
    assert_eq!(body["stats"]["pending"], 3);
    assert_eq!(body["stats"]["with_human_translation"], 1);

    let (status, _, body) = send(&app, Method::DELETE, &path, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["removed"], 3);

    let (status, _, _) = send(&app, Method::GET, &path, Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batchRoutes_withoutPersistence_shouldReturnNotFound() {
    let app = test_router(None);

    let (status, _, body) = send(&app, Method::DELETE, "/api/batches", Body::empty()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], false);
}
