/*!
 * End-to-end tests of the controller: CSV file in, result CSV out
 */

use std::sync::Arc;

use ksl_review::app_config::Config;
use ksl_review::app_controller::{self, Controller};
use ksl_review::export::RESULT_HEADERS;
use ksl_review::providers::mock::MockProvider;
use ksl_review::server::{AppState, build_router};
use ksl_review::translation::BatchConfig;

use crate::common::mock_providers::{Reply, planned_provider};
use crate::common::{coordinator, create_temp_dir, create_test_file, init_logging, sample_csv};

fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.batching = BatchConfig::without_delays();
    config
}

#[tokio::test]
async fn test_translateFile_shouldWriteResultCsvNextToInput() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "sentences.csv", sample_csv()).unwrap();
    let provider = planned_provider(vec![("오늘 날씨가 좋네요", vec![Reply::hallucinated_dates()])]);
    let controller = Controller::with_provider(test_config(), Arc::new(provider)).unwrap();

    let written = controller.translate_file(&input, None).await.unwrap();

    assert_eq!(written, dir.path().join("sentences_translated.csv"));
    let content = std::fs::read_to_string(&written).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], RESULT_HEADERS.join(","));
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("s1,안녕하세요.,{안녕하세요},{안녕하세요},success_1st,"));
    assert_eq!(
        lines[2],
        "s2,오늘 날씨가 좋네요,,{오늘 날씨가 좋네요},success_2nd,,{2019}+년+{3}+월+{27}+일,{오늘 날씨가 좋네요},"
    );
    assert!(lines[3].starts_with("s3,\"사과, 배를 샀어요\""));
}

#[tokio::test]
async fn test_translateFile_withBadCsv_shouldFailWithoutOutput() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "broken.csv", "id,text\n1,안녕\n").unwrap();
    let controller = Controller::with_provider(test_config(), Arc::new(MockProvider::working())).unwrap();

    let err = controller.translate_file(&input, None).await.unwrap_err();

    assert!(err.to_string().contains("Missing required columns"));
    assert!(!dir.path().join("broken_translated.csv").exists());
}

#[tokio::test]
async fn test_translateFile_withPersistence_shouldStoreRun() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "sentences.csv", sample_csv()).unwrap();
    let output = dir.path().join("out.csv");
    let mut config = test_config();
    config.database.enabled = true;
    config.database.path = Some(dir.path().join("review.db"));
    let controller = Controller::with_provider(config, Arc::new(MockProvider::working())).unwrap();

    controller.translate_file(&input, Some(output.clone())).await.unwrap();

    assert!(output.exists());
    let repository = controller.state().repository.as_ref().unwrap();
    let stats = repository.connection().stats().unwrap();
    assert_eq!(stats.batch_count, 1);
    assert_eq!(stats.task_count, 3);
}

#[tokio::test]
async fn test_submit_shouldFollowServerStreamAndWriteResults() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "sentences.csv", sample_csv()).unwrap();

    let state = AppState::new(coordinator(MockProvider::working()), None, 1024 * 1024);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    let written = app_controller::submit(&input, &format!("http://{}", addr), None)
        .await
        .unwrap();

    let content = std::fs::read_to_string(written).unwrap();
    assert_eq!(content.lines().count(), 4);
    assert!(content.contains("success_1st"));
}

#[tokio::test]
async fn test_submit_withRejectedUpload_shouldReturnServerError() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "broken.csv", "id,text\n1,안녕\n").unwrap();

    let state = AppState::new(coordinator(MockProvider::working()), None, 1024 * 1024);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    let err = app_controller::submit(&input, &format!("http://{}", addr), None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Missing required columns"));
}
