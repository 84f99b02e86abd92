/*!
 * Integration tests for the retry pipeline.
 *
 * Runs the batch coordinator end to end against scripted providers and checks
 * ordering, retry escalation, exhaustion and progress reporting.
 */

use ksl_review::progress::{ProgressEvent, ProgressStream};
use ksl_review::server::AppState;
use ksl_review::translation::models::TRANSPORT_FAILURE_MARKER;
use ksl_review::translation::{AttemptKind, AttemptNumber, FinalStatus, RetrySchedule, SentenceRecord};

use std::sync::Arc;

use crate::common::mock_providers::{CallEvent, GaugedProvider, Reply, always_failing_for, planned_provider};
use crate::common::{coordinator, coordinator_with, init_logging, run_collecting, sentences};

#[tokio::test]
async fn test_run_withLateResolvingSentences_shouldKeepInputOrder() {
    init_logging();
    let input = sentences(23);
    // Sentences resolving in later waves must still land at their position
    let provider = planned_provider(vec![
        (input[0].source_text.as_str(), vec![Reply::hallucinated_dates()]),
        (input[7].source_text.as_str(), vec![Reply::ApiError, Reply::ApiError]),
        (input[15].source_text.as_str(), vec![Reply::ConnectionError]),
    ]);

    let (report, _events) = run_collecting(&coordinator(provider), &input).await;
    let report = report.unwrap();

    assert_eq!(report.outcomes.len(), input.len());
    for (outcome, record) in report.outcomes.iter().zip(&input) {
        assert_eq!(outcome.sentence_id, record.sentence_id);
        assert_eq!(outcome.source_text, record.source_text);
    }
    assert_eq!(report.outcomes[0].final_status, FinalStatus::Success2nd);
    assert_eq!(report.outcomes[7].final_status, FinalStatus::Success3rd);
    assert_eq!(report.outcomes[15].final_status, FinalStatus::Success2nd);
}

#[tokio::test]
async fn test_run_withPassingAttempt_shouldStopRetrying() {
    init_logging();
    let input = vec![
        SentenceRecord::new("first", "오늘 날씨가 좋네요"),
        SentenceRecord::new("second", "내일 비가 올까요."),
        SentenceRecord::new("third", "학교에 갑니다."),
    ];
    let provider = planned_provider(vec![
        ("내일 비가 올까요.", vec![Reply::hallucinated_dates()]),
        ("학교에 갑니다.", vec![Reply::ApiError, Reply::hallucinated_dates()]),
    ]);

    let (report, _) = run_collecting(&coordinator(provider.clone()), &input).await;
    let outcomes = report.unwrap().outcomes;

    assert_eq!(outcomes[0].final_status, FinalStatus::Success1st);
    assert_eq!(outcomes[0].attempts.len(), 1);
    assert_eq!(outcomes[0].final_text, "{오늘 날씨가 좋네요}");

    assert_eq!(outcomes[1].final_status, FinalStatus::Success2nd);
    assert_eq!(outcomes[1].attempts.len(), 2);
    assert_eq!(outcomes[1].attempts[0].kind, AttemptKind::QualityFailure);
    assert!(outcomes[1].attempt(AttemptNumber::Third).is_none());

    assert_eq!(outcomes[2].final_status, FinalStatus::Success3rd);
    assert_eq!(outcomes[2].attempts.len(), 3);
    assert_eq!(outcomes[2].attempts[0].kind, AttemptKind::TransportFailure);
    assert_eq!(outcomes[2].attempts[1].kind, AttemptKind::QualityFailure);
    assert_eq!(outcomes[2].final_text, "{학교에 갑니다}");

    // One call for the first sentence, two for the second, three for the third
    assert_eq!(provider.call_count(), 6);
}

#[tokio::test]
async fn test_run_withRepeatedFailures_shouldEscalateParamsAndStripPeriod() {
    init_logging();
    let input = vec![SentenceRecord::new("s1", "학교에 갑니다.")];
    let provider = planned_provider(vec![(
        "학교에 갑니다.",
        vec![Reply::hallucinated_dates(), Reply::hallucinated_dates()],
    )]);

    let (report, _) = run_collecting(&coordinator(provider.clone()), &input).await;
    assert_eq!(report.unwrap().outcomes[0].final_status, FinalStatus::Success3rd);

    let schedule = RetrySchedule::standard();
    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].prompt, "학교에 갑니다.");
    assert_eq!(calls[0].params, schedule.tier(AttemptNumber::First).params);
    assert_eq!(calls[1].prompt, "학교에 갑니다.");
    assert_eq!(calls[1].params, schedule.tier(AttemptNumber::Second).params);
    assert_eq!(calls[2].prompt, "학교에 갑니다");
    assert_eq!(calls[2].params, schedule.tier(AttemptNumber::Third).params);
}

#[tokio::test]
async fn test_run_withPersistentQualityFailure_shouldEndFailedAll() {
    init_logging();
    let input = vec![SentenceRecord::new("bad", "안녕하세요")];
    let provider = planned_provider(vec![(
        "안녕하세요",
        vec![
            Reply::hallucinated_dates(),
            Reply::text("{A}+{A}+{A}+{A}+{A}"),
            Reply::hallucinated_dates(),
        ],
    )]);

    let (report, _) = run_collecting(&coordinator(provider), &input).await;
    let report = report.unwrap();
    let outcome = &report.outcomes[0];

    assert_eq!(outcome.final_status, FinalStatus::FailedAll);
    assert_eq!(outcome.final_text, "");
    assert_eq!(outcome.attempts.len(), 3);
    assert!(outcome.attempts.iter().all(|a| a.kind == AttemptKind::QualityFailure));
    // Rejected output is kept for audit
    assert_eq!(outcome.attempts[1].raw_output.as_deref(), Some("{A}+{A}+{A}+{A}+{A}"));

    assert_eq!(report.statistics.failed, 1);
    assert_eq!(report.statistics.quality_failed, 1);
    assert_eq!(report.statistics.transport_failed, 0);
}

#[tokio::test]
async fn test_run_withPersistentTransportFailure_shouldKeepFailureMarker() {
    init_logging();
    let input = vec![SentenceRecord::new("down", "안녕하세요")];

    let (report, _) = run_collecting(&coordinator(always_failing_for(&["안녕하세요"])), &input).await;
    let report = report.unwrap();
    let outcome = &report.outcomes[0];

    assert_eq!(outcome.final_status, FinalStatus::FailedAll);
    assert_eq!(outcome.final_text, "");
    assert_eq!(outcome.attempts.len(), 3);
    for attempt in &outcome.attempts {
        assert_eq!(attempt.kind, AttemptKind::TransportFailure);
        assert!(attempt.raw_output.as_deref().unwrap().contains(TRANSPORT_FAILURE_MARKER));
        assert_eq!(attempt.effective_text(), "");
    }
    assert_eq!(report.statistics.transport_failed, 1);
    assert_eq!(report.statistics.quality_failed, 0);
}

#[tokio::test]
async fn test_run_withOneFailingSentence_shouldIsolateItWithinBatch() {
    init_logging();
    let input = sentences(10);
    let broken = input[4].source_text.clone();
    let provider = always_failing_for(&[broken.as_str()]);

    let (report, _) = run_collecting(&coordinator(provider.clone()), &input).await;
    let report = report.unwrap();

    assert_eq!(report.outcomes.len(), 10);
    for (i, outcome) in report.outcomes.iter().enumerate() {
        if i == 4 {
            assert_eq!(outcome.final_status, FinalStatus::FailedAll);
        } else {
            assert_eq!(outcome.final_status, FinalStatus::Success1st);
            assert!(!outcome.final_text.is_empty());
        }
    }
    assert_eq!(report.statistics.successful, 9);
    assert_eq!(provider.call_count(), 9 + 3);
}

#[tokio::test]
async fn test_run_withRetries_shouldFinishFirstPassFirst() {
    init_logging();
    let input = sentences(25);
    let provider = planned_provider(vec![
        (input[2].source_text.as_str(), vec![Reply::ApiError]),
        (input[21].source_text.as_str(), vec![Reply::hallucinated_dates()]),
    ]);

    let (report, _) = run_collecting(&coordinator(provider.clone()), &input).await;
    report.unwrap();

    let first = RetrySchedule::standard().tier(AttemptNumber::First).params;
    let calls = provider.calls();
    let last_first_pass = calls.iter().rposition(|c| c.params == first).unwrap();
    let first_retry = calls.iter().position(|c| c.params != first).unwrap();

    assert_eq!(last_first_pass, 24);
    assert!(first_retry > last_first_pass);
    assert_eq!(calls.len(), 27);
}

#[tokio::test]
async fn test_progress_withRetryWaves_shouldBeMonotonicAndEndWithComplete() {
    init_logging();
    let input = sentences(14);
    let provider = planned_provider(vec![
        (input[1].source_text.as_str(), vec![Reply::hallucinated_dates()]),
        (input[5].source_text.as_str(), vec![Reply::ApiError]),
        (input[9].source_text.as_str(), vec![Reply::ApiError, Reply::ApiError]),
        (input[13].source_text.as_str(), vec![Reply::hallucinated_dates()]),
    ]);
    let state = AppState::new(coordinator(provider), None, 1024 * 1024);

    let (mut stream, mut receiver) = ProgressStream::channel(8);
    let run = async move { state.execute(&input, &mut stream).await };
    let collect = async move {
        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        events
    };
    let (report, events) = tokio::join!(run, collect);
    let report = report.unwrap();

    let (terminal, progress) = events.split_last().unwrap();
    match terminal {
        ProgressEvent::Complete(payload) => {
            assert_eq!(payload.results, report.outcomes);
            assert_eq!(payload.statistics, report.statistics);
            assert!(payload.upload_batch_id.is_none());
        }
        other => panic!("expected complete as the last event, got {:?}", other),
    }

    let mut last = 0;
    let mut retry_attempts = Vec::new();
    for event in progress {
        let ProgressEvent::Progress(update) = event else {
            panic!("terminal event before the end of the stream: {:?}", event);
        };
        assert!(update.current >= last);
        assert_eq!(update.total, 14);
        last = update.current;
        if let Some(retry) = &update.retry {
            assert_eq!(update.current, 14);
            retry_attempts.push(retry.attempt);
        }
    }

    // 14 first-pass events, 4 in the second wave and 1 in the third
    assert_eq!(progress.len(), 14 + 4 + 1);
    assert_eq!(retry_attempts, vec![2, 2, 2, 2, 3]);
}

#[tokio::test]
async fn test_run_withSlowProvider_shouldDispatchFirstPassBatchesOfTen() {
    init_logging();
    let input = sentences(25);
    let slow_text = input[3].source_text.clone();
    let provider = GaugedProvider::new(20).with_slow(&[slow_text.as_str()], 120);

    let (report, _) = run_collecting(&coordinator_with(Arc::new(provider.clone())), &input).await;
    let report = report.unwrap();

    assert_eq!(report.outcomes.len(), 25);
    for (outcome, record) in report.outcomes.iter().zip(&input) {
        assert_eq!(outcome.sentence_id, record.sentence_id);
        assert_eq!(outcome.final_status, FinalStatus::Success1st);
    }
    assert_eq!(provider.peak(1), 10);

    // The eleventh call starts only once the whole first batch has settled
    let events = provider.events();
    let eleventh_start = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, CallEvent::Started(_)))
        .nth(10)
        .map(|(i, _)| i)
        .unwrap();
    let finished_before: Vec<&CallEvent> = events[..eleventh_start]
        .iter()
        .filter(|e| matches!(e, CallEvent::Finished(_)))
        .collect();
    assert_eq!(finished_before.len(), 10);

    // The slow sentence holds up its batch boundary but not its batch mates
    let slow_key = slow_text.trim_end_matches('.').to_string();
    assert_eq!(finished_before[9], &CallEvent::Finished(slow_key));
}

#[tokio::test]
async fn test_run_withRetryWave_shouldKeepAtMostThreeCallsInFlight() {
    init_logging();
    let input = sentences(8);
    let texts: Vec<&str> = input.iter().map(|r| r.source_text.as_str()).collect();
    let provider = GaugedProvider::new(20).with_rejected_first_attempt(&texts);

    let (report, _) = run_collecting(&coordinator_with(Arc::new(provider.clone())), &input).await;
    let report = report.unwrap();

    assert!(report
        .outcomes
        .iter()
        .all(|o| o.final_status == FinalStatus::Success2nd));
    assert_eq!(provider.peak(1), 8);
    assert_eq!(provider.peak(2), 3);
    assert_eq!(provider.peak(3), 0);
}
