/*!
 * Tests for progress events and their line encoding
 */

use ksl_review::progress::{
    CompletionPayload, NdjsonDecoder, ProgressEvent, ProgressStream, ProgressUpdate, encode_line,
};
use ksl_review::translation::RunStatistics;

fn sample_events() -> Vec<ProgressEvent> {
    vec![
        ProgressEvent::Progress(ProgressUpdate::new(1, 2, "s1", "안녕하세요")),
        ProgressEvent::Progress(ProgressUpdate::new(2, 2, "s2", "감사합니다")),
        ProgressEvent::Complete(CompletionPayload {
            results: Vec::new(),
            statistics: RunStatistics::default(),
            upload_batch_id: Some("batch-1".to_string()),
        }),
    ]
}

#[test]
fn test_decoder_withEveryChunkSplit_shouldRecoverAllEvents() {
    let events = sample_events();
    let wire: Vec<u8> = events
        .iter()
        .flat_map(|e| encode_line(e).unwrap().to_vec())
        .collect();

    // Split points land inside multi-byte Hangul characters too
    for split in 1..wire.len() {
        let mut decoder = NdjsonDecoder::new();
        let mut decoded: Vec<ProgressEvent> = decoder.feed(&wire[..split]).into_iter().map(Result::unwrap).collect();
        decoded.extend(decoder.feed(&wire[split..]).into_iter().map(Result::unwrap));
        assert_eq!(decoded, events, "split at byte {}", split);
        assert_eq!(decoder.pending(), 0);
    }
}

#[test]
fn test_decoder_withGarbageLine_shouldReportErrorAndContinue() {
    let mut decoder = NdjsonDecoder::new();
    let mut wire = b"not json\n".to_vec();
    wire.extend_from_slice(&encode_line(&ProgressEvent::Error { error: "boom".into() }).unwrap());

    let decoded = decoder.feed(&wire);

    assert_eq!(decoded.len(), 2);
    assert!(decoded[0].is_err());
    assert_eq!(decoded[1].as_ref().unwrap(), &ProgressEvent::Error { error: "boom".into() });
}

#[tokio::test]
async fn test_stream_afterError_shouldDropEverything() {
    let (mut stream, mut receiver) = ProgressStream::channel(8);

    assert!(stream.error("upload rejected").await);
    assert!(!stream.progress(ProgressUpdate::new(1, 1, "s1", "안녕")).await);
    assert!(
        !stream
            .complete(CompletionPayload {
                results: Vec::new(),
                statistics: RunStatistics::default(),
                upload_batch_id: None,
            })
            .await
    );
    drop(stream);

    let mut received = Vec::new();
    while let Some(event) = receiver.recv().await {
        received.push(event);
    }
    assert_eq!(received, vec![ProgressEvent::Error { error: "upload rejected".into() }]);
}
