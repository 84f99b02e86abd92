/*!
 * Tests for CSV upload parsing
 */

use ksl_review::UploadError;
use ksl_review::upload::{SkipReason, parse_csv, parse_upload};

#[test]
fn test_parseUpload_withBomAndCrlf_shouldReadAllRows() {
    let bytes = "\u{feff}sentence_id,korean_text\r\ns1,안녕하세요\r\ns2,감사합니다\r\n".as_bytes();

    let parsed = parse_upload(bytes, 1024).unwrap();

    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.records[0].sentence_id, "s1");
    assert_eq!(parsed.records[1].source_text, "감사합니다");
}

#[test]
fn test_parseCsv_withUppercaseHeaders_shouldMatchColumns() {
    let parsed = parse_csv("SENTENCE_ID,Korean_Text\ns1,안녕\n").unwrap();
    assert_eq!(parsed.records[0].source_text, "안녕");
}

#[test]
fn test_parseCsv_withDuplicateIds_shouldKeepFirstOccurrence() {
    let parsed = parse_csv("sentence_id,korean_text\ns1,첫 번째\ns1,두 번째\ns2,세 번째\n").unwrap();

    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.records[0].source_text, "첫 번째");
    assert_eq!(parsed.skipped.len(), 1);
    assert_eq!(parsed.skipped[0].line, 3);
    assert_eq!(parsed.skipped[0].reason, SkipReason::DuplicateId("s1".to_string()));
}

#[test]
fn test_parseCsv_withQuotedNewline_shouldKeepItInText() {
    let parsed = parse_csv("sentence_id,korean_text\ns1,\"첫 줄\n둘째 줄\"\ns2,끝\n").unwrap();

    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.records[0].source_text, "첫 줄\n둘째 줄");
}

#[test]
fn test_parseCsv_withOnlyBadRows_shouldFail() {
    let err = parse_csv("sentence_id,korean_text\n,안녕\ns2,\n").unwrap_err();
    assert_eq!(err, UploadError::NoValidRows { skipped: 2 });
}

#[test]
fn test_parseUpload_withInvalidUtf8_shouldFail() {
    let err = parse_upload(&[0xff, 0xfe, 0x00], 1024).unwrap_err();
    assert_eq!(err, UploadError::NotUtf8);
}
