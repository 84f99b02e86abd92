/*!
 * Uploaded CSV to sentence records.
 *
 * The header row must name `sentence_id` and `korean_text`;
 * `human_translation` is optional. Fields may be quoted, with `""` as an
 * escaped quote, and quoted fields may span lines. Rows that cannot be used
 * are skipped and reported with the line they started on.
 */

use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;

use crate::errors::UploadError;
use crate::translation::models::SentenceRecord;

pub const SENTENCE_ID_COLUMN: &str = "sentence_id";
pub const SOURCE_TEXT_COLUMN: &str = "korean_text";
pub const REFERENCE_COLUMN: &str = "human_translation";

/// Default upload size limit (100 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

const UTF8_BOM: &str = "\u{feff}";

/// Why a data row was not used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer fields than the required columns need
    TooFewFields,
    MissingId,
    MissingText,
    /// The id already appeared earlier in the upload
    DuplicateId(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewFields => write!(f, "not enough columns"),
            Self::MissingId => write!(f, "empty sentence_id"),
            Self::MissingText => write!(f, "empty korean_text"),
            Self::DuplicateId(id) => write!(f, "duplicate sentence_id '{}'", id),
        }
    }
}

/// A data row that was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line the row starts on
    pub line: usize,
    pub reason: SkipReason,
}

/// Result of parsing an upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedUpload {
    pub records: Vec<SentenceRecord>,
    pub skipped: Vec<SkippedRow>,
}

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy)]
struct Columns {
    sentence_id: usize,
    source_text: usize,
    reference: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Result<Self, UploadError> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().trim_matches('"').eq_ignore_ascii_case(name))
        };

        let sentence_id = find(SENTENCE_ID_COLUMN);
        let source_text = find(SOURCE_TEXT_COLUMN);

        match (sentence_id, source_text) {
            (Some(sentence_id), Some(source_text)) => Ok(Self {
                sentence_id,
                source_text,
                reference: find(REFERENCE_COLUMN),
            }),
            _ => {
                let mut missing = Vec::new();
                if sentence_id.is_none() {
                    missing.push(SENTENCE_ID_COLUMN.to_string());
                }
                if source_text.is_none() {
                    missing.push(SOURCE_TEXT_COLUMN.to_string());
                }
                Err(UploadError::MissingColumns(missing))
            }
        }
    }

    fn required_len(&self) -> usize {
        self.sentence_id.max(self.source_text) + 1
    }
}

/// Parse raw upload bytes, enforcing the size limit
pub fn parse_upload(bytes: &[u8], max_bytes: usize) -> Result<ParsedUpload, UploadError> {
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge { limit: max_bytes });
    }
    let text = std::str::from_utf8(bytes).map_err(|_| UploadError::NotUtf8)?;
    parse_csv(text)
}

/// Parse CSV text into sentence records
pub fn parse_csv(text: &str) -> Result<ParsedUpload, UploadError> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let mut rows = split_records(text).into_iter();

    let (_, header) = rows.next().ok_or(UploadError::Empty)?;
    let columns = Columns::from_header(&header)?;
    debug!("Resolved CSV columns: {:?}", columns);

    let mut parsed = ParsedUpload::default();
    let mut seen = HashSet::new();

    for (line, fields) in rows {
        match row_to_record(&fields, columns) {
            Ok(record) => {
                if seen.insert(record.sentence_id.clone()) {
                    parsed.records.push(record);
                } else {
                    parsed.skipped.push(SkippedRow {
                        line,
                        reason: SkipReason::DuplicateId(record.sentence_id),
                    });
                }
            }
            Err(reason) => parsed.skipped.push(SkippedRow { line, reason }),
        }
    }

    for row in &parsed.skipped {
        warn!("Skipping CSV line {}: {}", row.line, row.reason);
    }

    if parsed.records.is_empty() {
        return Err(UploadError::NoValidRows {
            skipped: parsed.skipped.len(),
        });
    }

    info!(
        "Parsed {} sentences from upload ({} rows skipped)",
        parsed.records.len(),
        parsed.skipped.len()
    );
    Ok(parsed)
}

fn row_to_record(fields: &[String], columns: Columns) -> Result<SentenceRecord, SkipReason> {
    if fields.len() < columns.required_len() {
        return Err(SkipReason::TooFewFields);
    }

    let sentence_id = fields[columns.sentence_id].trim();
    let source_text = fields[columns.source_text].trim();
    if sentence_id.is_empty() {
        return Err(SkipReason::MissingId);
    }
    if source_text.is_empty() {
        return Err(SkipReason::MissingText);
    }

    let record = SentenceRecord::new(sentence_id, source_text);
    let reference = columns
        .reference
        .and_then(|i| fields.get(i))
        .map(|r| r.trim())
        .filter(|r| !r.is_empty());

    Ok(match reference {
        Some(reference) => record.with_reference(reference),
        None => record,
    })
}

/// Split CSV text into records, each tagged with its starting line.
/// Blank records are dropped.
fn split_records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_start = 1;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                push_record(&mut records, record_start, std::mem::take(&mut fields));
                line += 1;
                record_start = line;
            }
            '\n' => {
                field.push(c);
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_record(&mut records, record_start, fields);
    }

    records
}

fn push_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    if fields.iter().all(|f| f.trim().is_empty()) {
        return;
    }
    records.push((line, fields));
}
