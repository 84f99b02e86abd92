/*!
 * Result CSV export.
 *
 * One row per outcome, with an empty `check` column left for the human
 * reviewer and the raw output of every attempt for auditing: rejected
 * glosses as the model produced them, transport failures as their marker.
 */

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::translation::models::{AttemptNumber, TranslationOutcome};

pub const RESULT_HEADERS: [&str; 9] = [
    "sentence_id",
    "korean_text",
    "human_translation",
    "ai_translation",
    "final_status",
    "check",
    "attempt_1_output",
    "attempt_2_output",
    "attempt_3_output",
];

/// Quote a field when it contains a delimiter, quote or line break
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row(outcome: &TranslationOutcome) -> Vec<String> {
    let attempt_output = |n: AttemptNumber| {
        outcome
            .attempt(n)
            .and_then(|a| a.raw_output.clone())
            .unwrap_or_default()
    };

    vec![
        outcome.sentence_id.clone(),
        outcome.source_text.clone(),
        outcome.human_reference.clone().unwrap_or_default(),
        outcome.final_text.clone(),
        outcome.final_status.to_string(),
        String::new(),
        attempt_output(AttemptNumber::First),
        attempt_output(AttemptNumber::Second),
        attempt_output(AttemptNumber::Third),
    ]
}

/// Write the header and one row per outcome
pub fn write_results<W: Write>(writer: &mut W, outcomes: &[TranslationOutcome]) -> std::io::Result<()> {
    writeln!(writer, "{}", RESULT_HEADERS.join(","))?;
    for outcome in outcomes {
        let line = row(outcome)
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

pub fn to_csv_string(outcomes: &[TranslationOutcome]) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_results(&mut buffer, outcomes);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Write the results to a file, replacing it if present
pub fn write_results_file(path: &Path, outcomes: &[TranslationOutcome]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create result file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write_results(&mut writer, outcomes).with_context(|| format!("Failed to write result file: {:?}", path))
}

/// Default output path: `<input stem>_translated.csv` next to the input
pub fn default_output_path(input: &Path) -> std::path::PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    input.with_file_name(format!("{}_translated.csv", stem))
}
