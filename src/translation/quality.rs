/*!
 * Heuristic quality gate for model output.
 *
 * The fine-tuned model occasionally drifts into a few recognizable failure
 * modes: calendar dates that were never in the source sentence, runaway
 * generation, degenerate repetition of the same gloss, and numbers with no
 * counterpart in the input. Each is detected here as a `QualityIssue`.
 *
 * All thresholds are empirically tuned and live in `QualityThresholds` so
 * they can be adjusted from configuration. They are a stopgap for a real
 * quality model, not a statement of what "good" looks like.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Date-like token patterns: years, months, days, with or without the
/// `{..}+` gloss decoration
static DATE_TOKEN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // {2024}+년, 2024년
        Regex::new(r"\{?(?:19|20)[0-9]{2}\}?\+?년").unwrap(),
        // {6}+월, 6월
        Regex::new(r"\{?[0-9]{1,2}\}?\+?월").unwrap(),
        // {15}+일, 15일
        Regex::new(r"\{?[0-9]{1,2}\}?\+?일").unwrap(),
        // bare or bracketed year
        Regex::new(r"\{?(?:19|20)[0-9]{2}\}?").unwrap(),
        // 2024년6월
        Regex::new(r"[0-9]{4}년[0-9]{1,2}월").unwrap(),
        // 6월15일
        Regex::new(r"[0-9]{1,2}월[0-9]{1,2}일").unwrap(),
    ]
});

static NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

static BRACKET_SEGMENT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}").unwrap());

/// Tunable limits for the quality gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Hallucinated date tokens at or above this count reject the output
    #[serde(default = "default_date_token_threshold")]
    pub date_token_threshold: usize,

    /// Output longer than `original * max_length_ratio` characters is rejected
    #[serde(default = "default_max_length_ratio")]
    pub max_length_ratio: f64,

    /// The same `+`-joined segment repeated this many times in a row is rejected
    #[serde(default = "default_max_repeated_segments")]
    pub max_repeated_segments: usize,

    /// This many `{..}` segments chained with `+` is rejected
    #[serde(default = "default_max_bracket_run")]
    pub max_bracket_run: usize,

    /// Allowed surplus of numeric substrings over the original
    #[serde(default = "default_max_extra_numbers")]
    pub max_extra_numbers: usize,
}

fn default_date_token_threshold() -> usize {
    3
}

fn default_max_length_ratio() -> f64 {
    3.0
}

fn default_max_repeated_segments() -> usize {
    4
}

fn default_max_bracket_run() -> usize {
    5
}

fn default_max_extra_numbers() -> usize {
    3
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            date_token_threshold: default_date_token_threshold(),
            max_length_ratio: default_max_length_ratio(),
            max_repeated_segments: default_max_repeated_segments(),
            max_bracket_run: default_max_bracket_run(),
            max_extra_numbers: default_max_extra_numbers(),
        }
    }
}

/// Reasons a translation can be rejected
#[derive(Debug, Clone, PartialEq)]
pub enum QualityIssue {
    /// Source or output is empty
    EmptyText,
    /// Date tokens whose numbers never appear in the source
    HallucinatedDates { tokens: Vec<String> },
    /// Output far longer than the source
    TooLong {
        source_len: usize,
        translated_len: usize,
        max_ratio: f64,
    },
    /// One segment repeated back to back
    RepeatedSegment { segment: String, repeats: usize },
    /// A long chain of bracketed segments
    BracketRun { length: usize },
    /// Many more numbers than the source has
    ExcessNumbers {
        source_count: usize,
        translated_count: usize,
    },
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyText => write!(f, "empty source or translation"),
            Self::HallucinatedDates { tokens } => {
                write!(f, "date tokens absent from source: {}", tokens.join(", "))
            }
            Self::TooLong {
                source_len,
                translated_len,
                max_ratio,
            } => write!(
                f,
                "translation is {} chars for a {} char source (max ratio {})",
                translated_len, source_len, max_ratio
            ),
            Self::RepeatedSegment { segment, repeats } => {
                write!(f, "segment '{}' repeated {} times", segment, repeats)
            }
            Self::BracketRun { length } => write!(f, "{} bracketed segments in a row", length),
            Self::ExcessNumbers {
                source_count,
                translated_count,
            } => write!(
                f,
                "{} numbers in translation vs {} in source",
                translated_count, source_count
            ),
        }
    }
}

/// Result of checking one translation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualityReport {
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues joined into a single log-friendly line
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Stateless quality gate
#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    thresholds: QualityThresholds,
}

impl QualityValidator {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// `true` when the translation is acceptable
    pub fn validate(&self, original: &str, translated: &str) -> bool {
        let report = self.check(original, translated);
        if !report.passed() {
            debug!("Quality gate rejected '{}': {}", translated, report.summary());
        }
        report.passed()
    }

    /// Run every heuristic and collect what failed
    pub fn check(&self, original: &str, translated: &str) -> QualityReport {
        let original = original.trim();
        let translated = translated.trim();
        let mut issues = Vec::new();

        if original.is_empty() || translated.is_empty() {
            issues.push(QualityIssue::EmptyText);
            return QualityReport { issues };
        }

        let source_numbers: HashSet<&str> = NUMBER_PATTERN
            .find_iter(original)
            .map(|m| m.as_str())
            .collect();

        let hallucinated = hallucinated_date_tokens(translated, &source_numbers);
        if hallucinated.len() >= self.thresholds.date_token_threshold {
            issues.push(QualityIssue::HallucinatedDates { tokens: hallucinated });
        }

        let source_len = original.chars().count();
        let translated_len = translated.chars().count();
        if translated_len as f64 > source_len as f64 * self.thresholds.max_length_ratio {
            issues.push(QualityIssue::TooLong {
                source_len,
                translated_len,
                max_ratio: self.thresholds.max_length_ratio,
            });
        }

        if let Some((segment, repeats)) =
            repeated_segment(translated, self.thresholds.max_repeated_segments)
        {
            issues.push(QualityIssue::RepeatedSegment { segment, repeats });
        }

        let run = longest_bracket_run(translated);
        if run >= self.thresholds.max_bracket_run {
            issues.push(QualityIssue::BracketRun { length: run });
        }

        let source_count = NUMBER_PATTERN.find_iter(original).count();
        let translated_count = NUMBER_PATTERN.find_iter(translated).count();
        if translated_count > source_count + self.thresholds.max_extra_numbers {
            issues.push(QualityIssue::ExcessNumbers {
                source_count,
                translated_count,
            });
        }

        QualityReport { issues }
    }
}

/// Date tokens in `translated` carrying a number the source never mentions.
/// Patterns overlap on purpose: `{2024}+년` counts as both a year-with-marker
/// and a bare year.
fn hallucinated_date_tokens(translated: &str, source_numbers: &HashSet<&str>) -> Vec<String> {
    let mut tokens = Vec::new();
    for pattern in DATE_TOKEN_PATTERNS.iter() {
        for token in pattern.find_iter(translated) {
            let unseen = NUMBER_PATTERN
                .find_iter(token.as_str())
                .any(|n| !source_numbers.contains(n.as_str()));
            if unseen {
                tokens.push(token.as_str().to_string());
            }
        }
    }
    tokens
}

/// Find a `+`-prefixed segment repeated at least `min_repeats` times in a row.
/// The last repetition may be a prefix of a longer segment.
fn repeated_segment(text: &str, min_repeats: usize) -> Option<(String, usize)> {
    if min_repeats < 2 {
        return None;
    }

    // parts[0] precedes the first '+', so only parts[1..] are '+'-prefixed
    let parts: Vec<&str> = text.split('+').collect();
    for start in 1..parts.len() {
        let segment = parts[start];
        if segment.is_empty() {
            continue;
        }

        let mut repeats = 1;
        for next in &parts[start + 1..] {
            if *next == segment {
                repeats += 1;
            } else {
                if next.starts_with(segment) {
                    repeats += 1;
                }
                break;
            }
            if repeats >= min_repeats {
                break;
            }
        }

        if repeats >= min_repeats {
            return Some((segment.to_string(), repeats));
        }
    }
    None
}

/// Length of the longest chain `{..}+{..}+…`
fn longest_bracket_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous_end: Option<usize> = None;

    for segment in BRACKET_SEGMENT_PATTERN.find_iter(text) {
        let chained = previous_end.is_some_and(|end| &text[end..segment.start()] == "+");
        current = if chained { current + 1 } else { 1 };
        longest = longest.max(current);
        previous_end = Some(segment.end());
    }
    longest
}
