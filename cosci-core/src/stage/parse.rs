//! Line scanners for labeled model responses.
//!
//! Both parsers are finite-state machines over lines. A marker line
//! switches the open section; any other non-empty line is appended to the
//! open section with a single space. Unknown or malformed input produces
//! typed defaults and never fails.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

/// Score used whenever a number cannot be read.
pub const DEFAULT_SCORE: f64 = 0.5;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)").expect("Invalid regex"));

/// Read the first number in `text`, clamped into `[0.0, 1.0]`.
pub fn parse_unit_score(text: &str) -> Result<f64, ParseError> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .ok_or_else(|| ParseError::InvalidScore(text.trim().to_string()))
}

/// [`parse_unit_score`] with the default substituted on failure.
pub fn unit_score_or_default(text: &str) -> f64 {
    parse_unit_score(text).unwrap_or(DEFAULT_SCORE)
}

/// Marker match after trimming decoration such as `**` and `#`.
fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.trim()
        .trim_start_matches(['*', '#', ' '])
        .strip_prefix(marker)
        .map(|rest| rest.trim_start_matches('*').trim())
}

fn append(section: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !section.is_empty() {
        section.push(' ');
    }
    section.push_str(text);
}

// =============================================================================
// Critique
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CritiqueSection {
    None,
    Review,
    Strengths,
    Weaknesses,
}

/// Parsed critique reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Critique {
    /// Clamped score, or [`DEFAULT_SCORE`]
    pub score: f64,
    pub review: String,
    pub strengths: String,
    pub weaknesses: String,
    /// Problems encountered; informational only
    pub issues: Vec<ParseError>,
}

/// Scan a critique reply.
///
/// | Line | Effect |
/// |------|--------|
/// | `SCORE: x` | score := x, section unchanged |
/// | `REVIEW: t` | open Review, append t |
/// | `STRENGTHS: t` | open Strengths, append t |
/// | `WEAKNESSES: t` | open Weaknesses, append t |
/// | other text | append to open section, dropped if none |
pub fn parse_critique(text: &str) -> Critique {
    let mut state = CritiqueSection::None;
    let mut score = None;
    let mut issues = Vec::new();
    let mut review = String::new();
    let mut strengths = String::new();
    let mut weaknesses = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = strip_marker(trimmed, "SCORE:") {
            match parse_unit_score(rest) {
                Ok(v) => score = Some(v),
                Err(e) => issues.push(e),
            }
            continue;
        }

        let (next, rest) = if let Some(rest) = strip_marker(trimmed, "REVIEW:") {
            (CritiqueSection::Review, rest)
        } else if let Some(rest) = strip_marker(trimmed, "STRENGTHS:") {
            (CritiqueSection::Strengths, rest)
        } else if let Some(rest) = strip_marker(trimmed, "WEAKNESSES:") {
            (CritiqueSection::Weaknesses, rest)
        } else {
            (state, trimmed)
        };
        state = next;

        match state {
            CritiqueSection::Review => append(&mut review, rest),
            CritiqueSection::Strengths => append(&mut strengths, rest),
            CritiqueSection::Weaknesses => append(&mut weaknesses, rest),
            CritiqueSection::None => {}
        }
    }

    if score.is_none() && issues.is_empty() {
        issues.push(ParseError::MissingSection("SCORE"));
    }
    if review.is_empty() {
        issues.push(ParseError::MissingSection("REVIEW"));
    }

    Critique {
        score: score.unwrap_or(DEFAULT_SCORE),
        review,
        strengths,
        weaknesses,
        issues,
    }
}

// =============================================================================
// Pairwise comparison
// =============================================================================

/// Outcome of one pairwise comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Tie,
}

impl Winner {
    /// Lenient parse; anything but A or B is a tie.
    pub fn parse(text: &str) -> Self {
        let token = text
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("")
            .to_uppercase();
        match token.as_str() {
            "A" => Self::A,
            "B" => Self::B,
            _ => Self::Tie,
        }
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::Tie => write!(f, "TIE"),
        }
    }
}

/// Scan a comparison reply into winner and reasoning.
///
/// `WINNER:` sets the winner without opening a section; `REASONING:`
/// opens the reasoning section. A missing winner is a tie.
pub fn parse_comparison(text: &str) -> (Winner, String) {
    let mut winner = Winner::Tie;
    let mut reasoning = String::new();
    let mut in_reasoning = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = strip_marker(trimmed, "WINNER:") {
            winner = Winner::parse(rest);
            in_reasoning = false;
        } else if let Some(rest) = strip_marker(trimmed, "REASONING:") {
            in_reasoning = true;
            append(&mut reasoning, rest);
        } else if in_reasoning {
            append(&mut reasoning, trimmed);
        }
    }
    (winner, reasoning)
}
