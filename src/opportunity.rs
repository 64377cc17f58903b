//! Transformer payload validation and normalization.
//!
//! The text model is asked for a JSON object matching the opportunity
//! schema, but nothing guarantees it complies. This module takes the
//! lenient view on the way in ([`RawOpportunity`] tolerates wrong types on
//! a per-field basis) and the strict view on the way out: a candidate only
//! becomes a persisted [`Record`] after passing the quality gate and being
//! normalized with explicit defaults and clamping.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::radar::{clamp_score, Record};

/// Minimum summary length (chars) accepted by the quality gate.
pub const MIN_SUMMARY_LEN: usize = 30;

/// Minimum number of `how_to_start` steps accepted by the quality gate.
pub const MIN_STEPS: usize = 3;

/// The closed set of category labels. Anything else normalizes to
/// [`DEFAULT_CATEGORY`].
pub const CATEGORIES: &[&str] = &[
    "Product Trend",
    "Business Model",
    "AI Tool",
    "Cross-border",
    "Risk/Regulation",
];

pub const DEFAULT_CATEGORY: &str = "Product Trend";

/// Maximum length of a title taken from the feed entry when the model
/// supplies none.
const TITLE_FALLBACK_LEN: usize = 120;

/// The model's opportunity payload, as loosely as we are willing to read it.
///
/// Scores, confidence and the list fields stay as raw [`Value`]s so that one
/// ill-typed field does not poison the rest of the payload; they are
/// interpreted during gating and normalization. A payload whose string
/// fields carry the wrong type fails deserialization entirely, which the
/// transformer degrades to `RawOpportunity::default()` — an empty candidate
/// the gate then rejects.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RawOpportunity {
    pub title: Option<String>,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub opportunity_score: Value,
    pub risk_score: Value,
    pub who_is_it_for: Value,
    pub how_to_start: Value,
    pub watch_out: Value,
    pub keywords: Value,
    pub confidence: Value,
}

/// Why the quality gate turned a candidate away.
///
/// Rejections are expected and silent (debug-level log only); they are not
/// errors and never abort the run.
#[derive(Debug, Error, PartialEq)]
pub enum GateRejection {
    #[error("summary missing or shorter than {MIN_SUMMARY_LEN} chars")]
    ThinSummary,
    #[error("how_to_start has fewer than {MIN_STEPS} entries")]
    TooFewSteps,
    #[error("confidence missing, non-numeric, or below {0}")]
    LowConfidence(f64),
}

impl RawOpportunity {
    /// The quality gate: minimum-content checks a candidate must clear
    /// before it is persisted.
    pub fn check_quality(&self, min_confidence: f64) -> Result<(), GateRejection> {
        match &self.summary {
            Some(s) if s.chars().count() >= MIN_SUMMARY_LEN => {}
            _ => return Err(GateRejection::ThinSummary),
        }

        if string_list(&self.how_to_start).len() < MIN_STEPS {
            return Err(GateRejection::TooFewSteps);
        }

        match self.confidence.as_f64() {
            Some(c) if c.is_finite() && c >= min_confidence => Ok(()),
            _ => Err(GateRejection::LowConfidence(min_confidence)),
        }
    }

    /// Normalizes an accepted candidate into a persisted [`Record`].
    ///
    /// Callers must have run [`check_quality`](Self::check_quality) first;
    /// this method still defaults defensively but makes no gate decisions.
    pub fn into_record(
        self,
        id: String,
        entry_title: &str,
        link: &str,
        published: DateTime<Utc>,
        source_name: &str,
    ) -> Record {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| entry_title.chars().take(TITLE_FALLBACK_LEN).collect());

        let category = self
            .category
            .filter(|c| CATEGORIES.contains(&c.as_str()))
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Record {
            id,
            title,
            category,
            summary: self.summary.unwrap_or_default(),
            opportunity_score: clamp_score(&self.opportunity_score),
            risk_score: clamp_score(&self.risk_score),
            who_is_it_for: string_list(&self.who_is_it_for),
            how_to_start: string_list(&self.how_to_start),
            watch_out: string_list(&self.watch_out),
            keywords: string_list(&self.keywords),
            confidence: self.confidence.as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
            date: published,
            source_url: link.to_string(),
            sources: vec![source_name.to_string()],
        }
    }
}

/// Reads a raw JSON value as a list of strings. Non-arrays yield an empty
/// list; non-string elements are dropped.
fn string_list(raw: &Value) -> Vec<String> {
    match raw.as_array() {
        Some(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        None => Vec::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
