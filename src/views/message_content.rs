//! Classification of stored message text into display variants.
//!
//! Assistant replies carrying a structured dataset analysis are stored as
//! serialized JSON with a `type` tag. Decoding is a single total step over
//! a closed variant set: anything that is not a recognized analysis payload
//! is plain text, including malformed JSON and unknown tags.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// A stored message's text, classified for display.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Literal text, whitespace and line breaks preserved.
    PlainText(String),
    Numerical(NumericalAnalysis),
    Categorical(CategoricalAnalysis),
}

impl MessageContent {
    /// Classify message text. Never fails; unrecognized input is
    /// [`MessageContent::PlainText`].
    pub fn classify(text: &str) -> Self {
        match serde_json::from_str::<AnalysisPayload>(text) {
            Ok(AnalysisPayload::Numerical(data)) => MessageContent::Numerical(data),
            Ok(AnalysisPayload::Categorical(data)) => MessageContent::Categorical(data),
            Err(_) => MessageContent::PlainText(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
enum AnalysisPayload {
    #[serde(rename = "numerical_analysis")]
    Numerical(NumericalAnalysis),
    #[serde(rename = "categorical_analysis")]
    Categorical(CategoricalAnalysis),
}

/// Analysis of a dataset's numerical columns.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NumericalAnalysis {
    #[serde(default)]
    pub summary: String,
    /// First rows of the dataset, one JSON object per row. Column order
    /// follows the payload.
    #[serde(default)]
    pub dataset_preview: Vec<Map<String, Value>>,
    #[serde(default)]
    pub column_types: NumericalColumns,
    #[serde(default)]
    pub analysis: NumericalReport,
    /// Plot name to base64-encoded PNG.
    #[serde(default)]
    pub plots: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NumericalColumns {
    #[serde(default)]
    pub numerical: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NumericalReport {
    /// Column name to `{statistic: value}`.
    #[serde(default)]
    pub summary_stats: Map<String, Value>,
    #[serde(default)]
    pub missing_values: BTreeMap<String, i64>,
    #[serde(default)]
    pub correlation_matrix: Option<Value>,
    #[serde(default)]
    pub outliers: BTreeMap<String, i64>,
}

/// Analysis of a dataset's categorical columns.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CategoricalAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub dataset_preview: Vec<Map<String, Value>>,
    #[serde(default)]
    pub column_types: CategoricalColumns,
    #[serde(default)]
    pub analysis: CategoricalReport,
    #[serde(default)]
    pub plots: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CategoricalColumns {
    #[serde(default)]
    pub categorical: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CategoricalReport {
    /// Column name to `{value: count}`, counts ordered as delivered by the
    /// model (most frequent first).
    #[serde(default)]
    pub value_counts: Map<String, Value>,
    #[serde(default)]
    pub missing_values: BTreeMap<String, i64>,
}
