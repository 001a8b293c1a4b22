//! Rendering of classified message content into display blocks.
//!
//! [`render`] is a total pure function over [`MessageContent`]: every
//! variant maps to a list of [`Block`]s and nothing here performs I/O.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use super::message_content::{CategoricalAnalysis, MessageContent, NumericalAnalysis};

/// Fixed row order of the summary-statistics table.
pub const SUMMARY_STAT_ROWS: &[&str] =
    &["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Value-count tables are truncated to this many rows.
pub const VALUE_COUNT_LIMIT: usize = 10;

/// Dataset previews for categorical analyses show at most this many rows.
const CATEGORICAL_PREVIEW_LIMIT: usize = 5;

/// One section of a rendered message.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Free text, whitespace and line breaks preserved.
    Paragraph(String),
    /// Column-name chips under a section title.
    Badges { title: String, labels: Vec<String> },
    Table(Table),
    /// Per-column counts (missing values, outliers).
    Counts {
        title: String,
        entries: Vec<(String, i64)>,
    },
    /// A decoded PNG plot.
    Plot { name: String, png: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Render classified content into display blocks.
pub fn render(content: &MessageContent) -> Vec<Block> {
    match content {
        MessageContent::PlainText(text) => vec![Block::Paragraph(text.clone())],
        MessageContent::Numerical(data) => render_numerical(data),
        MessageContent::Categorical(data) => render_categorical(data),
    }
}

fn render_numerical(data: &NumericalAnalysis) -> Vec<Block> {
    let mut blocks = Vec::new();

    if !data.column_types.numerical.is_empty() {
        blocks.push(Block::Badges {
            title: "Numerical Columns".to_string(),
            labels: data.column_types.numerical.clone(),
        });
    }

    if let Some(table) = preview_table(&data.dataset_preview, usize::MAX) {
        blocks.push(Block::Table(table));
    }

    if !data.analysis.summary_stats.is_empty() {
        blocks.push(Block::Table(summary_stats_table(&data.analysis.summary_stats)));
    }

    if !data.analysis.missing_values.is_empty() {
        blocks.push(Block::Counts {
            title: "Missing Values".to_string(),
            entries: data
                .analysis
                .missing_values
                .iter()
                .map(|(col, count)| (col.clone(), *count))
                .collect(),
        });
    }

    if !data.analysis.outliers.is_empty() {
        blocks.push(Block::Counts {
            title: "Outliers Detected".to_string(),
            entries: data
                .analysis
                .outliers
                .iter()
                .map(|(col, count)| (col.clone(), *count))
                .collect(),
        });
    }

    blocks.extend(plot_blocks(&data.plots));

    if !data.summary.is_empty() {
        blocks.push(Block::Paragraph(data.summary.clone()));
    }

    blocks
}

fn render_categorical(data: &CategoricalAnalysis) -> Vec<Block> {
    let mut blocks = Vec::new();

    if !data.column_types.categorical.is_empty() {
        blocks.push(Block::Badges {
            title: "Categorical Columns".to_string(),
            labels: data.column_types.categorical.clone(),
        });
    }

    if let Some(table) = preview_table(&data.dataset_preview, CATEGORICAL_PREVIEW_LIMIT) {
        blocks.push(Block::Table(table));
    }

    for (column, counts) in &data.analysis.value_counts {
        let Some(counts) = counts.as_object() else {
            continue;
        };
        blocks.push(Block::Table(Table {
            // The model labels these "<column>_counts".
            title: column.trim_end_matches("_counts").to_string(),
            header: vec!["Value".to_string(), "Count".to_string()],
            rows: counts
                .iter()
                .take(VALUE_COUNT_LIMIT)
                .map(|(value, count)| vec![value.clone(), format_cell(count)])
                .collect(),
        }));
    }

    if !data.analysis.missing_values.is_empty() {
        blocks.push(Block::Counts {
            title: "Missing Values".to_string(),
            entries: data
                .analysis
                .missing_values
                .iter()
                .map(|(col, count)| (col.clone(), *count))
                .collect(),
        });
    }

    blocks.extend(plot_blocks(&data.plots));

    if !data.summary.is_empty() {
        blocks.push(Block::Paragraph(data.summary.clone()));
    }

    blocks
}

fn preview_table(rows: &[Map<String, Value>], limit: usize) -> Option<Table> {
    let first = rows.first()?;
    let header: Vec<String> = first.keys().cloned().collect();

    let body = rows
        .iter()
        .take(limit)
        .map(|row| {
            header
                .iter()
                .map(|col| row.get(col).map(format_cell).unwrap_or_default())
                .collect()
        })
        .collect();

    Some(Table {
        title: "Dataset Preview".to_string(),
        header,
        rows: body,
    })
}

fn summary_stats_table(stats: &Map<String, Value>) -> Table {
    let columns: Vec<String> = stats.keys().cloned().collect();

    let mut header = vec!["Metric".to_string()];
    header.extend(columns.iter().cloned());

    let rows = SUMMARY_STAT_ROWS
        .iter()
        .map(|stat| {
            let mut row = vec![stat.to_string()];
            for column in &columns {
                let cell = stats
                    .get(column)
                    .and_then(|per_column| per_column.get(*stat))
                    .map(format_cell)
                    .unwrap_or_default();
                row.push(cell);
            }
            row
        })
        .collect();

    Table {
        title: "Summary Statistics".to_string(),
        header,
        rows,
    }
}

fn plot_blocks(plots: &std::collections::BTreeMap<String, String>) -> Vec<Block> {
    plots
        .iter()
        .filter_map(|(name, encoded)| match BASE64.decode(encoded) {
            Ok(png) => Some(Block::Plot {
                name: name.replace('_', " "),
                png,
            }),
            Err(err) => {
                warn!(plot = %name, error = %err, "Skipping undecodable plot");
                None
            }
        })
        .collect()
}

/// A table cell. Numbers are shown with two decimals, everything else as
/// its bare string form.
fn format_cell(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) => format!("{f:.2}"),
            None => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Compact timestamp for the chat list: time of day for today, weekday
/// within the last week, month and day beyond that.
pub fn format_relative_date(timestamp_millis: i64, now_millis: i64) -> String {
    let Some(date) = Utc.timestamp_millis_opt(timestamp_millis).single() else {
        return String::new();
    };

    let age_hours = (now_millis - timestamp_millis) as f64 / 3_600_000.0;
    if age_hours < 24.0 {
        date.format("%H:%M").to_string()
    } else if age_hours < 168.0 {
        date.format("%a").to_string()
    } else {
        date.format("%b %-d").to_string()
    }
}
