//! Score table normalization

use super::table::ScoreTable;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"));

static MAX_POINTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[（(]\s*(\d+)\s*分\s*[）)]").expect("valid max points regex")
});

const TOTAL_MARKERS: [&str; 2] = ["总计", "总分"];

/// One graded line of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreItem {
    pub name: String,
    pub score: Option<f64>,
    pub max_points: Option<f64>,
    pub reason: String,
    pub advice: String,
    pub is_total_row: bool,
}

/// Header labels the summary was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreColumns {
    pub item: String,
    pub score: String,
    pub reason: String,
    pub advice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub total_score: Option<f64>,
    pub items: Vec<ScoreItem>,
    pub columns: ScoreColumns,
}

struct Column {
    label: String,
    index: usize,
}

impl Column {
    fn locate(headers: &[String], needle: &str, position: usize, default_label: &str) -> Self {
        if let Some(index) = headers.iter().position(|h| h.contains(needle)) {
            return Self {
                label: headers[index].clone(),
                index,
            };
        }
        Self {
            label: headers
                .get(position)
                .cloned()
                .unwrap_or_else(|| default_label.to_string()),
            index: position,
        }
    }

    fn cell<'a>(&self, row: &'a [String]) -> &'a str {
        row.get(self.index).map(String::as_str).unwrap_or("")
    }
}

/// Summarize an extracted table.
///
/// The explicit total row wins; otherwise the rounded sum of the item scores
/// is used when positive. An empty table yields no items and no total.
pub fn summarize(table: &ScoreTable) -> ScoreSummary {
    let item = Column::locate(&table.headers, "项目", 0, "项目");
    let score = Column::locate(&table.headers, "得分", 1, "得分");
    let reason = Column::locate(&table.headers, "扣分", 2, "扣分原因");
    let advice = Column::locate(&table.headers, "建议", 3, "改进建议");

    let items: Vec<ScoreItem> = table
        .rows
        .iter()
        .filter_map(|row| {
            let name = item.cell(row);
            if name.is_empty() {
                return None;
            }
            Some(ScoreItem {
                name: name.to_string(),
                score: parse_score(score.cell(row)),
                max_points: parse_max_points(name),
                reason: reason.cell(row).trim().to_string(),
                advice: advice.cell(row).trim().to_string(),
                is_total_row: is_total_row(name),
            })
        })
        .collect();

    ScoreSummary {
        total_score: resolve_total(&items),
        items,
        columns: ScoreColumns {
            item: item.label,
            score: score.label,
            reason: reason.label,
            advice: advice.label,
        },
    }
}

fn resolve_total(items: &[ScoreItem]) -> Option<f64> {
    if let Some(total) = items.iter().find(|i| i.is_total_row).and_then(|i| i.score) {
        return Some(total);
    }
    let sum: f64 = items
        .iter()
        .filter(|i| !i.is_total_row)
        .filter_map(|i| i.score)
        .sum();
    (sum.is_finite() && sum > 0.0).then(|| sum.round())
}

/// Leading numeric token of a score cell
pub fn parse_score(cell: &str) -> Option<f64> {
    NUMBER
        .find(cell.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Maximum points embedded in an item name, as in `病史采集（30分）`
pub fn parse_max_points(name: &str) -> Option<f64> {
    MAX_POINTS
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn is_total_row(name: &str) -> bool {
    TOTAL_MARKERS.iter().any(|marker| name.contains(marker))
}
