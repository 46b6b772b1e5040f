//! Markdown pipe table extraction

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SEPARATOR_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:?-{3,}:?$").expect("valid separator regex"));

/// The first pipe table of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    /// Non-blank header cells, in order
    pub headers: Vec<String>,
    /// Data rows as raw trimmed cells; a row may be shorter or longer than the header
    pub rows: Vec<Vec<String>>,
}

impl ScoreTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

/// Extract the first pipe table from `markdown`.
///
/// Text without a header row followed by a separator row yields an empty table.
pub fn extract(markdown: &str) -> ScoreTable {
    let lines: Vec<&str> = markdown
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let Some(start) = find_table_start(&lines) else {
        return ScoreTable::default();
    };

    let headers = split_row(lines[start])
        .into_iter()
        .filter(|h| !h.is_empty())
        .collect();

    let mut rows = Vec::new();
    for line in &lines[start + 2..] {
        if !line.contains('|') {
            break;
        }
        if is_separator_row(line) {
            continue;
        }
        let cells = split_row(line);
        if cells.iter().all(String::is_empty) {
            continue;
        }
        rows.push(cells);
    }

    ScoreTable { headers, rows }
}

fn find_table_start(lines: &[&str]) -> Option<usize> {
    lines
        .windows(2)
        .position(|pair| pair[0].contains('|') && is_separator_row(pair[1]))
}

fn strip_outer_pipes(line: &str) -> &str {
    let line = line.trim();
    let line = line.strip_prefix('|').unwrap_or(line);
    line.strip_suffix('|').unwrap_or(line)
}

// Escaped pipes are not supported.
fn split_row(line: &str) -> Vec<String> {
    strip_outer_pipes(line)
        .split('|')
        .map(|c| c.trim().to_string())
        .collect()
}

fn is_separator_row(line: &str) -> bool {
    let core = strip_outer_pipes(line);
    !core.is_empty() && core.split('|').all(|seg| SEPARATOR_CELL.is_match(seg.trim()))
}
