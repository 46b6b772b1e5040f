//! Keyword coverage score used when the assistant cannot grade

use serde::{Deserialize, Serialize};

/// History-taking topics a consultation is expected to touch
pub const DEFAULT_KEYWORDS: [&str; 8] = [
    "持续时间",
    "严重程度",
    "伴随症状",
    "既往史",
    "用药",
    "过敏",
    "体温",
    "疼痛评分",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCoverage {
    pub covered: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordScore {
    /// Percentage of keywords present, rounded
    pub score: f64,
    pub coverage: KeywordCoverage,
}

/// Score `text` by the share of `keywords` it mentions
pub fn keyword_score<S: AsRef<str>>(text: &str, keywords: &[S]) -> KeywordScore {
    let total = keywords.len();
    let covered = keywords
        .iter()
        .filter(|k| text.contains(k.as_ref()))
        .count();
    let score = if total == 0 {
        0.0
    } else {
        (covered as f64 / total as f64 * 100.0).round()
    };
    KeywordScore {
        score,
        coverage: KeywordCoverage { covered, total },
    }
}
