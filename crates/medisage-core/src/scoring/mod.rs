//! Score report extraction
//!
//! A scoring session asks the assistant for a Markdown pipe table grading the
//! doctor's consultation. [`table::extract`] pulls the first table out of the
//! finished reply, [`summary::summarize`] normalizes it into score items, and
//! [`fallback`] provides the degraded keyword-coverage score used when the
//! assistant cannot be reached.

pub mod fallback;
pub mod summary;
pub mod table;

pub use fallback::{KeywordCoverage, KeywordScore, keyword_score};
pub use summary::{ScoreColumns, ScoreItem, ScoreSummary, summarize};
pub use table::{ScoreTable, extract};

const SCORING_PROMPT_LINES: [&str; 8] = [
    "你是“问诊评分助手”。请基于【本次对话】对医生的问诊表现进行评分。",
    "要求：",
    "1) 只输出一个 Markdown 表格，不要输出任何额外文字（包括解释、结尾、注意事项）。",
    "2) 表格列名固定为：项目 | 得分 | 扣分原因 | 改进建议",
    "3) 得分必须填写数字（允许 0），不要留空。",
    "4) 项目中如果包含“（X分）”，请按该满分给分。最后一行必须是“**总计（100分）**”。",
    "5) 扣分原因/改进建议要具体、可执行、与对话内容相关。",
    "现在开始输出表格：",
];

/// Built-in grading prompt sent as the scoring session's user turn
pub fn default_scoring_prompt() -> String {
    SCORING_PROMPT_LINES.join("\n")
}
