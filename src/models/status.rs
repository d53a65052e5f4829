use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub running: bool,
    pub active_feed_count: usize,
    pub active_keyword_count: usize,
    pub total_article_count: usize,
}
