mod matcher;
mod normalize;

pub use matcher::{match_keywords, KeywordMatcher};
pub use normalize::{normalize, normalize_opt, truncate_chars};
