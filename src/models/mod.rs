mod article;
mod feed;
mod keyword;
mod status;

pub use article::{Article, InsertOutcome, NewArticle};
pub use feed::{ActiveFeed, AddFeedOutcome, FeedSource};
pub use keyword::{AddKeywordOutcome, Keyword};
pub use status::StatusSummary;
