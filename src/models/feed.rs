use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The slice of a feed the scheduler needs for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFeed {
    pub id: i64,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddFeedOutcome {
    Created(i64),
    DuplicateUrl,
    InvalidInput(ValidationError),
}
