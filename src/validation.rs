//! Checks applied to user-supplied feed names, feed URLs and keywords before
//! they are written to the store.

use std::fmt;

use thiserror::Error;
use url::Url;

pub const MAX_FEED_NAME_CHARS: usize = 200;
pub const MAX_FEED_URL_CHARS: usize = 2000;
pub const MAX_KEYWORD_CHARS: usize = 100;

const FORBIDDEN_CHARS: [char; 3] = ['<', '>', '"'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    FeedName,
    FeedUrl,
    Keyword,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::FeedName => write!(f, "feed name"),
            Field::FeedUrl => write!(f, "feed URL"),
            Field::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: Field },

    #[error("{field} is longer than {max} characters")]
    TooLong { field: Field, max: usize },

    #[error("{field} contains forbidden character {ch:?}")]
    ForbiddenCharacter { field: Field, ch: char },

    #[error("not a valid absolute URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
}

/// Returns the trimmed name.
pub fn validate_feed_name(raw: &str) -> Result<String, ValidationError> {
    let name = non_empty(raw, Field::FeedName, MAX_FEED_NAME_CHARS)?;
    reject_forbidden(name, Field::FeedName)?;
    Ok(name.to_string())
}

/// Returns the URL in canonical form, so equivalent spellings dedupe.
pub fn validate_feed_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = non_empty(raw, Field::FeedUrl, MAX_FEED_URL_CHARS)?;
    let url = Url::parse(trimmed).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl("missing host".to_string()));
    }

    let canonical = url.to_string();
    if canonical.chars().count() > MAX_FEED_URL_CHARS {
        return Err(ValidationError::TooLong {
            field: Field::FeedUrl,
            max: MAX_FEED_URL_CHARS,
        });
    }
    Ok(canonical)
}

/// Returns the trimmed keyword with inner whitespace collapsed.
pub fn validate_keyword(raw: &str) -> Result<String, ValidationError> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let keyword = non_empty(&collapsed, Field::Keyword, MAX_KEYWORD_CHARS)?;
    reject_forbidden(keyword, Field::Keyword)?;
    Ok(keyword.to_string())
}

fn non_empty(raw: &str, field: Field, max: usize) -> Result<&str, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed)
}

fn reject_forbidden(value: &str, field: Field) -> Result<(), ValidationError> {
    match value
        .chars()
        .find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control())
    {
        Some(ch) => Err(ValidationError::ForbiddenCharacter { field, ch }),
        None => Ok(()),
    }
}
