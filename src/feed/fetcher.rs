use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link};
use feed_rs::parser::{self, ParseFeedError};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

use crate::error::Result;

/// Upper bound on a feed body; anything larger is treated as a failed fetch.
pub const MAX_FEED_BYTES: u64 = 5 * 1024 * 1024;

const MAX_REDIRECTS: usize = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FEED_ACCEPT: &str = "application/rss+xml, application/rdf+xml, application/atom+xml, application/feed+json, application/xml;q=0.9, text/xml;q=0.8";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    #[error("feed body of {0} bytes exceeds the size limit")]
    TooLarge(u64),

    #[error("malformed feed: {0}")]
    Parse(#[from] ParseFeedError),
}

/// One candidate entry from a feed, with title and link guaranteed non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
}

impl RawEntry {
    fn from_entry(entry: Entry, base: Option<&Url>) -> Option<Self> {
        let title = entry
            .title
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())?;
        let link = entry_link(&entry.links, base)?;

        // Prefer the summary, fall back to the full content body
        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        Some(Self {
            title,
            link,
            description,
            published: entry.published.or(entry.updated),
        })
    }
}

/// The entry's page link: the alternate link when one is marked, otherwise the
/// first one. Relative hrefs are resolved against `base`; entries whose link
/// cannot be made absolute are dropped.
fn entry_link(links: &[Link], base: Option<&Url>) -> Option<String> {
    let usable = || links.iter().filter(|l| !l.href.trim().is_empty());
    let link = usable()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| usable().next())?;
    resolve_url(link.href.trim(), base)
}

fn resolve_url(href: &str, base: Option<&Url>) -> Option<String> {
    if Url::parse(href).is_ok() {
        return Some(href.to_string());
    }
    base.and_then(|base| base.join(href).ok())
        .map(|resolved| resolved.to_string())
}

/// Where the scheduler gets entries from.
pub trait EntrySource: Send + Sync + 'static {
    fn fetch_entries<'a>(
        &'a self,
        url: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Vec<RawEntry>, FetchError>>;
}

pub struct FeedFetcher {
    client: Client,
    max_entries: usize,
}

impl FeedFetcher {
    pub fn new(timeout: Duration, max_entries: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("feedwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            max_entries,
        })
    }

    /// Fetches a feed, logging and swallowing any failure.
    pub async fn fetch(&self, url: &str) -> Vec<RawEntry> {
        match self.try_fetch(url).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(url, error = %e, "FetchFailed");
                Vec::new()
            }
        }
    }

    pub async fn try_fetch(&self, url: &str) -> std::result::Result<Vec<RawEntry>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_FEED_BYTES {
                return Err(FetchError::TooLarge(length));
            }
        }

        // Relative entry links resolve against where the feed was actually served
        let base = response.url().to_string();

        // Chunked responses carry no length, so the cap is enforced while reading
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let total = (body.len() + chunk.len()) as u64;
            if total > MAX_FEED_BYTES {
                return Err(FetchError::TooLarge(total));
            }
            body.extend_from_slice(&chunk);
        }

        let entries = parse_entries(&body, &base, self.max_entries)?;
        tracing::debug!(url, count = entries.len(), "Fetched feed");
        Ok(entries)
    }
}

impl EntrySource for FeedFetcher {
    fn fetch_entries<'a>(
        &'a self,
        url: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Vec<RawEntry>, FetchError>> {
        self.try_fetch(url).boxed()
    }
}

/// Parses RSS, Atom or JSON Feed bytes into at most `limit` usable entries,
/// in feed order. `base_url` is the feed's own URL.
pub fn parse_entries(
    bytes: &[u8],
    base_url: &str,
    limit: usize,
) -> std::result::Result<Vec<RawEntry>, FetchError> {
    let feed = parser::parse(bytes)?;
    let total = feed.entries.len();
    let base = Url::parse(base_url).ok();

    let entries: Vec<RawEntry> = feed
        .entries
        .into_iter()
        .filter_map(|entry| RawEntry::from_entry(entry, base.as_ref()))
        .take(limit)
        .collect();

    if entries.len() < total.min(limit) {
        tracing::debug!(
            kept = entries.len(),
            total,
            "Dropped entries without a title or usable link"
        );
    }
    Ok(entries)
}
