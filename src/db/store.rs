use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    ActiveFeed, AddFeedOutcome, AddKeywordOutcome, Article, FeedSource, InsertOutcome, Keyword,
    NewArticle, StatusSummary,
};
use crate::validation::{validate_feed_name, validate_feed_url, validate_keyword};

use super::schema::SCHEMA;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub active_feeds: usize,
    pub active_keywords: usize,
    pub articles: usize,
}

/// SQLite-backed store for feeds, keywords and matched articles.
///
/// All calls run on one connection thread, so they are serialized. Writes run
/// inside a transaction that rolls back if the closure returns early.
pub struct ArticleStore {
    conn: Connection,
}

impl ArticleStore {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Runs a raw SQL batch, so tests can break and repair the schema.
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Feed operations

    pub async fn add_feed(&self, name: &str, url: &str) -> Result<AddFeedOutcome> {
        let (name, url) = match (validate_feed_name(name), validate_feed_url(url)) {
            (Ok(name), Ok(url)) => (name, url),
            (Err(e), _) | (_, Err(e)) => return Ok(AddFeedOutcome::InvalidInput(e)),
        };

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let inserted = tx.execute(
                    "INSERT INTO feeds (name, url) VALUES (?1, ?2) ON CONFLICT(url) DO NOTHING",
                    params![name, url],
                )?;
                let outcome = if inserted == 0 {
                    AddFeedOutcome::DuplicateUrl
                } else {
                    AddFeedOutcome::Created(tx.last_insert_rowid())
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        if let AddFeedOutcome::Created(id) = outcome {
            tracing::info!(id, "Added feed");
        }
        Ok(outcome)
    }

    pub async fn list_feeds(&self) -> Result<Vec<FeedSource>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, url, active, created_at FROM feeds ORDER BY id",
                )?;
                let feeds = stmt
                    .query_map([], feed_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    /// Active feeds in insertion order, the order a cycle visits them.
    pub async fn active_feeds(&self) -> Result<Vec<ActiveFeed>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, url FROM feeds WHERE active = 1 ORDER BY id")?;
                let feeds = stmt
                    .query_map([], |row| {
                        Ok(ActiveFeed {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            url: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn toggle_feed(&self, id: i64) -> Result<bool> {
        self.update_one("UPDATE feeds SET active = NOT active WHERE id = ?1", id)
            .await
    }

    /// Removes the feed; articles already found through it are kept.
    pub async fn delete_feed(&self, id: i64) -> Result<bool> {
        self.update_one("DELETE FROM feeds WHERE id = ?1", id).await
    }

    // Keyword operations

    pub async fn add_keyword(&self, text: &str) -> Result<AddKeywordOutcome> {
        let text = match validate_keyword(text) {
            Ok(text) => text,
            Err(e) => return Ok(AddKeywordOutcome::InvalidInput(e)),
        };

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let inserted = tx.execute(
                    "INSERT INTO keywords (text) VALUES (?1) ON CONFLICT(text) DO NOTHING",
                    params![text],
                )?;
                let outcome = if inserted == 0 {
                    AddKeywordOutcome::Duplicate
                } else {
                    AddKeywordOutcome::Created(tx.last_insert_rowid())
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        if let AddKeywordOutcome::Created(id) = outcome {
            tracing::info!(id, "Added keyword");
        }
        Ok(outcome)
    }

    pub async fn list_keywords(&self) -> Result<Vec<Keyword>> {
        let keywords = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, text, active, created_at FROM keywords ORDER BY id")?;
                let keywords = stmt
                    .query_map([], keyword_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(keywords)
            })
            .await?;
        Ok(keywords)
    }

    /// Active keyword texts as entered; matching is case-insensitive.
    pub async fn active_keywords(&self) -> Result<Vec<String>> {
        let keywords = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT text FROM keywords WHERE active = 1 ORDER BY id")?;
                let keywords = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(keywords)
            })
            .await?;
        Ok(keywords)
    }

    pub async fn toggle_keyword(&self, id: i64) -> Result<bool> {
        self.update_one("UPDATE keywords SET active = NOT active WHERE id = ?1", id)
            .await
    }

    pub async fn delete_keyword(&self, id: i64) -> Result<bool> {
        self.update_one("DELETE FROM keywords WHERE id = ?1", id)
            .await
    }

    // Article operations

    pub async fn exists(&self, link: &str) -> Result<bool> {
        let link = link.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM articles WHERE link = ?1)",
                    params![link],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    /// Inserts the article unless one with the same link is already stored.
    ///
    /// `found_at` is never earlier than that of any stored article, so
    /// insertion order and `found_at` order agree even if the clock steps back.
    pub async fn insert_article(&self, article: NewArticle) -> Result<InsertOutcome> {
        if article.matched_keywords.is_empty() {
            return Err(AppError::UnmatchedArticle(article.link));
        }

        let keywords_json = serde_json::to_string(&article.matched_keywords)?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let inserted = tx.execute(
                    r#"INSERT INTO articles (title, description, link, feed_name, matched_keywords, published_at, found_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                               MAX(?7, COALESCE((SELECT MAX(found_at) FROM articles), '')))
                       ON CONFLICT(link) DO NOTHING"#,
                    params![
                        article.title,
                        article.description,
                        article.link,
                        article.feed_name,
                        keywords_json,
                        article
                            .published_at
                            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
                        now,
                    ],
                )?;
                let outcome = if inserted == 0 {
                    InsertOutcome::AlreadyExists
                } else {
                    InsertOutcome::Created(tx.last_insert_rowid())
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await?;
        Ok(outcome)
    }

    /// Newest first.
    pub async fn list_articles(&self, limit: usize) -> Result<Vec<Article>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, title, description, link, feed_name, matched_keywords,
                              published_at, found_at
                       FROM articles
                       ORDER BY found_at DESC, id DESC
                       LIMIT ?1"#,
                )?;
                let articles = stmt
                    .query_map(params![limit], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    // Status

    pub async fn counts(&self) -> Result<StoreCounts> {
        let counts = self
            .conn
            .call(|conn| {
                let counts = conn.query_row(
                    r#"SELECT (SELECT COUNT(*) FROM feeds WHERE active = 1),
                              (SELECT COUNT(*) FROM keywords WHERE active = 1),
                              (SELECT COUNT(*) FROM articles)"#,
                    [],
                    |row| {
                        Ok(StoreCounts {
                            active_feeds: row.get::<_, i64>(0)? as usize,
                            active_keywords: row.get::<_, i64>(1)? as usize,
                            articles: row.get::<_, i64>(2)? as usize,
                        })
                    },
                )?;
                Ok(counts)
            })
            .await?;
        Ok(counts)
    }

    pub async fn status_summary(&self, running: bool) -> Result<StatusSummary> {
        let counts = self.counts().await?;
        Ok(StatusSummary {
            running,
            active_feed_count: counts.active_feeds,
            active_keyword_count: counts.active_keywords,
            total_article_count: counts.articles,
        })
    }

    async fn update_one(&self, sql: &'static str, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(sql, params![id])?;
                tx.commit()?;
                Ok(changed > 0)
            })
            .await?;
        Ok(changed)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339, as written for articles
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now'), as defaulted for feeds and keywords
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized timestamp {raw:?}").into(),
        )
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<FeedSource> {
    Ok(FeedSource {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        active: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn keyword_from_row(row: &Row) -> rusqlite::Result<Keyword> {
    Ok(Keyword {
        id: row.get(0)?,
        text: row.get(1)?,
        active: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let keywords_json: String = row.get(5)?;
    let matched_keywords = serde_json::from_str(&keywords_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        link: row.get(3)?,
        feed_name: row.get(4)?,
        matched_keywords,
        published_at: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| parse_datetime(&s)),
        found_at: timestamp_column(row, 7)?,
    })
}
