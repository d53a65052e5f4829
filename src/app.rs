use std::sync::Arc;

use crate::config::Config;
use crate::db::ArticleStore;
use crate::error::Result;
use crate::models::{AddFeedOutcome, AddKeywordOutcome};
use crate::monitor::MonitorScheduler;

/// Process-wide wiring: the store plus the scheduler that writes to it.
///
/// This is the handle a web layer holds; it calls the scheduler for
/// start/stop/scan and the store for configuration and reads.
pub struct App {
    pub config: Config,
    pub store: Arc<ArticleStore>,
    pub monitor: MonitorScheduler,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(ArticleStore::open(&config.db_path).await?);
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: Config, store: Arc<ArticleStore>) -> Result<Self> {
        let monitor = MonitorScheduler::from_config(Arc::clone(&store), &config)?;
        let app = Self {
            config,
            store,
            monitor,
        };
        app.seed().await?;
        Ok(app)
    }

    /// Registers the configured feeds and keywords; ones already stored are skipped.
    async fn seed(&self) -> Result<()> {
        for feed in &self.config.feeds {
            match self.store.add_feed(&feed.name, &feed.url).await? {
                AddFeedOutcome::Created(_) | AddFeedOutcome::DuplicateUrl => {}
                AddFeedOutcome::InvalidInput(e) => {
                    tracing::warn!(name = %feed.name, url = %feed.url, error = %e, "Ignoring invalid seed feed");
                }
            }
        }

        for keyword in &self.config.keywords {
            match self.store.add_keyword(keyword).await? {
                AddKeywordOutcome::Created(_) | AddKeywordOutcome::Duplicate => {}
                AddKeywordOutcome::InvalidInput(e) => {
                    tracing::warn!(keyword = %keyword, error = %e, "Ignoring invalid seed keyword");
                }
            }
        }

        Ok(())
    }
}
