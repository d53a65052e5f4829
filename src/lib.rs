//! Keyword monitor for RSS/Atom feeds.
//!
//! [`monitor::MonitorScheduler`] polls the active feeds held in a
//! [`db::ArticleStore`], matches entries against the active keywords and
//! stores each matching article once, keyed by its link.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod monitor;
pub mod text;
pub mod validation;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
