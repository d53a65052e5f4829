use std::path::PathBuf;

use serde::Serialize;

use feedwatch::error::Result;
use feedwatch::models::{AddFeedOutcome, AddKeywordOutcome};
use feedwatch::{App, Config};

const USAGE: &str = "usage: feedwatch [--config PATH] [--scan | --status | --articles [N] | --feeds | --keywords
                 | --add-feed NAME URL | --add-keyword TEXT
                 | --toggle-feed ID | --toggle-keyword ID | --delete-feed ID | --delete-keyword ID]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info by default, override with RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    // Check for --config flag
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(idx) => {
            let path = args
                .get(idx + 1)
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("--config needs a path\n{USAGE}"))?;
            args.drain(idx..=idx + 1);
            path
        }
        None => Config::config_path(),
    };

    // Load configuration
    let config = Config::load_from(&config_path)?;

    // Initialize app
    let app = App::new(config).await?;

    let command: Vec<&str> = args.iter().map(String::as_str).collect();
    match command.as_slice() {
        [] => run_monitor(&app).await,
        ["--scan"] => {
            let report = app.monitor.manual_scan().await?;
            print_json(&report)
        }
        ["--status"] => print_json(&app.monitor.status().await?),
        ["--articles"] => print_json(&app.store.list_articles(app.config.article_list_limit).await?),
        ["--articles", limit] => {
            let limit: usize = limit
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid article limit {limit:?}"))?;
            print_json(&app.store.list_articles(limit).await?)
        }
        ["--feeds"] => print_json(&app.store.list_feeds().await?),
        ["--keywords"] => print_json(&app.store.list_keywords().await?),
        ["--add-feed", name, url] => {
            match app.store.add_feed(name, url).await? {
                AddFeedOutcome::Created(id) => println!("Created feed {id}"),
                AddFeedOutcome::DuplicateUrl => println!("DuplicateUrl: feed URL already exists"),
                AddFeedOutcome::InvalidInput(e) => println!("InvalidInput: {e}"),
            }
            Ok(())
        }
        ["--add-keyword", text] => {
            match app.store.add_keyword(text).await? {
                AddKeywordOutcome::Created(id) => println!("Created keyword {id}"),
                AddKeywordOutcome::Duplicate => println!("Duplicate: keyword already exists"),
                AddKeywordOutcome::InvalidInput(e) => println!("InvalidInput: {e}"),
            }
            Ok(())
        }
        ["--toggle-feed", id] => report_change(app.store.toggle_feed(parse_id(id)?).await?),
        ["--toggle-keyword", id] => report_change(app.store.toggle_keyword(parse_id(id)?).await?),
        ["--delete-feed", id] => report_change(app.store.delete_feed(parse_id(id)?).await?),
        ["--delete-keyword", id] => report_change(app.store.delete_keyword(parse_id(id)?).await?),
        _ => Err(anyhow::anyhow!("unrecognized arguments {args:?}\n{USAGE}").into()),
    }
}

/// Monitors until Ctrl-C.
async fn run_monitor(app: &App) -> Result<()> {
    app.monitor.start().await;
    tracing::info!(
        interval_secs = app.config.scan_interval_secs,
        "Monitoring feeds, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;

    if !app.monitor.stop().await {
        tracing::warn!("Exiting while a fetch is still in flight");
    }
    Ok(())
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid id {raw:?}").into())
}

fn report_change(changed: bool) -> Result<()> {
    if changed {
        println!("Updated");
    } else {
        println!("No such id, nothing changed");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
