use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use feedwatch::config::Config;
use feedwatch::db::ArticleStore;
use feedwatch::models::{AddFeedOutcome, AddKeywordOutcome};
use feedwatch::monitor::MonitorScheduler;
use feedwatch::App;

const TECH_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Tech</title>
    <link>https://tech.example.com/</link>
    <description>Tech news</description>
    <item>
      <title>New AI chip unveiled</title>
      <link>https://tech.example.com/ai-chip</link>
      <description><![CDATA[<p>Faster <em>inference</em> for everyone</p>]]></description>
    </item>
    <item>
      <title>PAID subscriptions grow</title>
      <link>https://tech.example.com/paid</link>
      <description>Boats with SAILS</description>
    </item>
    <item>
      <title>Python packaging news</title>
      <link>https://tech.example.com/python</link>
      <description>pip and friends</description>
    </item>
  </channel>
</rss>"#;

/// Serves `body` on every request to `/feed.xml` and 404 elsewhere.
async fn serve_feed(body: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                counter.fetch_add(1, Ordering::SeqCst);

                let response = if request.starts_with("GET /feed.xml") {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), hits)
}

fn test_config() -> Config {
    Config {
        db_path: ":memory:".to_string(),
        scan_interval_secs: 3600,
        feed_delay_secs: 0,
        fetch_timeout_secs: 5,
        error_backoff_secs: 1,
        stop_timeout_secs: 5,
        feeds: Vec::new(),
        keywords: Vec::new(),
        ..Config::default()
    }
}

#[tokio::test]
async fn scan_stores_matches_from_live_feed_and_skips_broken_one() {
    let (base, _hits) = serve_feed(TECH_FEED).await;
    let store = Arc::new(ArticleStore::open_in_memory().await.unwrap());
    let monitor = MonitorScheduler::from_config(Arc::clone(&store), &test_config()).unwrap();

    assert!(matches!(
        store.add_feed("Missing", &format!("{base}/gone.xml")).await.unwrap(),
        AddFeedOutcome::Created(_)
    ));
    assert!(matches!(
        store.add_feed("Tech", &format!("{base}/feed.xml")).await.unwrap(),
        AddFeedOutcome::Created(_)
    ));
    assert!(matches!(
        store.add_keyword("AI").await.unwrap(),
        AddKeywordOutcome::Created(_)
    ));

    let report = monitor.manual_scan().await.unwrap();
    assert_eq!(report.feeds_failed, 1);
    assert_eq!(report.feeds_scanned, 1);
    assert_eq!(report.entries_seen, 3);
    assert_eq!(report.articles_stored, 1);

    let articles = store.list_articles(20).await.unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].link, "https://tech.example.com/ai-chip");
    assert_eq!(articles[0].description, "Faster inference for everyone");
    assert_eq!(articles[0].matched_keywords, vec!["AI"]);

    // Second pass over identical content stores nothing new
    let again = monitor.manual_scan().await.unwrap();
    assert_eq!(again.articles_stored, 0);
    assert_eq!(again.duplicates_skipped, 1);

    // A newly added keyword picks up entries not stored before
    store.add_keyword("python").await.unwrap();
    let third = monitor.manual_scan().await.unwrap();
    assert_eq!(third.articles_stored, 1);
    assert_eq!(store.counts().await.unwrap().articles, 2);
}

#[tokio::test]
async fn background_loop_scans_until_stopped() {
    let (base, hits) = serve_feed(TECH_FEED).await;
    let store = Arc::new(ArticleStore::open_in_memory().await.unwrap());
    let monitor = MonitorScheduler::from_config(Arc::clone(&store), &test_config()).unwrap();
    store
        .add_feed("Tech", &format!("{base}/feed.xml"))
        .await
        .unwrap();
    store.add_keyword("AI").await.unwrap();

    assert!(monitor.start().await);
    tokio::time::timeout(Duration::from_secs(10), async {
        while store.counts().await.unwrap().articles == 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("background loop stored nothing");

    let status = monitor.status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.total_article_count, 1);

    let started = std::time::Instant::now();
    assert!(monitor.stop().await);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!monitor.status().await.unwrap().running);

    // The loop is waiting out a one-hour interval, so only one fetch happened
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn app_seeds_and_scans() {
    let (base, _hits) = serve_feed(TECH_FEED).await;
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        db_path: dir.path().join("news.db").to_string_lossy().to_string(),
        feeds: vec![feedwatch::config::SeedFeed {
            name: "Tech".to_string(),
            url: format!("{base}/feed.xml"),
        }],
        keywords: vec!["ai".to_string(), "Python".to_string()],
        ..test_config()
    };

    let app = App::new(config).await.unwrap();
    let report = app.monitor.manual_scan().await.unwrap();
    assert_eq!(report.articles_stored, 2);

    let articles = app.store.list_articles(20).await.unwrap();
    let mut keywords: Vec<_> = articles
        .iter()
        .flat_map(|a| a.matched_keywords.clone())
        .collect();
    keywords.sort();
    assert_eq!(keywords, vec!["Python", "ai"]);
}
