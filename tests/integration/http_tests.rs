//! Integration tests against mock HTTP servers
//!
//! These tests use wiremock to stand in for news feeds and the
//! chat-completions API, and run both pipelines end-to-end against a
//! temporary database.

use news_harvest::cancel::CancelSignal;
use news_harvest::config::{parse_config, AiConfig, DailyWindow, UserAgentConfig};
use news_harvest::enrich::{ChatCompletionEnricher, EnrichCapability, EnrichCoordinator, EnrichOptions};
use news_harvest::fetch::{build_http_client, FetchCapability, FetchCoordinator, HttpFeedFetcher};
use news_harvest::model::{FeedDescriptor, RawItem};
use news_harvest::retry::Classify;
use news_harvest::state::{FailureKind, StopReason};
use news_harvest::storage::{RunStatus, SqliteStorage, Storage};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LONG_TEXT: &str = "Die Bundesregierung hat am Mittwoch ein neues Gesetz zur Förderung \
erneuerbarer Energien beschlossen. Der Entwurf sieht vor, dass der Ausbau von Wind- und \
Solaranlagen beschleunigt wird.";

fn rss_body(base: &str, count: usize) -> String {
    let items: String = (0..count)
        .map(|i| {
            format!(
                "<item><title>Meldung {i}</title><link>{base}/artikel/{i}</link>\
                 <description><![CDATA[<p>{text}</p>]]></description></item>",
                i = i,
                base = base,
                text = LONG_TEXT
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Testfeed</title>{}</channel></rss>"#,
        items
    )
}

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500}
    })
}

const ANALYSIS: &str = r#"Hier ist die Analyse:
{"language_level": "B1", "topics": ["Energie", "Politik"],
 "vocabulary": [{"word": "Gesetz", "translation": "law"}],
 "grammar_patterns": ["Perfekt"], "difficulty_score": 4}"#;

fn ai_config(server: &MockServer) -> AiConfig {
    AiConfig {
        api_url: format!("{}/v1/chat/completions", server.uri()),
        request_timeout_secs: 5,
        ..AiConfig::default()
    }
}

fn article() -> RawItem {
    RawItem {
        url: "https://www.dw.com/de/artikel-1".to_string(),
        title: "Neues Energiegesetz".to_string(),
        published_at: None,
        source_domain: "www.dw.com".to_string(),
        source_feed: "https://rss.dw.com/xml/rss-de-all".to_string(),
        theme: "news".to_string(),
        raw_content: LONG_TEXT.to_string(),
    }
}

#[tokio::test]
async fn test_http_fetcher_parses_rss() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss_body(&server.uri(), 3))
                .insert_header("content-type", "application/rss+xml"),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFeedFetcher::new(
        build_http_client(&user_agent()).unwrap(),
        DailyWindow::PreviousDay,
    );
    let descriptor = FeedDescriptor::new(format!("{}/rss", server.uri()), "localhost", "news");

    let body = fetcher
        .fetch_body(&descriptor, Duration::from_secs(5))
        .await
        .unwrap();
    let items = fetcher.extract(&descriptor, body).await.unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].title, "Meldung 0");
    assert_eq!(items[0].url, format!("{}/artikel/0", server.uri()));
    assert_eq!(items[0].source_domain, "localhost");
    assert!(items[0].raw_content.starts_with("Die Bundesregierung"));
    assert!(!items[0].raw_content.contains("<p>"));
}

#[tokio::test]
async fn test_http_fetcher_classifies_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>kein Feed</body></html>"))
        .mount(&server)
        .await;

    let fetcher = HttpFeedFetcher::new(
        build_http_client(&user_agent()).unwrap(),
        DailyWindow::PreviousDay,
    );
    let fetch = |name: &str| {
        FeedDescriptor::new(format!("{}/{}", server.uri(), name), "localhost", "news")
    };

    let err = fetcher
        .fetch_body(&fetch("broken"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::TransientNetwork);
    assert!(err.is_retryable());

    let err = fetcher
        .fetch_body(&fetch("missing"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::Client);
    assert!(!err.is_retryable());

    // The page downloads fine; it only fails once parsed
    let body = fetcher
        .fetch_body(&fetch("html"), Duration::from_secs(5))
        .await
        .unwrap();
    let err = fetcher.extract(&fetch("html"), body).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::Extraction);
}

#[tokio::test]
async fn test_chat_enricher_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANALYSIS)))
        .expect(1)
        .mount(&server)
        .await;

    let config = ai_config(&server);
    let enricher = ChatCompletionEnricher::new(reqwest::Client::new(), config, "test-key");

    let output = enricher.enrich(&article()).await.unwrap();

    assert_eq!(output.outputs["language_level"], "B1");
    assert_eq!(output.outputs["topics"][0], "Energie");
    assert_eq!(output.tokens_used, 1500);
    // 1000 prompt tokens at $0.59/M plus 500 completion tokens at $0.79/M
    assert!((output.cost_usd - 0.000985).abs() < 1e-9);
    assert!(output.cost_usd <= enricher.estimate_cost(&article()) + 0.001);
}

#[tokio::test]
async fn test_chat_enricher_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer limited-key"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit reached"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer wrong-key"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API Key"))
        .mount(&server)
        .await;

    let limited =
        ChatCompletionEnricher::new(reqwest::Client::new(), ai_config(&server), "limited-key");
    let err = limited.enrich(&article()).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::TransientNetwork);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("429"));

    let unauthorized =
        ChatCompletionEnricher::new(reqwest::Client::new(), ai_config(&server), "wrong-key");
    let err = unauthorized.enrich(&article()).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::Client);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_chat_enricher_rejects_incomplete_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply(r#"{"language_level": "B1", "topics": []}"#)),
        )
        .mount(&server)
        .await;

    let enricher = ChatCompletionEnricher::new(reqwest::Client::new(), ai_config(&server), "k");
    let err = enricher.enrich(&article()).await.unwrap_err();

    assert_eq!(err.failure_kind(), FailureKind::Extraction);
    assert!(err.to_string().contains("vocabulary"));
}

#[tokio::test]
async fn test_fetch_then_enrich_end_to_end() {
    let feeds = MockServer::start().await;
    let api = MockServer::start().await;
    let base = feeds.uri();

    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss_body(&base, 3)))
        .mount(&feeds)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&feeds)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&feeds)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANALYSIS)))
        .expect(3)
        .mount(&api)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config_text = format!(
        r#"
[scheduler]
max-retries = 1
per-domain-delay-ms = 0
base-delay-ms = 10
max-delay-ms = 50
jitter-ms = 0
fetch-timeout-secs = 5

[enrichment]
workers = 2
min-dispatch-interval-ms = 0
max-retries = 0
base-delay-ms = 10
max-delay-ms = 50

[ai]
api-url = "{api}/v1/chat/completions"

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"

[[feed]]
url = "{base}/rss"
domain = "quelle-a.de"
theme = "news"

[[feed]]
url = "{base}/broken"
domain = "quelle-b.de"
theme = "news"

[[feed]]
url = "{base}/missing"
domain = "quelle-c.de"
theme = "tech"
"#,
        api = api.uri(),
        db = db_path.display(),
        base = base
    );
    let config = parse_config(&config_text).unwrap();

    let mut fetch = FetchCoordinator::new(config.clone(), "test-hash", CancelSignal::new()).unwrap();
    let fetch_summary = fetch.run().await.unwrap();

    assert_eq!(fetch_summary.stop_reason, StopReason::Completed);
    assert_eq!(fetch_summary.succeeded, 1);
    assert_eq!(fetch_summary.failed, 2);
    assert_eq!(fetch_summary.items_produced, 3);
    assert_eq!(fetch_summary.domains_covered, 1);
    assert_eq!(fetch_summary.failures_of(FailureKind::TransientNetwork), 1);
    assert_eq!(fetch_summary.failures_of(FailureKind::Client), 1);

    let enricher = Arc::new(ChatCompletionEnricher::new(
        reqwest::Client::new(),
        config.ai.clone(),
        "test-key",
    ));
    let mut enrich =
        EnrichCoordinator::with_enricher(config, "test-hash", enricher, CancelSignal::new())
            .unwrap();
    let enrich_summary = enrich
        .run(EnrichOptions {
            limit: None,
            max_cost_usd: Some(1.0),
        })
        .await
        .unwrap();

    assert_eq!(enrich_summary.stop_reason, StopReason::Completed);
    assert_eq!(enrich_summary.succeeded, 3);
    assert_eq!(enrich_summary.tokens_used, 4500);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let article_url = format!("{}/artikel/1", base);
    let stored = storage.get_article(&article_url).unwrap().unwrap();
    assert_eq!(stored.source_domain, "quelle-a.de");
    assert_eq!(stored.first_seen_run, fetch.run_id());

    let enrichment = storage.get_enrichment(&article_url).unwrap().unwrap();
    assert_eq!(enrichment.outputs["language_level"], "B1");
    assert_eq!(enrichment.model, "llama-3.3-70b-versatile");

    let run = storage.get_run(enrich.run_id()).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.succeeded, 3);

    let stats = storage.statistics().unwrap();
    assert_eq!(stats.total_articles, 3);
    assert_eq!(stats.enriched_articles, 3);
    assert_eq!(stats.total_runs, 2);
    assert!(storage
        .articles_pending_enrichment(100, None)
        .unwrap()
        .is_empty());
}
