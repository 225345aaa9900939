mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use deck::Coordinates;
use deck_client::RecordingSink;
use httpbutton::sync::{self, text::TextSync};
use httpbutton::{ContentSync, SyncError, SyncOutcome};
use serde_json::{Value, json};

use support::{
    FlakySink, GatedSink, Requests, services, services_with, settings, spawn_http_server, svg_of,
    test_config,
};

const LABELS: &str = "button content: demo\nAlpha\n\n  Beta  \nGamma\n";

fn label_server(requests: Requests, body: &'static str) -> Router {
    Router::new().route(
        "/labels",
        post(move |Json(request): Json<Value>| {
            let requests = requests.clone();
            async move {
                requests.push(request);
                body
            }
        }),
    )
}

#[tokio::test]
async fn failed_fetch_without_cache_sends_nothing() -> Result<()> {
    let app = Router::new().route(
        "/labels",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let (addr, _shutdown) = spawn_http_server(app).await?;
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    services.registry.write().await.add_action(
        "p.httpButton",
        "ctx",
        settings(json!({"textUrl": format!("http://{addr}/labels")})),
    );
    let engine = TextSync::new(services);

    let result = engine.refresh("ctx", true).await;
    assert!(
        matches!(result, Err(SyncError::ContentFetch(_))),
        "unexpected result: {result:?}"
    );
    assert!(sink.sent().await.is_empty());
    assert_eq!(engine.poller().fingerprints.get("ctx").await, None);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_falls_back_to_label_file() -> Result<()> {
    let app = Router::new().route(
        "/labels",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let (addr, _shutdown) = spawn_http_server(app).await?;
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("deck.md"), "One\nTwo\n")?;

    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    services.registry.write().await.add_action(
        "p.httpButton",
        "ctx",
        settings(json!({
            "textUrl": format!("http://{addr}/labels"),
            "mdFilePath": "deck.md",
        })),
    );
    let engine = TextSync::new(services);

    assert_eq!(engine.refresh("ctx", false).await?, SyncOutcome::Dispatched);
    let sent = sink.sent_with_event("setImage").await;
    assert_eq!(sent.len(), 1);
    let svg = svg_of(&sent[0])?;
    assert!(svg.contains(">One</text>"));
    assert!(svg.contains(">Two</text>"));

    let persisted = std::fs::read_to_string(dir.path().join("images/deck.svg"))?;
    assert_eq!(persisted, svg);
    Ok(())
}

#[tokio::test]
async fn unchanged_text_is_not_redrawn_unless_forced() -> Result<()> {
    let requests = Requests::default();
    let (addr, _shutdown) = spawn_http_server(label_server(requests.clone(), LABELS)).await?;
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    services
        .registry
        .write()
        .await
        .add_action(
            "p.httpButton",
            "ctx",
            settings(json!({"textUrl": format!("http://{addr}/labels")})),
        )
        .coordinates = Some(Coordinates { column: 2, row: 1 });
    let engine = TextSync::new(services);

    assert_eq!(engine.refresh("ctx", false).await?, SyncOutcome::Dispatched);
    assert_eq!(engine.refresh("ctx", false).await?, SyncOutcome::Unchanged);
    assert_eq!(sink.sent_with_event("setImage").await.len(), 1);

    assert_eq!(engine.refresh("ctx", true).await?, SyncOutcome::Dispatched);
    let sent = sink.sent_with_event("setImage").await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);

    let svg = svg_of(&sent[0])?;
    assert_eq!(svg.matches("<text ").count(), 3);
    for (label, y) in [("Alpha", 42), ("Beta", 74), ("Gamma", 106)] {
        assert!(
            svg.contains(&format!(r#"y="{y}""#)) && svg.contains(&format!(">{label}</text>")),
            "missing {label} at {y}: {svg}"
        );
    }

    assert_eq!(
        requests.all().first(),
        Some(&json!({"button": 8, "name": "text"}))
    );
    let cached = std::fs::read_to_string(dir.path().join("text.md"))?;
    assert_eq!(cached, LABELS);
    Ok(())
}

#[tokio::test]
async fn header_only_text_renders_nothing() -> Result<()> {
    let (addr, _shutdown) =
        spawn_http_server(label_server(Requests::default(), "button content: none\n\n")).await?;
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    services.registry.write().await.add_action(
        "p.httpButton",
        "ctx",
        settings(json!({"textUrl": format!("http://{addr}/labels")})),
    );
    let engine = TextSync::new(services);

    assert_eq!(engine.refresh("ctx", true).await?, SyncOutcome::Empty);
    assert!(sink.sent().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_context_is_detached() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let engine = TextSync::new(services(&sink, test_config(dir.path()))?);
    assert_eq!(engine.refresh("missing", true).await?, SyncOutcome::Detached);
    assert_eq!(engine.press("missing", None).await?, SyncOutcome::Detached);
    Ok(())
}

#[tokio::test]
async fn press_posts_index_and_label_then_redraws() -> Result<()> {
    let presses = Requests::default();
    let app = label_server(Requests::default(), "One\nTwo\nThree\n").route(
        "/press",
        post({
            let presses = presses.clone();
            move |Json(request): Json<Value>| {
                let presses = presses.clone();
                async move {
                    presses.push(request);
                    "ok"
                }
            }
        }),
    );
    let (addr, _shutdown) = spawn_http_server(app).await?;
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    services.registry.write().await.add_action(
        "p.httpButton",
        "ctx",
        settings(json!({
            "textUrl": format!("http://{addr}/labels"),
            "httpUrl": format!("http://{addr}/press"),
            "buttonIndex": 2,
            "sendText": true,
        })),
    );
    let engine = TextSync::new(services);

    assert_eq!(engine.refresh("ctx", false).await?, SyncOutcome::Dispatched);
    assert_eq!(engine.press("ctx", None).await?, SyncOutcome::Dispatched);

    assert_eq!(presses.all(), vec![json!({"button": 2, "text": "Two"})]);
    assert_eq!(sink.sent_with_event("setImage").await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn press_without_labels_still_posts_the_button() -> Result<()> {
    let presses = Requests::default();
    let app = Router::new()
        .route(
            "/labels",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/press",
            post({
                let presses = presses.clone();
                move |Json(request): Json<Value>| {
                    let presses = presses.clone();
                    async move {
                        presses.push(request);
                        "ok"
                    }
                }
            }),
        );
    let (addr, _shutdown) = spawn_http_server(app).await?;
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    services.registry.write().await.add_action(
        "p.httpButton",
        "ctx",
        settings(json!({
            "textUrl": format!("http://{addr}/labels"),
            "httpUrl": format!("http://{addr}/press"),
            "buttonIndex": 3,
            "sendText": true,
        })),
    );
    let engine = TextSync::new(services);

    // The redraw after the press has nothing to show either.
    let result = engine.press("ctx", None).await;
    assert!(
        matches!(result, Err(SyncError::ContentFetch(_))),
        "unexpected result: {result:?}"
    );
    assert_eq!(presses.all(), vec![json!({"button": 3})]);
    assert!(sink.sent().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn press_uses_grid_position_and_default_url() -> Result<()> {
    let presses = Requests::default();
    let (addr, _shutdown) = spawn_http_server(label_server(presses.clone(), "ok")).await?;
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("text.md"), "Solo\n")?;

    let sink = RecordingSink::new();
    let mut config = test_config(dir.path());
    config.default_action_url = Some(format!("http://{addr}/labels"));
    let services = services(&sink, config)?;
    services
        .registry
        .write()
        .await
        .add_action("p.httpButton", "ctx", settings(json!({})));
    let engine = TextSync::new(services);

    let outcome = engine
        .press("ctx", Some(Coordinates { column: 3, row: 2 }))
        .await?;
    assert_eq!(outcome, SyncOutcome::Dispatched);
    assert_eq!(presses.all(), vec![json!({"button": 14})]);
    Ok(())
}

#[tokio::test]
async fn press_without_action_url_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    services
        .registry
        .write()
        .await
        .add_action("p.httpButton", "ctx", settings(json!({})));
    let engine = TextSync::new(services);

    let result = engine.press("ctx", None).await;
    assert!(matches!(result, Err(SyncError::MissingActionUrl)));
    assert!(sink.sent().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_dispatch_is_retried_on_the_next_tick() -> Result<()> {
    let (addr, _shutdown) = spawn_http_server(label_server(Requests::default(), LABELS)).await?;
    let dir = tempfile::tempdir()?;
    let sink = FlakySink::failing(1);
    let services = services_with(Arc::new(sink.clone()), test_config(dir.path()))?;
    services.registry.write().await.add_action(
        "p.httpButton",
        "ctx",
        settings(json!({"textUrl": format!("http://{addr}/labels")})),
    );
    let engine = TextSync::new(services);

    let result = engine.refresh("ctx", false).await;
    assert!(
        matches!(result, Err(SyncError::Dispatch(_))),
        "unexpected result: {result:?}"
    );
    assert_eq!(engine.poller().fingerprints.get("ctx").await, None);

    assert_eq!(engine.refresh("ctx", false).await?, SyncOutcome::Dispatched);
    assert_eq!(
        engine.poller().fingerprints.get("ctx").await.as_deref(),
        Some(LABELS)
    );
    assert_eq!(sink.recorded.sent_with_event("setImage").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn key_removed_during_fetch_gets_no_face() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sink = RecordingSink::new();
    let services = services(&sink, test_config(dir.path()))?;
    let registry = services.registry.clone();
    registry.write().await.add_action("p.httpButton", "ctx", settings(json!({})));

    let app = Router::new().route(
        "/labels",
        post(move || {
            let registry = registry.clone();
            async move {
                registry.write().await.del_action("ctx");
                LABELS
            }
        }),
    );
    let (addr, _shutdown) = spawn_http_server(app).await?;
    if let Some(instance) = services.registry.write().await.get_action_mut("ctx") {
        instance.settings = settings(json!({"textUrl": format!("http://{addr}/labels")}));
    }
    let engine = TextSync::new(services);

    assert_eq!(engine.refresh("ctx", true).await?, SyncOutcome::Detached);
    assert!(sink.sent().await.is_empty());
    assert_eq!(engine.poller().fingerprints.get("ctx").await, None);
    Ok(())
}

#[tokio::test]
async fn removal_waits_for_an_in_progress_dispatch() -> Result<()> {
    let (addr, _shutdown) = spawn_http_server(label_server(Requests::default(), LABELS)).await?;
    let dir = tempfile::tempdir()?;
    let sink = GatedSink::default();
    let services = services_with(Arc::new(sink.clone()), test_config(dir.path()))?;
    let registry = services.registry.clone();
    registry.write().await.add_action(
        "p.httpButton",
        "ctx",
        settings(json!({"textUrl": format!("http://{addr}/labels")})),
    );
    let engine = TextSync::new(services);

    let refresh = tokio::spawn({
        let engine = engine.clone();
        async move { engine.refresh("ctx", true).await }
    });
    tokio::time::timeout(Duration::from_secs(5), sink.entered.notified())
        .await
        .context("dispatch never reached the sink")?;

    let removal = tokio::spawn(async move {
        registry.write().await.del_action("ctx");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!removal.is_finished());

    sink.release.notify_one();
    assert_eq!(refresh.await??, SyncOutcome::Dispatched);
    removal.await?;
    sync::unwatch(engine.as_ref(), "ctx").await?;

    assert_eq!(engine.poller().fingerprints.get("ctx").await, None);
    assert_eq!(engine.refresh("ctx", true).await?, SyncOutcome::Detached);
    assert_eq!(sink.recorded.sent_with_event("setImage").await.len(), 1);
    Ok(())
}
