//! Contract Test: LAPI Stream Polling
//!
//! Runs the feed against an in-process fake LAPI.
//!
//! Constraints verified:
//! - The first successful poll uses `startup=true`, later ones `startup=false`
//! - A failed poll keeps `startup=true` for the next attempt
//! - The API key and origins are sent with every poll
//! - Polls without changes produce no batch

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use banlist_core::DecisionFeed;
use banlist_crowdsec::{CrowdsecConfig, CrowdsecFeed};
use tokio_stream::StreamExt;

#[derive(Debug, Clone)]
struct Poll {
    startup: String,
    origins: Option<String>,
    api_key: Option<String>,
}

/// Answers polls from a script; once the script runs out every poll is empty.
#[derive(Default)]
struct FakeLapi {
    script: Mutex<Vec<(StatusCode, String)>>,
    polls: Mutex<Vec<Poll>>,
}

async fn stream(
    State(lapi): State<Arc<FakeLapi>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    lapi.polls.lock().unwrap().push(Poll {
        startup: params.get("startup").cloned().unwrap_or_default(),
        origins: params.get("origins").cloned(),
        api_key: headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let mut script = lapi.script.lock().unwrap();
    let (status, body) = if script.is_empty() {
        (StatusCode::OK, r#"{"new": null, "deleted": null}"#.to_string())
    } else {
        script.remove(0)
    };
    (status, body).into_response()
}

async fn start_lapi(script: Vec<(StatusCode, &str)>) -> (String, Arc<FakeLapi>) {
    let lapi = Arc::new(FakeLapi {
        script: Mutex::new(script.into_iter().map(|(s, b)| (s, b.to_string())).collect()),
        polls: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/v1/decisions/stream", get(stream))
        .with_state(Arc::clone(&lapi));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    (url, lapi)
}

fn feed(url: &str, origins: Vec<String>) -> CrowdsecFeed {
    let mut config = CrowdsecConfig::new("bouncer-key");
    config.url = url.to_string();
    config.origins = origins;
    config.ticker_interval = Duration::from_millis(50);
    CrowdsecFeed::new(config).unwrap()
}

async fn wait_for_polls(lapi: &FakeLapi, count: usize) -> Vec<Poll> {
    for _ in 0..100 {
        let polls = lapi.polls.lock().unwrap().clone();
        if polls.len() >= count {
            return polls;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} polls", count);
}

#[tokio::test]
async fn startup_poll_then_deltas() {
    let (url, lapi) = start_lapi(vec![
        (
            StatusCode::OK,
            r#"{"new": [{"value": "1.2.3.4", "duration": "4h", "origin": "crowdsec", "scenario": "crowdsecurity/ssh-bf", "scope": "Ip"}], "deleted": null}"#,
        ),
        (StatusCode::OK, r#"{"new": null, "deleted": [{"value": "1.2.3.4"}]}"#),
    ])
    .await;
    let mut batches = feed(&url, vec!["crowdsec".to_string(), "cscli".to_string()]).watch();

    let first = tokio::time::timeout(Duration::from_secs(5), batches.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.added.len(), 1);
    assert_eq!(first.added[0].address, "1.2.3.4");
    assert_eq!(first.added[0].duration, "4h");

    let second = tokio::time::timeout(Duration::from_secs(5), batches.next())
        .await
        .unwrap()
        .unwrap();
    assert!(second.added.is_empty());
    assert_eq!(second.removed[0].address, "1.2.3.4");

    let polls = wait_for_polls(&lapi, 2).await;
    assert_eq!(polls[0].startup, "true");
    assert_eq!(polls[1].startup, "false");
    for poll in &polls {
        assert_eq!(poll.api_key.as_deref(), Some("bouncer-key"));
        assert_eq!(poll.origins.as_deref(), Some("crowdsec,cscli"));
    }
}

#[tokio::test]
async fn failed_poll_keeps_startup_flag() {
    let (url, lapi) = start_lapi(vec![
        (StatusCode::FORBIDDEN, r#"{"message": "access forbidden"}"#),
        (StatusCode::OK, "not json"),
        (StatusCode::OK, r#"{"new": [{"value": "5.6.7.8", "duration": "1h"}]}"#),
    ])
    .await;
    let mut batches = feed(&url, Vec::new()).watch();

    let batch = tokio::time::timeout(Duration::from_secs(5), batches.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.added[0].address, "5.6.7.8");

    let polls = wait_for_polls(&lapi, 4).await;
    let flags: Vec<&str> = polls.iter().map(|p| p.startup.as_str()).collect();
    assert_eq!(&flags[..4], &["true", "true", "true", "false"]);
    assert!(polls[0].origins.is_none());
}

#[tokio::test]
async fn empty_polls_produce_no_batches() {
    let (url, lapi) = start_lapi(Vec::new()).await;
    let mut batches = feed(&url, Vec::new()).watch();

    wait_for_polls(&lapi, 3).await;
    let next = tokio::time::timeout(Duration::from_millis(100), batches.next()).await;
    assert!(next.is_err(), "no batch for polls without changes");
}
