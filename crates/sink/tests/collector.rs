use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use kubewatch_core::DeliveryError;
use kubewatch_sink::{CollectorSettings, EventLabels, HecSink, Sink};
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// What the mock collector answers with.
#[derive(Clone)]
struct Reply {
    status: StatusCode,
    body: Value,
}

struct MockCollector {
    reply: Reply,
    received: Mutex<Vec<(Option<String>, Value)>>,
}

async fn handle_event(State(state): State<Arc<MockCollector>>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned);
    state.received.lock().await.push((auth, body));
    (state.reply.status, Json(state.reply.body.clone()))
}

async fn start_mock_collector(reply: Reply) -> (SocketAddr, Arc<MockCollector>) {
    let state = Arc::new(MockCollector { reply, received: Mutex::new(Vec::new()) });
    let app = Router::new().route("/services/collector/event", post(handle_event)).with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, state)
}

fn settings(addr: SocketAddr) -> CollectorSettings {
    CollectorSettings::new(format!("http://{addr}/services/collector/event"), "s3cr3t")
}

fn ok() -> Reply {
    Reply { status: StatusCode::OK, body: json!({"text": "Success", "code": 0}) }
}

#[tokio::test]
async fn event_is_posted_with_token_and_labels() {
    let (addr, state) = start_mock_collector(ok()).await;
    let mut s = settings(addr);
    s.labels = EventLabels {
        host: Some("cluster-a".into()),
        index: Some("k8s".into()),
        source: None,
        sourcetype: Some("_json".into()),
    };
    let sink = HecSink::new(s).unwrap();
    assert_eq!(sink.name(), "collector");

    sink.write(r#"{"kubewatch_kind":"Pod"}"#).await.unwrap();

    let received = state.received.lock().await;
    assert_eq!(received.len(), 1);
    let (auth, body) = &received[0];
    assert_eq!(auth.as_deref(), Some("Splunk s3cr3t"));
    assert_eq!(body["event"], r#"{"kubewatch_kind":"Pod"}"#);
    assert_eq!(body["host"], "cluster-a");
    assert_eq!(body["index"], "k8s");
    assert_eq!(body["sourcetype"], "_json");
    assert!(body.get("source").is_none());
    assert!(body["time"].as_f64().unwrap() > 1.0e9);
}

#[tokio::test]
async fn non_success_status_is_rejected() {
    let (addr, _) = start_mock_collector(Reply {
        status: StatusCode::FORBIDDEN,
        body: json!({"text": "Invalid token", "code": 4}),
    })
    .await;
    let sink = HecSink::new(settings(addr)).unwrap();

    match sink.write("{}").await {
        Err(DeliveryError::Rejected { sink, status, body }) => {
            assert_eq!(sink, "collector");
            assert_eq!(status, 403);
            assert!(body.contains("Invalid token"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn nonzero_code_in_success_reply_is_refused() {
    let (addr, _) = start_mock_collector(Reply {
        status: StatusCode::OK,
        body: json!({"text": "Server is busy", "code": 9}),
    })
    .await;
    let sink = HecSink::new(settings(addr)).unwrap();

    match sink.write("{}").await {
        Err(DeliveryError::Refused { code, text, .. }) => {
            assert_eq!(code, 9);
            assert_eq!(text, "Server is busy");
        }
        other => panic!("expected Refused, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_collector_is_a_transport_error() {
    let sink = HecSink::new(CollectorSettings::new("http://127.0.0.1:1/services/collector/event", "t")).unwrap();
    let err = sink.write("{}").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport { sink: "collector", .. }), "{err:?}");
}

#[tokio::test]
async fn hung_collector_times_out() {
    // accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });

    let mut s = settings(addr);
    s.timeout = Duration::from_millis(300);
    let sink = HecSink::new(s).unwrap();

    let start = std::time::Instant::now();
    let err = sink.write("{}").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport { .. }), "{err:?}");
    assert!(start.elapsed() < Duration::from_secs(10), "took {:?}", start.elapsed());
}
