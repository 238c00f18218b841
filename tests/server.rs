//! HTTP API contract, served in-process on an ephemeral port.

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use ragfuse::app::AppContext;
use ragfuse::config::Config;
use ragfuse::server::{router, AppState};

async fn start(tmp: &TempDir) -> String {
    let cfg: Config = toml::from_str(&format!(
        r#"[db]
path = "{}/ragfuse.sqlite"

[embedding]
provider = "disabled"

[llm]
provider = "disabled"
"#,
        tmp.path().display()
    ))
    .unwrap();

    let ctx = Arc::new(AppContext::open(&cfg, true).await.unwrap());
    let app = router(AppState::new(Arc::new(cfg), ctx));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_and_collections() {
    let tmp = TempDir::new().unwrap();
    let base = start(&tmp).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let collections: Value = client
        .get(format!("{}/collections", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(collections["collections"], json!([]));
}

#[tokio::test]
async fn test_nothing_found_is_success() {
    let tmp = TempDir::new().unwrap();
    let base = start(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/search", base))
        .json(&json!({"query": "firewall", "collection": "all"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["documents"], json!([]));

    let resp = client
        .post(format!("{}/ask", base))
        .json(&json!({"question": "what broke?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sources"], json!([]));
    assert_eq!(body["confidence_score"]["level"], "No Data");
    assert_eq!(body["confidence_score"]["type"], "source_only");
}

#[tokio::test]
async fn test_error_contract() {
    let tmp = TempDir::new().unwrap();
    let base = start(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/search", base))
        .json(&json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/index", base))
        .json(&json!({
            "collection": "notes",
            "source_id": "NOTE-1",
            "content": "Deploys go through staging."
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "embeddings_disabled");

    let resp = client
        .get(format!("{}/usage/stats?period=decade", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_usage_endpoints() {
    let tmp = TempDir::new().unwrap();
    let base = start(&tmp).await;
    let client = reqwest::Client::new();

    let stats: Value = client
        .get(format!("{}/usage/stats?period=all", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["period"], "all");
    assert_eq!(stats["summary"]["total_requests"], 0);

    let costs: Value = client
        .get(format!("{}/usage/costs", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(costs["period"], "month");
    assert_eq!(costs["days"], json!([]));
}
