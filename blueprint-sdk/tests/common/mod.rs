//! In-process mock backend for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use base64::Engine;
use blueprint_sdk::{ApiClient, MemoryStore};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Route SDK logs through the test harness; `RUST_LOG=blueprint_sdk=debug`
/// shows them for failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn serve(router: Router) -> String {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn dead_base_url() -> String {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn client(base_url: &str) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(base_url))
}

pub fn memory() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// Unsigned JWT carrying member claims.
pub fn jwt(member_id: &str, member_name: &str) -> String {
    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = b64.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = b64.encode(
        serde_json::json!({
            "sub": member_id,
            "memberId": member_id,
            "memberName": member_name,
            "exp": 4102444800i64,
        })
        .to_string(),
    );
    format!("{header}.{payload}.c2ln")
}

/// Authorization headers seen by a route, in arrival order.
#[derive(Clone, Default)]
pub struct SeenAuth(Arc<Mutex<Vec<Option<String>>>>);

impl SeenAuth {
    pub fn record(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.0.lock().push(value);
    }

    pub fn all(&self) -> Vec<Option<String>> {
        self.0.lock().clone()
    }
}
