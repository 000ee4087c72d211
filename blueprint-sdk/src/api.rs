//! HTTP client for the blueprint backend.
//!
//! One [`ApiClient`] is shared (behind `Arc`) by every store so that the
//! bearer token installed at login applies to all later requests.

use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default backend address (the dev server the web client proxied to).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Standard response wrapper: `{success, message, response: {data}}`.
///
/// Not every endpoint sets every field; the policy endpoints omit `success`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub response: Option<Data<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Envelope<T> {
    /// Take `response.data`, failing if the server left it out.
    pub fn into_data(self, what: &str) -> Result<T> {
        self.response
            .map(|r| r.data)
            .ok_or_else(|| Error::UnexpectedResponse(format!("{what}: missing response.data")))
    }
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    bearer: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http,
            bearer: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach `Authorization: Bearer <token>` to every subsequent request.
    pub fn set_bearer(&self, token: &str) {
        *self.bearer.write() = Some(token.to_string());
    }

    pub fn clear_bearer(&self) {
        *self.bearer.write() = None;
    }

    pub fn has_bearer(&self) -> bool {
        self.bearer.read().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.bearer.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send("GET", path, self.request(Method::GET, path)).await
    }

    pub async fn get_json_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let builder = self.request(Method::GET, path).query(query);
        self.send("GET", path, builder).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let builder = self.request(Method::POST, path).json(body);
        self.send("POST", path, builder).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<T> {
        tracing::debug!("{method} {path}");
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                method,
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<T>().await?)
    }
}
