//! Authenticated Gmail REST client

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::error::{CleanerError, Result};
use crate::models::{LabelList, LabelRecord, MessageDetail, MessageList};

/// Fixed Gmail REST API base
pub const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Gmail operations used by the cleaner
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailApi: Send + Sync {
    /// List every label in the mailbox
    async fn list_labels(&self) -> Result<Vec<LabelRecord>>;

    /// Search message ids matching a Gmail query, one page of at most `max_results`
    async fn search_messages(&self, query: &str, max_results: u32) -> Result<MessageList>;

    /// Fetch message metadata (snippet, internal date, Subject header)
    async fn get_message(&self, id: &str) -> Result<MessageDetail>;

    /// Permanently delete messages in one call
    async fn batch_delete(&self, ids: &[String]) -> Result<()>;
}

/// Install the process-wide rustls crypto provider
///
/// Safe to call repeatedly; only the first call has an effect.
pub fn install_crypto_provider() {
    #[cfg(not(windows))]
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    #[cfg(windows)]
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// HTTP client that injects the bearer token and maps failures
pub struct ApiClient {
    http: HttpsClient,
    tokens: Arc<TokenStore>,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(tokens: Arc<TokenStore>) -> Result<Self> {
        install_crypto_provider();

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| CleanerError::ConfigError(format!("Failed to load TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();
        let http = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            http,
            tokens,
            base_url: API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Point the client at another server (used against local mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Issue an authenticated request and decode the JSON body
    ///
    /// A 401 purges the cached token and fails with `AuthExpired` without
    /// retrying. An empty success body decodes to `Value::Null`.
    pub async fn request(&self, endpoint: &str, method: Method, body: Option<&Value>) -> Result<Value> {
        let token = self
            .tokens
            .get_token(false)
            .await?
            .ok_or(CleanerError::NotAuthenticated)?;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", method, url);

        let payload = match body {
            Some(value) => Bytes::from(serde_json::to_vec(value)?),
            None => Bytes::new(),
        };

        let request = Request::builder()
            .method(method)
            .uri(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token.secret()))
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(payload))
            .map_err(|e| CleanerError::NetworkError(format!("Invalid request {}: {}", url, e)))?;

        let (status, bytes) = tokio::time::timeout(self.timeout, self.send(request))
            .await
            .map_err(|_| CleanerError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        if status == StatusCode::UNAUTHORIZED {
            warn!("Gmail API returned 401, invalidating cached token");
            if let Err(e) = self.tokens.invalidate().await {
                warn!("Failed to purge provider session: {}", e);
            }
            return Err(CleanerError::AuthExpired);
        }

        if !status.is_success() {
            return Err(CleanerError::from_status(status));
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| CleanerError::ParseError(e.to_string()))
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes)> {
        let response = self.http.request(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok((status, bytes))
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let value = self.request(endpoint, Method::GET, None).await?;
        decode(value)
    }
}

/// Decode a JSON value into a typed API record
fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CleanerError::ParseError(e.to_string()))
}

/// Percent-encode a query string component
fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl MailApi for ApiClient {
    async fn list_labels(&self) -> Result<Vec<LabelRecord>> {
        let list: LabelList = self.get_json("/users/me/labels").await?;
        Ok(list.labels)
    }

    async fn search_messages(&self, query: &str, max_results: u32) -> Result<MessageList> {
        let endpoint = format!(
            "/users/me/messages?q={}&maxResults={}",
            encode_component(query),
            max_results
        );
        let value = self.request(&endpoint, Method::GET, None).await?;
        if value.is_null() {
            return Ok(MessageList::default());
        }
        decode(value)
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail> {
        let endpoint = format!(
            "/users/me/messages/{}?format=metadata&metadataHeaders=Subject",
            encode_component(id)
        );
        self.get_json(&endpoint).await
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<()> {
        let body = json!({ "ids": ids });
        self.request("/users/me/messages/batchDelete", Method::POST, Some(&body))
            .await?;
        Ok(())
    }
}
