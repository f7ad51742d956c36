//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use gmail_unread_cleaner::auth::{BearerToken, TokenProvider, TokenStore};
use gmail_unread_cleaner::client::{ApiClient, MailApi};
use gmail_unread_cleaner::error::Result;
use gmail_unread_cleaner::models::{LabelRecord, MessageDetail, MessageList};
use mockall::mock;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_TOKEN: &str = "test-access-token";

/// Token provider backed by a fixed token that `clear_cached` removes
pub struct StaticTokenProvider {
    token: Mutex<Option<String>>,
    fetches: AtomicUsize,
    clears: AtomicUsize,
}

impl StaticTokenProvider {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: Mutex::new(token.map(str::to_string)),
            fetches: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, _interactive: bool) -> Result<Option<BearerToken>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let token = self.token.lock().unwrap().clone();
        Ok(token.map(BearerToken::new))
    }

    async fn clear_cached(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

/// Token store plus a handle on its provider for assertions
pub fn token_store(token: Option<&str>) -> (Arc<TokenStore>, Arc<StaticTokenProvider>) {
    let provider = Arc::new(StaticTokenProvider::new(token));
    let store = Arc::new(TokenStore::new(provider.clone()));
    (store, provider)
}

/// API client pointed at a local mock server
pub fn api_client(base_url: &str, tokens: Arc<TokenStore>) -> ApiClient {
    ApiClient::new(tokens)
        .unwrap()
        .with_base_url(base_url)
        .with_timeout(Duration::from_secs(5))
}

/// Create mock Gmail API labels.list response (JSON)
pub fn mock_labels_response() -> serde_json::Value {
    json!({
        "labels": [
            {"id": "SENT", "name": "SENT", "type": "system"},
            {"id": "Label_2", "name": "receipts", "type": "user"},
            {"id": "INBOX", "name": "INBOX", "type": "system"},
            {"id": "Label_1", "name": "Archive", "type": "user"},
            {"id": "UNREAD", "name": "UNREAD", "type": "system"}
        ]
    })
}

/// Create mock Gmail API messages.list response (JSON)
pub fn mock_gmail_list_response(ids: &[&str]) -> serde_json::Value {
    let messages: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "threadId": format!("thread_{}", id)}))
        .collect();

    json!({
        "messages": messages,
        "resultSizeEstimate": ids.len()
    })
}

/// Create mock Gmail API messages.get (metadata) response (JSON)
pub fn mock_gmail_message_response(
    id: &str,
    subject: Option<&str>,
    internal_date_ms: i64,
) -> serde_json::Value {
    let headers = match subject {
        Some(subject) => json!([{"name": "Subject", "value": subject}]),
        None => json!([]),
    };

    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "labelIds": ["INBOX", "UNREAD"],
        "snippet": format!("Snippet for {}", id),
        "internalDate": internal_date_ms.to_string(),
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": headers
        }
    })
}

// Mock Gmail API for component-level tests
mock! {
    pub Gmail {}

    #[async_trait]
    impl MailApi for Gmail {
        async fn list_labels(&self) -> Result<Vec<LabelRecord>>;
        async fn search_messages(&self, query: &str, max_results: u32) -> Result<MessageList>;
        async fn get_message(&self, id: &str) -> Result<MessageDetail>;
        async fn batch_delete(&self, ids: &[String]) -> Result<()>;
    }
}
