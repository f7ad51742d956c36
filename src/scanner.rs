//! Unread message scanner with concurrent detail fetching

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::MailApi;
use crate::config::{ScanConfig, MAX_PAGE_SIZE};
use crate::error::{CleanerError, Result};
use crate::models::{Message, MessageDetail, ScanOutcome, ScanQuery};

/// Finds unread messages older than a cutoff in one folder
pub struct MessageScanner {
    api: Arc<dyn MailApi>,
    max_results: u32,
    max_concurrent: usize,
}

impl MessageScanner {
    pub fn new(api: Arc<dyn MailApi>) -> Self {
        Self::with_config(api, &ScanConfig::default())
    }

    pub fn with_config(api: Arc<dyn MailApi>, config: &ScanConfig) -> Self {
        Self {
            api,
            max_results: config.max_results.clamp(1, MAX_PAGE_SIZE),
            max_concurrent: config.max_concurrent_fetches.max(1),
        }
    }

    /// Scan `folder_id` for unread messages dated strictly before `cutoff`
    ///
    /// `preview_mode` is a presentation hint for the caller and does not
    /// change what is fetched.
    pub async fn scan(
        &self,
        folder_id: &str,
        cutoff: DateTime<Utc>,
        preview_mode: bool,
    ) -> Result<ScanOutcome> {
        debug!("Scanning {} (preview: {})", folder_id, preview_mode);
        self.scan_query(&ScanQuery::new(folder_id, cutoff)).await
    }

    pub async fn scan_query(&self, query: &ScanQuery) -> Result<ScanOutcome> {
        let search = query.to_search_query();
        info!("Searching messages: {}", search);

        let list = self.api.search_messages(&search, self.max_results).await?;
        if list.messages.is_empty() {
            info!("No messages matched");
            return Ok(ScanOutcome::default());
        }

        let more_results =
            list.messages.len() as u32 >= self.max_results || list.next_page_token.is_some();
        if more_results {
            warn!(
                "Search hit the {} message cap; older matches may remain",
                self.max_results
            );
        }

        let ids: Vec<String> = list.messages.into_iter().map(|m| m.id).collect();
        let details = self.fetch_details(ids).await?;
        let messages = select_messages(details, query.cutoff);

        info!("Scan complete: {} messages older than cutoff", messages.len());
        Ok(ScanOutcome {
            messages,
            more_results,
        })
    }

    /// Fetch message details concurrently; the first failure aborts the batch
    async fn fetch_details(&self, ids: Vec<String>) -> Result<Vec<MessageDetail>> {
        debug!(
            "Fetching {} messages with {} concurrent workers",
            ids.len(),
            self.max_concurrent
        );

        stream::iter(ids)
            .map(|id| {
                let api = &self.api;
                async move {
                    api.get_message(&id).await.map_err(|e| {
                        warn!("Failed to fetch message {}: {}", id, e);
                        e
                    })
                }
            })
            .buffer_unordered(self.max_concurrent)
            .try_collect()
            .await
    }
}

/// Normalize fetched details, keep those strictly before `cutoff`, oldest first
///
/// The server-side `before:` filter is not trusted around day and timezone
/// boundaries, so the date is checked again here.
pub fn select_messages(details: Vec<MessageDetail>, cutoff: DateTime<Utc>) -> Vec<Message> {
    let mut messages: Vec<Message> = details
        .into_iter()
        .filter_map(|detail| {
            let id = detail.id.clone();
            let message = detail.into_message();
            if message.is_none() {
                debug!("Dropping message {} without an internal date", id);
            }
            message
        })
        .filter(|message| message.date < cutoff)
        .collect();
    messages.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    messages
}

/// Parse a cutoff given as `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp
pub fn parse_cutoff(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| CleanerError::InvalidDate(input.to_string()));
    }

    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CleanerError::InvalidDate(format!("'{}' (expected YYYY-MM-DD)", input)))
}
