use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject shown for messages without a Subject header
pub const NO_SUBJECT: &str = "(No subject)";

/// Label id of the primary inbox
pub const INBOX_ID: &str = "INBOX";

/// Display name of the synthesized inbox folder
pub const INBOX_NAME: &str = "Inbox";

/// A folder the user can pick as cleanup target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn inbox() -> Self {
        Self::new(INBOX_ID, INBOX_NAME)
    }
}

/// An unread message selected by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub snippet: String,
}

/// Parameters of one scan request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanQuery {
    pub folder_id: String,
    pub cutoff: DateTime<Utc>,
    pub unread_only: bool,
}

impl ScanQuery {
    pub fn new(folder_id: impl Into<String>, cutoff: DateTime<Utc>) -> Self {
        Self {
            folder_id: folder_id.into(),
            cutoff,
            unread_only: true,
        }
    }

    /// Gmail search expression selecting the candidates server-side
    pub fn to_search_query(&self) -> String {
        let mut query = format!("label:{}", self.folder_id);
        if self.unread_only {
            query.push_str(" is:unread");
        }
        query.push_str(&format!(" before:{}", self.cutoff.timestamp()));
        query
    }
}

/// Result of a scan: the matching messages, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub messages: Vec<Message>,
    /// The id search hit the page cap, so older matches may remain
    pub more_results: bool,
}

/// Outcome of a batch delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub success: bool,
    pub deleted_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteResult {
    pub fn deleted(count: usize) -> Self {
        Self {
            success: true,
            deleted_count: count,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            deleted_count: 0,
            error: Some(error.into()),
        }
    }
}

/// Gmail `users.labels.list` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelList {
    #[serde(default)]
    pub labels: Vec<LabelRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// "system" or "user"
    #[serde(rename = "type", default)]
    pub label_type: Option<String>,
}

impl LabelRecord {
    pub fn is_user_label(&self) -> bool {
        self.label_type.as_deref() == Some("user")
    }
}

/// Gmail `users.messages.list` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

/// Gmail `users.messages.get` response (metadata format)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default, deserialize_with = "deserializers::deserialize_gmail_timestamp")]
    pub internal_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl MessageDetail {
    /// Value of the first header named "subject" (any case)
    pub fn subject(&self) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("subject"))
            .map(|h| h.value.as_str())
    }

    /// Normalize into a `Message`; `None` when the message has no usable date
    pub fn into_message(self) -> Option<Message> {
        let date = self.internal_date?;
        let subject = self.subject().unwrap_or(NO_SUBJECT).to_string();
        Some(Message {
            id: self.id,
            subject,
            date,
            snippet: self.snippet.unwrap_or_default(),
        })
    }
}

/// Custom deserializers for Gmail API types
pub mod deserializers {
    use chrono::{DateTime, Utc};
    use serde::de::{Deserializer, IgnoredAny};
    use serde::Deserialize;
    use tracing::debug;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Number(i64),
        Other(IgnoredAny),
    }

    /// Deserialize Gmail timestamp (milliseconds since epoch as string)
    ///
    /// Values that are not a valid millisecond count become `None`.
    pub fn deserialize_gmail_timestamp<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = match Option::<RawTimestamp>::deserialize(deserializer)? {
            Some(RawTimestamp::Text(s)) => s.trim().parse::<i64>().ok(),
            Some(RawTimestamp::Number(n)) => Some(n),
            Some(RawTimestamp::Other(_)) | None => None,
        };
        let parsed = millis.and_then(DateTime::from_timestamp_millis);
        if millis.is_some() && parsed.is_none() {
            debug!("Ignoring out-of-range internalDate {:?}", millis);
        }
        Ok(parsed)
    }
}
