//! Action protocol between a front end and the cleaner
//!
//! Requests and replies are JSON objects. A request names its operation in
//! the `action` field; see [`Action`]. [`serve`] speaks the protocol as
//! JSON lines over any async reader/writer pair.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::TokenStore;
use crate::client::MailApi;
use crate::config::ScanConfig;
use crate::deleter::BatchDeleter;
use crate::error::{CleanerError, Result};
use crate::folders::FolderLister;
use crate::models::{DeleteResult, Folder, ScanOutcome};
use crate::scanner::{parse_cutoff, MessageScanner};

fn default_preview_mode() -> bool {
    true
}

/// A request from the front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    CheckAuth,
    Authenticate {
        /// Drop the current session before asking for consent again
        #[serde(default)]
        force: bool,
    },
    GetFolders,
    #[serde(rename_all = "camelCase")]
    ScanMessages {
        folder_id: String,
        date: String,
        #[serde(default = "default_preview_mode")]
        preview_mode: bool,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessages {
        #[serde(default)]
        message_ids: Vec<String>,
    },
}

impl Action {
    /// Wire names of every action
    pub const NAMES: &'static [&'static str] = &[
        "checkAuth",
        "authenticate",
        "getFolders",
        "scanMessages",
        "deleteMessages",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::CheckAuth => "checkAuth",
            Action::Authenticate { .. } => "authenticate",
            Action::GetFolders => "getFolders",
            Action::ScanMessages { .. } => "scanMessages",
            Action::DeleteMessages { .. } => "deleteMessages",
        }
    }
}

/// Reply to an [`Action`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Auth { authenticated: bool },
    Authenticated { success: bool },
    Folders { folders: Vec<Folder> },
    Messages(ScanOutcome),
    Deleted(DeleteResult),
    Error { error: String },
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// Decode a raw request, distinguishing unknown actions from malformed ones
pub fn decode_action(request: Value) -> std::result::Result<Action, Reply> {
    let name = match request.get("action").and_then(Value::as_str) {
        Some(name) if Action::NAMES.contains(&name) => name.to_string(),
        _ => return Err(Reply::error("Unknown action")),
    };
    serde_json::from_value(request)
        .map_err(|e| Reply::error(format!("Invalid {} request: {}", name, e)))
}

/// Routes actions to the token store and the mail components
pub struct Orchestrator {
    tokens: Arc<TokenStore>,
    folders: FolderLister,
    scanner: MessageScanner,
    deleter: BatchDeleter,
}

impl Orchestrator {
    pub fn new(tokens: Arc<TokenStore>, api: Arc<dyn MailApi>, scan: &ScanConfig) -> Self {
        Self {
            tokens,
            folders: FolderLister::new(Arc::clone(&api)),
            scanner: MessageScanner::with_config(Arc::clone(&api), scan),
            deleter: BatchDeleter::new(api),
        }
    }

    /// Whether a token is available without prompting the user
    pub async fn check_auth(&self) -> bool {
        matches!(self.tokens.get_token(false).await, Ok(Some(_)))
    }

    /// Run interactive consent, optionally discarding the current session first
    pub async fn authenticate(&self, force: bool) -> Result<()> {
        if force {
            self.tokens.invalidate().await?;
        }
        match self.tokens.get_token(true).await? {
            Some(_) => Ok(()),
            None => Err(CleanerError::AuthDenied("no token was granted".to_string())),
        }
    }

    pub async fn get_folders(&self) -> Result<Vec<Folder>> {
        self.folders.list_folders().await
    }

    pub async fn scan_messages(
        &self,
        folder_id: &str,
        date: &str,
        preview_mode: bool,
    ) -> Result<ScanOutcome> {
        let cutoff = parse_cutoff(date)?;
        self.scanner.scan(folder_id, cutoff, preview_mode).await
    }

    pub async fn delete_messages(&self, message_ids: &[String]) -> DeleteResult {
        self.deleter.delete_messages(message_ids).await
    }

    /// Execute one action; failures become `Reply::Error`
    pub async fn dispatch(&self, action: Action) -> Reply {
        let name = action.name();
        debug!("Dispatching {}", name);

        let result = match action {
            Action::CheckAuth => Ok(Reply::Auth {
                authenticated: self.check_auth().await,
            }),
            Action::Authenticate { force } => self
                .authenticate(force)
                .await
                .map(|()| Reply::Authenticated { success: true }),
            Action::GetFolders => self
                .get_folders()
                .await
                .map(|folders| Reply::Folders { folders }),
            Action::ScanMessages {
                folder_id,
                date,
                preview_mode,
            } => self
                .scan_messages(&folder_id, &date, preview_mode)
                .await
                .map(Reply::Messages),
            Action::DeleteMessages { message_ids } => {
                Ok(Reply::Deleted(self.delete_messages(&message_ids).await))
            }
        };

        result.unwrap_or_else(|e| {
            error!("{} failed: {}", name, e);
            Reply::error(e.to_string())
        })
    }

    /// Execute one action unless `cancel` fires first; cancellation wins ties
    pub async fn dispatch_cancellable(&self, action: Action, cancel: &CancellationToken) -> Reply {
        let name = action.name();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("{} cancelled", name);
                Reply::error(CleanerError::Cancelled.to_string())
            }
            reply = self.dispatch(action) => reply,
        }
    }

    /// Handle a raw JSON request and produce the JSON reply
    ///
    /// An `id` member on the request is copied onto the reply.
    pub async fn handle_json(&self, request: Value, cancel: &CancellationToken) -> Value {
        let id = request.get("id").cloned();

        let reply = match decode_action(request) {
            Ok(action) => self.dispatch_cancellable(action, cancel).await,
            Err(reply) => reply,
        };

        let mut value = serde_json::to_value(&reply)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }));
        if let (Some(id), Value::Object(map)) = (id, &mut value) {
            map.insert("id".to_string(), id);
        }
        value
    }
}

/// Serve the action protocol as JSON lines until `input` closes
///
/// Each line is handled on its own task, so replies may arrive out of order;
/// peers correlate them with `id`. When `input` closes, in-flight actions are
/// drained. Cancelling `shutdown` stops reading and cancels in-flight actions.
///
/// Token acquisition is single-flight, so while an `authenticate` action waits
/// on the consent screen, other actions that need a token (`checkAuth`
/// included) wait with it.
pub async fn serve<R, W>(
    orchestrator: Arc<Orchestrator>,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut in_flight: JoinSet<Value> = JoinSet::new();
    let mut input_open = true;

    info!("Bridge listening for actions");

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => match line? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let orchestrator = Arc::clone(&orchestrator);
                    let cancel = shutdown.child_token();
                    in_flight.spawn(async move {
                        match serde_json::from_str::<Value>(&line) {
                            Ok(request) => orchestrator.handle_json(request, &cancel).await,
                            Err(e) => serde_json::json!({ "error": format!("Invalid JSON: {}", e) }),
                        }
                    });
                }
                None => {
                    debug!("Bridge input closed, draining {} actions", in_flight.len());
                    input_open = false;
                }
            },
            _ = shutdown.cancelled(), if input_open => {
                info!("Bridge shutting down");
                input_open = false;
            },
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                let reply = done.unwrap_or_else(|e| {
                    error!("Action task failed: {}", e);
                    serde_json::json!({ "error": "Internal error" })
                });
                let mut line = serde_json::to_string(&reply)?;
                line.push('\n');
                output.write_all(line.as_bytes()).await?;
                output.flush().await?;
            },
            else => break,
        }
    }

    info!("Bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BearerToken, TokenProvider};
    use crate::client::MockMailApi;
    use crate::models::{LabelRecord, MessageList};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedProvider(Option<&'static str>);

    #[async_trait]
    impl TokenProvider for FixedProvider {
        async fn fetch_token(&self, _interactive: bool) -> Result<Option<BearerToken>> {
            Ok(self.0.map(BearerToken::new))
        }

        async fn clear_cached(&self) -> Result<()> {
            Ok(())
        }
    }

    fn orchestrator(api: MockMailApi, token: Option<&'static str>) -> Orchestrator {
        let tokens = Arc::new(TokenStore::new(Arc::new(FixedProvider(token))));
        Orchestrator::new(tokens, Arc::new(api), &ScanConfig::default())
    }

    #[test]
    fn test_decode_known_actions() {
        assert_eq!(decode_action(json!({"action": "checkAuth"})).unwrap(), Action::CheckAuth);
        assert_eq!(
            decode_action(json!({"action": "authenticate"})).unwrap(),
            Action::Authenticate { force: false }
        );
        assert_eq!(
            decode_action(json!({
                "action": "scanMessages",
                "folderId": "INBOX",
                "date": "2024-01-01"
            }))
            .unwrap(),
            Action::ScanMessages {
                folder_id: "INBOX".to_string(),
                date: "2024-01-01".to_string(),
                preview_mode: true,
            }
        );
        assert_eq!(
            decode_action(json!({"action": "deleteMessages"})).unwrap(),
            Action::DeleteMessages { message_ids: vec![] }
        );
    }

    #[test]
    fn test_decode_unknown_action() {
        assert_eq!(
            decode_action(json!({"action": "highlightMessages"})).unwrap_err(),
            Reply::error("Unknown action")
        );
        assert_eq!(
            decode_action(json!({"folderId": "INBOX"})).unwrap_err(),
            Reply::error("Unknown action")
        );
    }

    #[test]
    fn test_decode_malformed_action() {
        let reply = decode_action(json!({"action": "scanMessages", "folderId": "INBOX"})).unwrap_err();
        match reply {
            Reply::Error { error } => assert!(error.starts_with("Invalid scanMessages request")),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_action_names_match_wire_tags() {
        let actions = vec![
            Action::CheckAuth,
            Action::Authenticate { force: true },
            Action::GetFolders,
            Action::ScanMessages {
                folder_id: "x".to_string(),
                date: "2024-01-01".to_string(),
                preview_mode: false,
            },
            Action::DeleteMessages { message_ids: vec![] },
        ];
        for action in actions {
            let value = serde_json::to_value(&action).unwrap();
            assert_eq!(value["action"], action.name());
            assert!(Action::NAMES.contains(&action.name()));
        }
    }

    #[tokio::test]
    async fn test_check_auth_reports_session() {
        let signed_in = orchestrator(MockMailApi::new(), Some("t"));
        assert_eq!(signed_in.dispatch(Action::CheckAuth).await, Reply::Auth { authenticated: true });

        let signed_out = orchestrator(MockMailApi::new(), None);
        assert_eq!(signed_out.dispatch(Action::CheckAuth).await, Reply::Auth { authenticated: false });
    }

    #[tokio::test]
    async fn test_authenticate_denied_becomes_error_reply() {
        let orch = orchestrator(MockMailApi::new(), None);
        let reply = orch.dispatch(Action::Authenticate { force: false }).await;
        assert!(reply.is_error());

        let orch = orchestrator(MockMailApi::new(), Some("t"));
        let reply = orch.dispatch(Action::Authenticate { force: true }).await;
        assert_eq!(reply, Reply::Authenticated { success: true });
    }

    #[tokio::test]
    async fn test_get_folders_failure_becomes_error_reply() {
        let mut api = MockMailApi::new();
        api.expect_list_labels()
            .returning(|| Err(CleanerError::AuthExpired));

        let orch = orchestrator(api, Some("t"));
        let reply = orch.dispatch(Action::GetFolders).await;
        assert_eq!(reply, Reply::error("Authentication expired. Please re-authenticate."));
    }

    #[tokio::test]
    async fn test_get_folders_reply_shape() {
        let mut api = MockMailApi::new();
        api.expect_list_labels().returning(|| {
            Ok(vec![
                LabelRecord {
                    id: "INBOX".to_string(),
                    name: "INBOX".to_string(),
                    label_type: Some("system".to_string()),
                },
                LabelRecord {
                    id: "Label_1".to_string(),
                    name: "Work".to_string(),
                    label_type: Some("user".to_string()),
                },
            ])
        });

        let orch = orchestrator(api, Some("t"));
        let reply = orch
            .handle_json(json!({"action": "getFolders", "id": 7}), &CancellationToken::new())
            .await;
        assert_eq!(
            reply,
            json!({
                "folders": [
                    {"id": "INBOX", "name": "Inbox"},
                    {"id": "Label_1", "name": "Work"}
                ],
                "id": 7
            })
        );
    }

    #[tokio::test]
    async fn test_scan_with_invalid_date() {
        let mut api = MockMailApi::new();
        api.expect_search_messages().never();

        let orch = orchestrator(api, Some("t"));
        let reply = orch
            .dispatch(Action::ScanMessages {
                folder_id: "INBOX".to_string(),
                date: "last tuesday".to_string(),
                preview_mode: true,
            })
            .await;
        assert!(reply.is_error());
    }

    #[tokio::test]
    async fn test_scan_reply_shape() {
        let mut api = MockMailApi::new();
        api.expect_search_messages()
            .returning(|_, _| Ok(MessageList::default()));

        let orch = orchestrator(api, Some("t"));
        let reply = orch
            .handle_json(
                json!({"action": "scanMessages", "folderId": "INBOX", "date": "2024-01-01", "previewMode": false}),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(reply, json!({"messages": [], "moreResults": false}));
    }

    #[tokio::test]
    async fn test_unknown_action_reply() {
        let orch = orchestrator(MockMailApi::new(), Some("t"));
        let reply = orch
            .handle_json(json!({"action": "explode"}), &CancellationToken::new())
            .await;
        assert_eq!(reply, json!({"error": "Unknown action"}));
    }

    #[tokio::test]
    async fn test_cancelled_dispatch() {
        let mut api = MockMailApi::new();
        api.expect_list_labels().never();

        let orch = orchestrator(api, Some("t"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reply = orch.dispatch_cancellable(Action::GetFolders, &cancel).await;
        assert_eq!(reply, Reply::error("Operation cancelled"));
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let mut api = MockMailApi::new();
        api.expect_batch_delete().never();

        let orch = Arc::new(orchestrator(api, Some("t")));
        let input = concat!(
            "{\"action\":\"checkAuth\",\"id\":1}\n",
            "\n",
            "not json\n",
            "{\"action\":\"deleteMessages\",\"messageIds\":[],\"id\":2}\n",
            "{\"action\":\"nope\",\"id\":3}\n",
        );
        let mut output: Vec<u8> = Vec::new();

        serve(
            orch,
            tokio::io::BufReader::new(input.as_bytes()),
            &mut output,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 4);

        let by_id = |id: i64| replies.iter().find(|r| r["id"] == json!(id)).cloned();
        assert_eq!(by_id(1), Some(json!({"authenticated": true, "id": 1})));
        assert_eq!(
            by_id(2),
            Some(json!({"success": true, "deletedCount": 0, "id": 2}))
        );
        assert_eq!(by_id(3), Some(json!({"error": "Unknown action", "id": 3})));
        assert!(replies
            .iter()
            .any(|r| r["error"].as_str().map_or(false, |e| e.starts_with("Invalid JSON"))));
    }
}
