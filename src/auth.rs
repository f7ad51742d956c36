//! OAuth2 token lifecycle for the Gmail API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::ApplicationSecret;

use crate::error::{CleanerError, Result};

/// Gmail API scopes requested by the cleaner
///
/// - gmail.readonly: list labels, search and read message metadata
/// - gmail.modify: label changes
/// - mail.google.com: permanent deletion through `messages.batchDelete`
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://mail.google.com/",
];

/// Opaque bearer credential
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Source of access tokens (the identity provider)
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a token. Interactive mode may prompt the user for consent.
    ///
    /// Returns `Ok(None)` when no token is available without user interaction.
    async fn fetch_token(&self, interactive: bool) -> Result<Option<BearerToken>>;

    /// Forget any credential the provider has cached on its side
    async fn clear_cached(&self) -> Result<()>;
}

/// Holds the single cached access token for the process
///
/// Acquisition runs while the inner lock is held, so at most one token
/// exchange is in flight; concurrent callers wait and reuse its result.
pub struct TokenStore {
    provider: Arc<dyn TokenProvider>,
    cached: Mutex<Option<BearerToken>>,
}

impl TokenStore {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    /// Resolve a token, using the cache unless `interactive` forces a new exchange
    ///
    /// Non-interactive failures are swallowed and reported as `None`.
    /// Interactive mode fails with `AuthDenied` when no token is granted.
    pub async fn get_token(&self, interactive: bool) -> Result<Option<BearerToken>> {
        let mut cached = self.cached.lock().await;

        if !interactive {
            if let Some(token) = cached.as_ref() {
                return Ok(Some(token.clone()));
            }
        }

        debug!("Requesting token from provider (interactive: {})", interactive);
        let fetched = match self.provider.fetch_token(interactive).await {
            Ok(token) => token,
            Err(e) if !interactive => {
                debug!("Silent token acquisition failed: {}", e);
                None
            }
            Err(CleanerError::AuthDenied(msg)) => return Err(CleanerError::AuthDenied(msg)),
            Err(e) => return Err(CleanerError::AuthDenied(e.to_string())),
        };

        match fetched {
            Some(token) => {
                *cached = Some(token.clone());
                Ok(Some(token))
            }
            None if interactive => Err(CleanerError::AuthDenied(
                "no token was granted".to_string(),
            )),
            None => Ok(None),
        }
    }

    /// Drop the cached token and purge the provider's cached credential
    pub async fn invalidate(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        *cached = None;
        info!("Access token invalidated");
        self.provider.clear_cached().await
    }

    /// Whether a token is currently cached in memory
    pub async fn has_cached_token(&self) -> bool {
        self.cached.lock().await.is_some()
    }
}

/// Flow delegate that never shows a consent URL, used for silent acquisition
struct SilentFlowDelegate;

impl InstalledFlowDelegate for SilentFlowDelegate {
    fn present_user_url<'a>(
        &'a self,
        _url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async { Err("interactive consent required".to_string()) })
    }
}

/// Flow delegate that prints the consent URL on stderr
///
/// stdout is reserved for command output and the bridge protocol.
struct ConsoleFlowDelegate;

impl InstalledFlowDelegate for ConsoleFlowDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            // Codes are only needed for the out-of-band flow; stdin belongs to the bridge
            if need_code {
                return Err("manual authorization codes are not supported".to_string());
            }
            eprintln!("Open this URL in your browser to authorize Gmail access:\n\n  {}\n", url);
            Ok(String::new())
        })
    }
}

/// Token provider backed by the OAuth2 installed-app flow
///
/// The provider-side session (refresh token) lives in `token_cache`.
pub struct InstalledFlowProvider {
    secret: ApplicationSecret,
    token_cache: PathBuf,
}

impl InstalledFlowProvider {
    pub fn new(secret: ApplicationSecret, token_cache: impl Into<PathBuf>) -> Self {
        Self {
            secret,
            token_cache: token_cache.into(),
        }
    }

    /// Build from a credentials file, falling back to environment variables
    pub async fn from_credentials(credentials_path: &Path, token_cache: &Path) -> Result<Self> {
        let secret = if credentials_path.exists() {
            load_credentials(credentials_path)
                .await
                .map_err(|e| {
                    CleanerError::ConfigError(format!("Failed to read credentials: {}", e))
                })?
                .installed
                .into()
        } else {
            debug!(
                "Credentials file {:?} not found, reading client id from environment",
                credentials_path
            );
            load_credentials_from_env()?
        };
        Ok(Self::new(secret, token_cache))
    }

    pub fn token_cache(&self) -> &Path {
        &self.token_cache
    }
}

#[async_trait]
impl TokenProvider for InstalledFlowProvider {
    async fn fetch_token(&self, interactive: bool) -> Result<Option<BearerToken>> {
        if !interactive && !self.token_cache.exists() {
            return Ok(None);
        }

        if let Some(parent) = self.token_cache.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let delegate: Box<dyn InstalledFlowDelegate> = if interactive {
            Box::new(ConsoleFlowDelegate)
        } else {
            Box::new(SilentFlowDelegate)
        };

        // HTTPRedirect listens on localhost for the consent callback
        let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
            self.secret.clone(),
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(self.token_cache.clone())
        .flow_delegate(delegate)
        .build()
        .await
        .map_err(|e| CleanerError::ConfigError(format!("Failed to build authenticator: {}", e)))?;

        match auth.token(REQUIRED_SCOPES).await {
            Ok(token) => {
                secure_token_file(&self.token_cache).await?;
                Ok(token.token().map(BearerToken::new))
            }
            Err(e) if interactive => Err(CleanerError::AuthDenied(e.to_string())),
            Err(e) => {
                debug!("No usable provider session: {}", e);
                Ok(None)
            }
        }
    }

    async fn clear_cached(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.token_cache).await {
            Ok(()) => {
                info!("Removed provider session cache {:?}", self.token_cache);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove provider session cache: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Credential structure matching Google's OAuth2 credentials JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

/// Installed application credentials (desktop/CLI app)
#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

impl From<InstalledApp> for ApplicationSecret {
    fn from(app: InstalledApp) -> Self {
        ApplicationSecret {
            client_id: app.client_id,
            client_secret: app.client_secret,
            auth_uri: app.auth_uri,
            token_uri: app.token_uri,
            redirect_uris: app.redirect_uris,
            project_id: Some(app.project_id),
            ..Default::default()
        }
    }
}

/// Load OAuth2 credentials from a JSON file
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| CleanerError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| CleanerError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GMAIL_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the session cache to owner read/write (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Ok(());
    }
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // ACL-based protection is left to the user profile directory
    Ok(())
}
