//! Command-line interface

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::{InstalledFlowProvider, TokenStore};
use crate::bridge::Orchestrator;
use crate::client::ApiClient;
use crate::config::Config;
use crate::error::{CleanerError, Result};
use crate::models::{DeleteResult, Folder, ScanOutcome};

#[derive(Parser, Debug)]
#[command(name = "gmail-cleaner")]
#[command(version)]
#[command(about = "Find and delete old unread Gmail messages", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file (overrides config)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to the OAuth2 session cache (overrides config)
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in to Gmail (opens the consent page)
    Auth {
        /// Discard the current session and sign in again
        #[arg(long)]
        force: bool,
    },

    /// Report whether a session is available without signing in
    CheckAuth,

    /// List folders that can be cleaned
    Folders,

    /// List unread messages older than a date
    Scan {
        /// Folder id or name
        #[arg(short, long)]
        folder: String,

        /// Cutoff date (YYYY-MM-DD); defaults to `scan.default_age_days` ago
        #[arg(short, long)]
        before: Option<String>,

        /// Offer to delete the results after listing them
        #[arg(long)]
        no_preview: bool,
    },

    /// Delete unread messages older than a date
    Delete {
        /// Folder id or name
        #[arg(short, long)]
        folder: String,

        /// Cutoff date (YYYY-MM-DD); defaults to `scan.default_age_days` ago
        #[arg(short, long)]
        before: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Answer JSON action requests on stdin, one per line
    Serve,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Spinner shown while waiting on the API
pub struct ProgressReporter {
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self { spinner_style }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cutoff `age_days` before `today`, formatted as YYYY-MM-DD
pub fn default_cutoff(today: NaiveDate, age_days: u32) -> String {
    (today - ChronoDuration::days(i64::from(age_days)))
        .format("%Y-%m-%d")
        .to_string()
}

/// Find a folder by id, then by name ignoring case
pub fn resolve_folder<'a>(folders: &'a [Folder], wanted: &str) -> Option<&'a Folder> {
    folders
        .iter()
        .find(|f| f.id == wanted)
        .or_else(|| folders.iter().find(|f| f.name.eq_ignore_ascii_case(wanted)))
}

pub fn render_folders(folders: &[Folder]) -> String {
    if folders.is_empty() {
        return "No folders found\n".to_string();
    }
    let width = folders.iter().map(|f| f.id.len()).max().unwrap_or(0);
    folders
        .iter()
        .map(|f| format!("  {:<width$}  {}\n", f.id, f.name, width = width))
        .collect()
}

/// Summary of a scan, listing at most `limit` messages
pub fn render_scan(outcome: &ScanOutcome, limit: usize) -> String {
    let mut out = format!(
        "Found {} unread messages older than the selected date\n",
        outcome.messages.len()
    );

    for message in outcome.messages.iter().take(limit) {
        out.push_str(&format!(
            "  {}  {}\n",
            message.date.format("%Y-%m-%d"),
            truncate_string(&message.subject, 70)
        ));
    }

    if outcome.messages.len() > limit {
        out.push_str(&format!(
            "  ... and {} more messages\n",
            outcome.messages.len() - limit
        ));
    }

    if outcome.more_results {
        out.push_str("Note: the search hit its result cap; run again after deleting to find more.\n");
    }
    out
}

/// Ask before an irreversible action; a cancelled prompt counts as "no"
fn confirm_action(prompt: &str) -> Result<bool> {
    match inquire::Confirm::new(prompt).with_default(false).prompt() {
        Ok(answer) => Ok(answer),
        Err(inquire::InquireError::OperationCanceled)
        | Err(inquire::InquireError::OperationInterrupted) => Ok(false),
        Err(e) => Err(CleanerError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            e.to_string(),
        ))),
    }
}

/// Cancel `token` when the user presses Ctrl-C
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

async fn cancellable<T>(cancel: &CancellationToken, work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CleanerError::Cancelled),
        result = work => result,
    }
}

/// Resolve the effective config: file values, then command-line overrides
pub async fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config).await?;
    if let Some(credentials) = &cli.credentials {
        config.auth.credentials_path = credentials.clone();
    }
    if let Some(token_cache) = &cli.token_cache {
        config.auth.token_cache_path = token_cache.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Wire the token store, API client and components together
pub async fn build_orchestrator(config: &Config) -> Result<Arc<Orchestrator>> {
    let provider = InstalledFlowProvider::from_credentials(
        &config.auth.credentials_path,
        &config.auth.token_cache_path,
    )
    .await?;
    let tokens = Arc::new(TokenStore::new(Arc::new(provider)));
    let client = ApiClient::new(Arc::clone(&tokens))?.with_timeout(config.api.request_timeout());
    Ok(Arc::new(Orchestrator::new(tokens, Arc::new(client), &config.scan)))
}

/// Scan a folder, show the results and, outside preview mode, delete them
///
/// Returns the deletion result when a deletion was attempted.
pub async fn clean_folder(
    orchestrator: &Orchestrator,
    config: &Config,
    folder: &str,
    before: Option<String>,
    preview_mode: bool,
    skip_confirm: bool,
) -> Result<Option<DeleteResult>> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let progress = ProgressReporter::new();

    let pb = progress.add_spinner("Loading folders...");
    let folders = cancellable(&cancel, orchestrator.get_folders()).await;
    pb.finish_and_clear();
    let folders = folders?;
    let target = resolve_folder(&folders, folder)
        .cloned()
        .ok_or_else(|| CleanerError::ConfigError(format!("Unknown folder: {}", folder)))?;
    debug!("Resolved folder {:?} -> {}", folder, target.id);

    let cutoff = before.unwrap_or_else(|| {
        default_cutoff(Utc::now().date_naive(), config.scan.default_age_days)
    });

    let pb = progress.add_spinner(&format!("Scanning {} before {}...", target.name, cutoff));
    let outcome = cancellable(
        &cancel,
        orchestrator.scan_messages(&target.id, &cutoff, preview_mode),
    )
    .await;
    pb.finish_and_clear();
    let outcome = outcome?;

    print!("{}", render_scan(&outcome, config.display.preview_limit));

    if preview_mode {
        println!("Preview mode: nothing was deleted.");
        return Ok(None);
    }
    if outcome.messages.is_empty() {
        return Ok(None);
    }

    let count = outcome.messages.len();
    if !skip_confirm {
        let prompt = format!(
            "Are you sure you want to delete {} messages? This action cannot be undone.",
            count
        );
        if !confirm_action(&prompt)? {
            println!("Deletion cancelled.");
            return Ok(None);
        }
    }

    let ids: Vec<String> = outcome.messages.into_iter().map(|m| m.id).collect();
    let pb = progress.add_spinner("Deleting messages...");
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            pb.finish_and_clear();
            return Err(CleanerError::Cancelled);
        }
        result = orchestrator.delete_messages(&ids) => result,
    };

    if result.success {
        progress.finish_spinner(
            &pb,
            &format!("Successfully deleted {} messages", result.deleted_count),
        );
    } else {
        pb.finish_and_clear();
    }
    Ok(Some(result))
}
