//! Gmail Unread Cleaner
//!
//! Finds unread Gmail messages older than a cutoff date in one folder and
//! deletes them permanently in a single batch.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with a single cached token
//! - **Folders**: Inbox plus user labels, sorted by name
//! - **Scanning**: Search by folder, unread status and date, with concurrent detail fetches
//! - **Deletion**: One `batchDelete` call, reported as a value rather than an error
//! - **Bridge**: JSON action requests answered over stdin/stdout
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_unread_cleaner::{cli, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     gmail_unread_cleaner::client::install_crypto_provider();
//!
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let orchestrator = cli::build_orchestrator(&config).await?;
//!
//!     let outcome = orchestrator.scan_messages("INBOX", "2024-01-01", true).await?;
//!     println!("{} old unread messages", outcome.messages.len());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod bridge;
pub mod cli;
pub mod client;
pub mod config;
pub mod deleter;
pub mod error;
pub mod folders;
pub mod models;
pub mod scanner;

pub use auth::{BearerToken, TokenProvider, TokenStore};
pub use bridge::{Action, Orchestrator, Reply};
pub use client::{ApiClient, MailApi};
pub use config::Config;
pub use error::{CleanerError, Result};
pub use models::{DeleteResult, Folder, Message, ScanOutcome};
