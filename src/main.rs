use anyhow::Result;
use clap::Parser;
use gmail_unread_cleaner::bridge;
use gmail_unread_cleaner::cli::{self, Cli, Commands, ProgressReporter};
use gmail_unread_cleaner::client::install_crypto_provider;
use gmail_unread_cleaner::config::Config;
use gmail_unread_cleaner::error::CleanerError;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    install_crypto_provider();

    let cli = Cli::parse();

    // stdout carries command output and bridge replies, so logs go to stderr
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_unread_cleaner=debug,warn"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_unread_cleaner=warn"))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            return Err(CleanerError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }
        Config::create_example(output).await?;
        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - auth.credentials_path: OAuth2 client secret downloaded from Google Cloud");
        println!("  - scan.default_age_days: Default age of messages to clean");
        println!("  - scan.max_results: Most messages considered per scan (1-500)");
        return Ok(());
    }

    let config = cli::load_config(&cli).await?;
    let orchestrator = cli::build_orchestrator(&config).await?;

    match cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            orchestrator.authenticate(force).await?;
            println!("Successfully authenticated with Gmail API");
            println!("Session cached at: {:?}", config.auth.token_cache_path);
            Ok(())
        }

        Commands::CheckAuth => {
            if orchestrator.check_auth().await {
                println!("Authenticated");
            } else {
                println!("Not authenticated. Run `gmail-cleaner auth` to sign in.");
            }
            Ok(())
        }

        Commands::Folders => {
            let reporter = ProgressReporter::new();
            let spinner = reporter.add_spinner("Loading folders...");
            let folders = orchestrator.get_folders().await;
            spinner.finish_and_clear();
            print!("{}", cli::render_folders(&folders?));
            Ok(())
        }

        Commands::Scan {
            folder,
            before,
            no_preview,
        } => {
            let result =
                cli::clean_folder(&orchestrator, &config, &folder, before, !no_preview, false)
                    .await?;
            check_deletion(result)
        }

        Commands::Delete { folder, before, yes } => {
            let result =
                cli::clean_folder(&orchestrator, &config, &folder, before, false, yes).await?;
            check_deletion(result)
        }

        Commands::Serve => {
            let shutdown = CancellationToken::new();
            cli::cancel_on_ctrl_c(shutdown.clone());
            bridge::serve(
                orchestrator,
                tokio::io::BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                shutdown,
            )
            .await?;
            Ok(())
        }

        Commands::InitConfig { .. } => Ok(()),
    }
}

fn check_deletion(result: Option<gmail_unread_cleaner::DeleteResult>) -> Result<()> {
    match result {
        Some(result) if !result.success => anyhow::bail!(
            "Failed to delete messages: {}",
            result.error.unwrap_or_default()
        ),
        _ => Ok(()),
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(cleaner_err) = error.downcast_ref::<CleanerError>() {
        match cleaner_err {
            CleanerError::NotAuthenticated | CleanerError::AuthExpired => {
                eprintln!("\nHint: Sign in again with: gmail-cleaner auth");
            }
            CleanerError::AuthDenied(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: gmail-cleaner auth --force");
            }
            CleanerError::ApiError { .. } | CleanerError::Timeout { .. } => {
                eprintln!("\nHint: This may be a temporary API error.");
                eprintln!("      Try running the command again.");
            }
            CleanerError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-cleaner init-config --force");
            }
            _ => {}
        }
    }
}
