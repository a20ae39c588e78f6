//! sudo-manager CLI entry point
//!
//! One short-lived invocation per UI action: the first positional argument
//! selects the operation, the optional second is the JSON payload. Exactly
//! one JSON value is printed on stdout on success; failures print a
//! structured `{error, message}` value on stderr and exit non-zero.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use sudo_manager::policy::{dispatch, ManagerConfig, OPERATIONS};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sudo-manager",
    about = "Sudoers policy compiler backend",
    after_help = "Operations:\n  \
        list                      List managed sudo rules\n  \
        catalog                   Show the approved-command catalog\n  \
        group-catalog             Show groups eligible as sudo principals\n  \
        update <rule-json>        Create or replace a user rule\n  \
        update-group <rule-json>  Create or replace a group rule\n  \
        delete '{\"user\": ...}'    Remove a user rule\n  \
        delete-group '{\"group\": ...}'  Remove a group rule\n  \
        add-alias <alias-json>    Add or replace a user-managed alias\n  \
        delete-alias '{\"type\": ..., \"name\": ...}'  Remove a user-managed alias"
)]
struct Cli {
    /// Operation to perform
    operation: String,

    /// JSON payload for operations that take one
    payload: Option<String>,

    /// Configuration file (default: /etc/sudo-manager/config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays pure JSON for the UI
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = ManagerConfig::load(cli.config.as_deref())
        .and_then(|config| dispatch(&cli.operation, cli.payload.as_deref(), &config));

    match result {
        Ok(value) => {
            println!("{:#}", value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(kind = err.kind(), "{}", err);
            if matches!(err, sudo_manager::ManagerError::Usage(_)) {
                eprintln!("{}", err);
                eprintln!("Recognized operations: {}", OPERATIONS.join(", "));
            }
            eprintln!(
                "{}",
                serde_json::json!({
                    "error": err.kind(),
                    "message": err.to_string(),
                })
            );
            ExitCode::FAILURE
        }
    }
}
