//! PostgreSQL Restore Tool
//!
//! Restores a custom-format backup into a new database and applies the
//! post-restore SQL scripts.

// dbrestore/src/main.rs
mod config;
mod errors;
mod restore;

use anyhow::{Context, Result};
use clap::Parser;
use config::{DEFAULT_SETTINGS_FILE, Settings};
use dialoguer::Password;
use restore::{ConsoleSink, RunOutcome, ScriptSkip};
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code for a run that stopped early without touching the server.
const EXIT_ABORTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "dbrestore",
    version,
    about = "Restore a PostgreSQL backup into a new database and run post-restore SQL scripts"
)]
struct Cli {
    /// Settings file remembered between runs
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Custom-format backup file to restore
    #[arg(long)]
    backup_file: Option<String>,

    /// Folder with *.sql scripts to run after the restore
    #[arg(long)]
    scripts_folder: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    username: Option<String>,

    /// Name of the database to create and restore into
    #[arg(long)]
    database: Option<String>,

    /// Path to the pg_restore executable
    #[arg(long)]
    pg_restore_path: Option<String>,

    /// Server password; prompted for when not given
    #[arg(long, env = "DBRESTORE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Do not write the settings file on exit
    #[arg(long)]
    no_save: bool,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut Settings) {
        let overrides = [
            (&self.backup_file, &mut settings.backup_file),
            (&self.scripts_folder, &mut settings.scripts_folder),
            (&self.host, &mut settings.host),
            (&self.port, &mut settings.port),
            (&self.username, &mut settings.username),
            (&self.database, &mut settings.database),
            (&self.pg_restore_path, &mut settings.pg_restore_path),
        ];
        for (value, field) in overrides {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main entry point for the restore tool
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run_app().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = Settings::load_or_default(&cli.settings);
    for warning in &loaded.warnings {
        tracing::warn!(%warning, "settings problem");
        eprintln!("⚠️ Settings: {}", warning);
    }
    let mut settings = loaded.settings;
    cli.apply_overrides(&mut settings);

    let password = match &cli.password {
        Some(password) => password.clone(),
        None => prompt_password(&settings.username)?,
    };
    let request = settings.to_request(SecretString::new(password));

    let outcome = restore::run_restore_flow(request, ConsoleSink).await?;

    if !cli.no_save {
        if let Err(e) = settings.save(&cli.settings) {
            eprintln!("⚠️ Failed to save settings: {:#}", e);
        }
    }

    Ok(match outcome {
        RunOutcome::Completed(summary) => {
            match &summary.skipped {
                Some(ScriptSkip::FolderMissing(folder)) => {
                    println!("ℹ️ No scripts were run: folder {} not found", folder.display())
                }
                Some(ScriptSkip::NoScripts(folder)) => {
                    println!("ℹ️ No scripts were run: no *.sql files in {}", folder.display())
                }
                None => {}
            }
            if summary.failed.is_empty() {
                println!("✅ Restore completed successfully.");
            } else {
                println!(
                    "⚠️ Restore completed; {} of {} scripts failed: {}",
                    summary.failed.len(),
                    summary.discovered,
                    summary
                        .failed
                        .iter()
                        .map(|(name, _)| name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            ExitCode::SUCCESS
        }
        RunOutcome::Aborted(reason) => {
            println!("ℹ️ Restore not started: {}", reason);
            ExitCode::from(EXIT_ABORTED)
        }
        RunOutcome::Failed(message) => {
            eprintln!("❌ Restore failed: {}", message);
            ExitCode::FAILURE
        }
    })
}

/// Asks for the server password on the terminal without echoing it.
fn prompt_password(username: &str) -> Result<String> {
    Password::new()
        .with_prompt(password_prompt(username))
        .allow_empty_password(true)
        .interact()
        .context("Failed to read password")
}

fn password_prompt(username: &str) -> String {
    format!("Password for user '{}'", username)
}
