// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! NVR fleet monitoring and alerting engine.
//!
//! Usage:
//!   nvr-monitor run                                                  --config config.toml
//!   nvr-monitor report --camera-id 1 --from <ts> --to <ts>           --config config.toml
//!   nvr-monitor test-mail     [--subject "..."]                      --config config.toml
//!   nvr-monitor test-telegram [--message "..."]                      --config config.toml
//!
//! Timestamps for `report` use the `YYYY-MM-DDTHH:MM:SS` format, local to
//! the machine the engine runs on; calendar localization of displayed
//! timestamps beyond that is left to the (external) admin surface.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nvr_monitor::config::Config;
use nvr_monitor::dispatcher;
use nvr_monitor::engine::Engine;
use nvr_monitor::error::{MonitorError, Result};
use nvr_monitor::models::LogType;
use nvr_monitor::settings::EngineSettings;
use nvr_monitor::store::sqlite::SqliteRepository;
use nvr_monitor::store::Repository;

#[derive(Parser)]
#[command(name = "nvr-monitor", about = "NVR fleet monitoring and alerting engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic polling/reconciliation/alerting loop until interrupted.
    Run {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Report total downtime minutes for one camera over `[from, to]`.
    Report {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[arg(long)]
        camera_id: i64,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Send a one-shot test email, bypassing `MAIL_ENABLED`.
    TestMail {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, default_value = "NVR Monitor test email")]
        subject: String,
    },
    /// Send a one-shot test Telegram message, bypassing `TELEGRAM_ENABLED`.
    TestTelegram {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, default_value = "NVR Monitor test message")]
        message: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { config } => run_engine(config).await,
        Command::Report { config, camera_id, from, to } => run_report(config, camera_id, &from, &to),
        Command::TestMail { config, subject } => run_test_mail(config, &subject),
        Command::TestTelegram { config, message } => run_test_telegram(config, &message).await,
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

fn open_repo(config_path: &std::path::Path) -> Result<(Config, SqliteRepository)> {
    let cfg = Config::from_file(config_path)?;
    let repo = SqliteRepository::open(&cfg.store.database_path)?;
    repo.init()?;
    Ok((cfg, repo))
}

async fn run_engine(config_path: PathBuf) -> Result<()> {
    let (cfg, repo) = open_repo(&config_path)?;
    let repo: Arc<dyn Repository> = Arc::new(repo);

    info!(db = ?cfg.store.database_path, names = ?cfg.names.csv_path, "starting nvr-monitor engine");

    let engine = Engine::new(repo, cfg.names.csv_path.clone(), cfg.engine.clone());
    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, shutting down engine");
            cancel_for_signal.cancel();
        }
    });

    engine.run(cancel).await;
    Ok(())
}

fn run_report(config_path: PathBuf, camera_id: i64, from: &str, to: &str) -> Result<()> {
    let (_cfg, repo) = open_repo(&config_path)?;

    let from = parse_local_timestamp(from)?;
    let to = parse_local_timestamp(to)?;

    let minutes = repo.downtime_overlap_minutes(camera_id, from, to)?;
    println!("Camera {camera_id} was offline for {minutes} minute(s) between {from} and {to}");
    Ok(())
}

fn parse_local_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| MonitorError::Config(format!("invalid timestamp '{s}', expected YYYY-MM-DDTHH:MM:SS: {e}")))
}

fn run_test_mail(config_path: PathBuf, subject: &str) -> Result<()> {
    let (_cfg, repo) = open_repo(&config_path)?;
    let settings = EngineSettings::parse(&repo.get_settings()?);
    let body = "<h3>NVR Monitor test email</h3><p>If you can read this, the MAIL_* settings are configured correctly.</p>";

    match dispatcher::test_email(&settings, subject, body) {
        Ok(()) => {
            println!("Test email sent.");
            repo.append_log(LogType::Mail, "Sent", "Test email")?;
            Ok(())
        }
        Err(reason) => {
            eprintln!("Test email failed: {reason}");
            repo.append_log(LogType::Mail, "Failed", &reason)?;
            Err(MonitorError::Mail(reason))
        }
    }
}

async fn run_test_telegram(config_path: PathBuf, message: &str) -> Result<()> {
    let (cfg, repo) = open_repo(&config_path)?;
    let settings = EngineSettings::parse(&repo.get_settings()?);
    let http = dispatcher::build_telegram_client(settings.telegram_proxy.as_deref());
    let timeout = std::time::Duration::from_secs(cfg.engine.telegram_timeout_secs);

    match dispatcher::test_telegram(&http, &settings, timeout, message).await {
        Ok(()) => {
            println!("Test message sent.");
            repo.append_log(LogType::Telegram, "Sent", "Test message")?;
            Ok(())
        }
        Err(reason) => {
            eprintln!("Test message failed: {reason}");
            repo.append_log(LogType::Telegram, "Failed", &reason)?;
            Err(MonitorError::Telegram(reason))
        }
    }
}
