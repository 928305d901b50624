use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use log::{error, info, warn};

use ctlsync::config::AppConfig;
use ctlsync::error::{ConfigError, Error, TransportError};
use ctlsync::orchestrator::{Orchestrator, RunReport};
use ctlsync::platform::sros;
use ctlsync::store::{DiscardSet, FileTranscript, Inventory, JsonReportWriter, TierSelection};
use ctlsync::transport::Credentials;
use ctlsync::{Profile, Result};

#[derive(Parser)]
#[command(name = "ctlsync")]
#[command(version, about = "Inspect SR OS controller cards and synchronize the standby CPM.")]
#[command(group(ArgGroup::new("selection").required(true).args(["tier", "all"])))]
struct CommandLine {
    /// Configuration file
    #[arg(short, long, default_value = "ctlsync.json")]
    config: PathBuf,

    /// Login name on the jump host and the devices
    #[arg(short, long)]
    user: String,

    /// Process one tier of the inventory
    #[arg(short, long)]
    tier: Option<String>,

    /// Process every tier
    #[arg(long)]
    all: bool,

    /// Environment variable holding the password; read from stdin when unset
    #[arg(long, default_value = "CTLSYNC_PASSWORD")]
    password_env: String,

    /// Override max_concurrent from the configuration
    #[arg(long)]
    concurrency: Option<usize>,
}

impl CommandLine {
    fn selection(&self) -> TierSelection {
        match &self.tier {
            Some(tier) if !self.all => TierSelection::Named(tier.trim().to_uppercase()),
            _ => TierSelection::All,
        }
    }
}

fn read_password(variable: &str) -> Result<String> {
    if let Ok(password) = std::env::var(variable) {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        let password =
            rpassword::prompt_password("Password: ").map_err(|_| ConfigError::MissingPassword)?;
        if password.is_empty() {
            return Err(ConfigError::MissingPassword.into());
        }
        return Ok(password);
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|_| ConfigError::MissingPassword)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(ConfigError::MissingPassword.into());
    }
    Ok(password.to_string())
}

async fn run(cli: CommandLine) -> Result<RunReport> {
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(limit) = cli.concurrency {
        config.max_concurrent = limit;
        config.validate()?;
    }

    let selection = cli.selection();
    let devices = Inventory::load(&config.inventory)?.select(&selection)?;
    info!("{} devices selected from {}", devices.len(), selection);

    let credentials = Credentials::new(cli.user.clone(), read_password(&cli.password_env)?);
    let password = Arc::clone(&credentials.password);

    let orchestrator = Orchestrator::new(
        Arc::new(config.connector(credentials)),
        Arc::new(Profile::new(sros::platform())?),
        password,
        Arc::new(DiscardSet::load(&config.discard_set)),
    )?
    .with_settings(config.run_settings())
    .with_inspection_transcript(Arc::new(FileTranscript::open(&config.inspection_transcript)?))
    .with_maintenance_transcript(Arc::new(FileTranscript::open(&config.maintenance_transcript)?))
    .with_report_sink(Arc::new(JsonReportWriter::new(&config.report_dir)));

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing devices already in progress");
            stop.stop();
        }
    });

    orchestrator.run(devices, selection.label()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = CommandLine::parse();
    match run(cli).await {
        Ok(report) => {
            println!("{}", report.summary);
            for failure in &report.failures {
                println!(
                    "  {} ({}): {} {}",
                    failure.name, failure.address, failure.status, failure.error
                );
            }
            if report.stopped || report.summary.failed > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e @ Error::Transport(TransportError::JumpHostUnreachable { .. })) => {
            error!("{}", e);
            ExitCode::from(3)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
