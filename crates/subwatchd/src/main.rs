// # subwatchd - Subdomain Monitoring Daemon
//
// A thin integration layer over subwatch-core:
// 1. Reading configuration from `SUBWATCH_*` environment variables
// 2. Initializing logging and the runtime
// 3. Registering sources, the resolver, stores and notifiers
// 4. Running one command against the MonitorEngine
//
// Discovery, diffing and alerting logic all live in subwatch-core.
//
// ## Commands
//
// ```bash
// subwatchd run                              # sweep every interval until SIGTERM/SIGINT
// subwatchd sweep                            # one sweep, JSON report on stdout
// subwatchd add example.com --slack          # start monitoring a domain
// subwatchd import domains.txt --telegram    # add domains from files
// subwatchd delete example.com
// subwatchd list
// subwatchd show example.com
// subwatchd check example.com                # one on-demand pass, JSON report
// subwatchd export --output subdomains.txt   # every known subdomain
// subwatchd stats
// ```
//
// See `settings.rs` for the environment variables.

mod settings;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::{
    ChannelId, DnsResolver, DomainRecord, DomainStore, EngineEvent, MonitorConfig, MonitorEngine,
    PluginRegistry,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::settings::Settings;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the scheduler may take to stop after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SubwatchExitCode> for ExitCode {
    fn from(code: SubwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl SubwatchExitCode {
    /// Configuration problems found after startup still exit with 1
    fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<subwatch_core::Error>() {
            Some(subwatch_core::Error::Config(_)) | Some(subwatch_core::Error::InvalidInput(_)) => {
                SubwatchExitCode::ConfigError
            }
            _ => SubwatchExitCode::RuntimeError,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "subwatchd", version, about = "Incremental subdomain discovery and alerting")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sweep all domains periodically until SIGTERM/SIGINT
    Run,
    /// Sweep all domains once and print the report
    Sweep,
    /// Start monitoring a domain
    Add {
        domain: String,
        #[command(flatten)]
        channels: ChannelArgs,
    },
    /// Add domains from files, one per line (`#` starts a comment)
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        channels: ChannelArgs,
    },
    /// Stop monitoring a domain
    Delete { domain: String },
    /// List monitored domains
    List,
    /// Print a domain's record as JSON
    Show { domain: String },
    /// Print totals across all domains
    Stats,
    /// Run one discovery pass for a monitored domain now
    Check { domain: String },
    /// Write every known subdomain, one per line
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct ChannelArgs {
    /// Notify via Slack
    #[arg(long)]
    slack: bool,
    /// Notify via Telegram
    #[arg(long)]
    telegram: bool,
}

impl ChannelArgs {
    fn channels(&self) -> BTreeSet<ChannelId> {
        let mut channels = BTreeSet::new();
        if self.slack {
            channels.insert(ChannelId::Slack);
        }
        if self.telegram {
            channels.insert(ChannelId::Telegram);
        }
        channels
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() {
                SubwatchExitCode::ConfigError.into()
            } else {
                SubwatchExitCode::CleanShutdown.into()
            };
        }
    };

    // Load configuration from environment
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SubwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SubwatchExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SubwatchExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SubwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_command(cli.command, settings.monitor).await {
            Ok(()) => SubwatchExitCode::CleanShutdown,
            Err(e) => {
                error!("{:#}", e);
                SubwatchExitCode::for_error(&e)
            }
        }
    });

    result.into()
}

/// Build every component from configuration and wire the engine
async fn build_engine(config: &MonitorConfig) -> Result<(MonitorEngine, mpsc::Receiver<EngineEvent>)> {
    let registry = PluginRegistry::with_builtin_stores();
    subwatch_sources::register(&registry);
    subwatch_resolver_hickory::register(&registry);
    subwatch_notify::register(&registry);

    #[cfg(feature = "postgres")]
    subwatch_store_postgres::register(&registry);

    let connectors = registry.create_sources(&config.sources)?;
    let resolver: Arc<dyn DnsResolver> = Arc::from(registry.create_resolver(&config.resolver)?);
    let store: Arc<dyn DomainStore> = Arc::from(registry.create_store(&config.store).await?);
    let notifiers = registry.create_notifiers(&config.notifiers)?;

    info!(
        sources = connectors.len(),
        store = store.store_name(),
        notifiers = notifiers.len(),
        "Components initialized"
    );

    Ok(MonitorEngine::new(connectors, resolver, store, notifiers, config)?)
}

async fn run_command(command: Command, config: MonitorConfig) -> Result<()> {
    let (engine, events) = build_engine(&config).await?;
    tokio::spawn(log_events(events));

    match command {
        Command::Run => {
            info!("Starting subwatchd scheduler");
            run_until_signal(&engine).await?;
        }
        Command::Sweep => {
            let report = engine.sweep().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Add { domain, channels } => {
            let channels = channels.channels();
            warn_unconfigured(&config, &channels);

            let report = engine.add_domain(&domain, &channels).await?;
            println!(
                "Added {} with {} subdomain(s)",
                report.domain, report.snapshot_size
            );
        }
        Command::Import { files, channels } => {
            let channels = channels.channels();
            warn_unconfigured(&config, &channels);

            let mut lines = Vec::new();
            for file in &files {
                let content = tokio::fs::read_to_string(file)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
                lines.extend(content.lines().map(str::to_string));
            }

            let report = engine.import_domains(lines, &channels).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.failed.is_empty() {
                bail!("{} domain(s) could not be imported", report.failed.len());
            }
        }
        Command::Delete { domain } => {
            engine.delete_domain(&domain).await?;
            println!("Deleted {}", domain);
        }
        Command::List => {
            for record in engine.list_domains().await? {
                let channels: Vec<&str> = record.notify_channels.iter().map(|c| c.as_str()).collect();
                println!(
                    "{}\t{}\t{}",
                    record.name,
                    record.subdomains.len(),
                    if channels.is_empty() {
                        "-".to_string()
                    } else {
                        channels.join(",")
                    }
                );
            }
        }
        Command::Show { domain } => match engine.get_domain(&domain).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => return Err(subwatch_core::Error::domain_not_found(domain).into()),
        },
        Command::Stats => {
            let stats = engine.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Check { domain } => {
            let report = engine.monitor_domain(&domain).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Export { output } => {
            let records = engine.list_domains().await?;
            let text = export_lines(&records);
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &text)
                        .await
                        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
                    info!(path = %path.display(), domains = records.len(), "Exported subdomains");
                }
                None => print!("{}", text),
            }
        }
    }

    Ok(())
}

/// Every known subdomain, one per line, grouped by domain
fn export_lines(records: &[DomainRecord]) -> String {
    records
        .iter()
        .flat_map(|record| record.subdomains.iter())
        .map(|name| format!("{}\n", name))
        .collect()
}

/// Channels requested for a domain but not configured are never notified
fn warn_unconfigured(config: &MonitorConfig, channels: &BTreeSet<ChannelId>) {
    for channel in channels {
        if !config.notifiers.iter().any(|n| n.channel() == *channel) {
            warn!(
                "{} requested but not configured; set its SUBWATCH_* variables to enable it",
                channel
            );
        }
    }
}

/// Log engine events until the engine is dropped
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::NewSubdomains { domain, names } => {
                info!(domain = %domain, count = names.len(), "New subdomains recorded");
            }
            EngineEvent::NotificationFailed {
                domain,
                channel,
                error,
            } => {
                warn!(domain = %domain, channel = %channel, "Notification failed: {}", error);
            }
            EngineEvent::DomainFailed { domain, error } => {
                warn!(domain = %domain, "Domain pass failed: {}", error);
            }
            other => debug!("Engine event: {:?}", other),
        }
    }
}

/// Run the scheduler until SIGTERM/SIGINT, then give it time to flush
async fn run_until_signal(engine: &MonitorEngine) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let run = engine.run_with_shutdown(Some(shutdown_rx));
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            result?;
        }

        signal = wait_for_shutdown_signal() => {
            info!("Received shutdown signal: {}", signal?);
            let _ = shutdown_tx.send(());

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut run).await {
                Ok(result) => result?,
                Err(_) => bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT),
            }
        }
    }

    info!("subwatchd stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_with_channels() {
        let cli = Cli::try_parse_from(["subwatchd", "add", "example.com", "--slack"]).unwrap();
        match cli.command {
            Command::Add { domain, channels } => {
                assert_eq!(domain, "example.com");
                assert_eq!(channels.channels(), [ChannelId::Slack].into());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_import_requires_a_file() {
        assert!(Cli::try_parse_from(["subwatchd", "import"]).is_err());

        let cli = Cli::try_parse_from(["subwatchd", "import", "a.txt", "b.txt", "--telegram"]).unwrap();
        assert!(matches!(cli.command, Command::Import { ref files, .. } if files.len() == 2));
    }

    #[test]
    fn test_parse_check_and_export() {
        let cli = Cli::try_parse_from(["subwatchd", "check", "example.com"]).unwrap();
        assert!(matches!(cli.command, Command::Check { ref domain } if domain == "example.com"));
        assert!(Cli::try_parse_from(["subwatchd", "check"]).is_err());

        let cli = Cli::try_parse_from(["subwatchd", "export"]).unwrap();
        assert!(matches!(cli.command, Command::Export { output: None }));

        let cli = Cli::try_parse_from(["subwatchd", "export", "--output", "subs.txt"]).unwrap();
        match cli.command {
            Command::Export { output } => assert_eq!(output, Some(PathBuf::from("subs.txt"))),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_export_lists_every_subdomain() {
        let names = |list: &[&str]| -> BTreeSet<String> { list.iter().map(|n| n.to_string()).collect() };
        let records = vec![
            DomainRecord::new("a.com", names(&["x.a.com", "w.a.com"]), BTreeSet::new()),
            DomainRecord::new("b.com", BTreeSet::new(), BTreeSet::new()),
            DomainRecord::new("c.com", names(&["m.c.com"]), BTreeSet::new()),
        ];

        assert_eq!(export_lines(&records), "w.a.com\nx.a.com\nm.c.com\n");
        assert_eq!(export_lines(&[]), "");
    }

    #[test]
    fn test_exit_code_classification() {
        let config_err = anyhow::Error::from(subwatch_core::Error::config("bad"));
        assert_eq!(SubwatchExitCode::for_error(&config_err), SubwatchExitCode::ConfigError);

        let storage_err = anyhow::Error::from(subwatch_core::Error::storage_unavailable("down"));
        assert_eq!(SubwatchExitCode::for_error(&storage_err), SubwatchExitCode::RuntimeError);

        let other = anyhow::anyhow!("Shutdown timeout");
        assert_eq!(SubwatchExitCode::for_error(&other), SubwatchExitCode::RuntimeError);
    }

    #[tokio::test]
    async fn test_engine_builds_from_default_config() {
        let (engine, _events) = build_engine(&MonitorConfig::default()).await.unwrap();
        assert!(engine.list_domains().await.unwrap().is_empty());
    }
}
