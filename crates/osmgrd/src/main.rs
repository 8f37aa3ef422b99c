//! OS Manager Daemon
//!
//! Main entry point for osmgrd. Discovers kernel interfaces, reconciles
//! desired configuration into the kernel and publishes applied state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use sonic_osmgrd::{
    log_outbound, pump_inbound, pump_outbound, DryRunActuator, IfAddrsEnumerator,
    InboundSource, IpCommandActuator, KernelActuator, LinkEventListener, LogFormat,
    LoggingConfig, OsMgr, OsmgrConfig, OutboundSink, ReplicationBridge, DEFAULT_CONFIG_PATH,
};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// SONiC OS manager daemon
#[derive(Parser, Debug)]
#[command(name = "osmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = OsmgrConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config.logging)?;
    info!(config = %args.config.display(), "osmgrd: Starting OS manager daemon");

    let result = run_daemon(config).await;
    match &result {
        Ok(()) => info!("osmgrd: Daemon exiting normally"),
        Err(e) => error!(error = %format!("{:#}", e), "osmgrd: Daemon exiting with error"),
    }
    result
}

/// Initialize structured logging on stderr
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level '{}'", logging.level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true)
                    .json(),
            )
            .try_init(),
    }
    .context("Failed to set logger")?;

    Ok(())
}

async fn run_daemon(config: OsmgrConfig) -> anyhow::Result<()> {
    let actuator: Arc<dyn KernelActuator> = if config.kernel.dry_run {
        warn!("osmgrd: Dry run, kernel changes will only be logged");
        Arc::new(DryRunActuator)
    } else {
        Arc::new(IpCommandActuator::new(config.kernel.ip_cmd.clone()))
    };

    let bridge = Arc::new(ReplicationBridge::new(config.replication.channel_capacity));
    let outbound_rx = bridge.subscribe();
    let agent = Arc::new(OsMgr::new(actuator, bridge.clone()));

    // Bind first so links created during enumeration are still seen
    let listener = LinkEventListener::bind(config.kernel.recv_buffer_size)
        .context("Failed to open kernel event socket")?;
    let found = agent
        .bootstrap(&IfAddrsEnumerator)
        .context("Failed to enumerate existing interfaces")?;
    info!(interfaces = found, "osmgrd: Bootstrap complete");

    let mut listener_stopped = agent.start_listener(listener)?;

    let outbound: JoinHandle<()> = match config.replication.outbound {
        OutboundSink::Log => tokio::spawn(async move {
            log_outbound(outbound_rx).await;
        }),
        OutboundSink::Stdout => tokio::spawn(async move {
            if let Err(e) = pump_outbound(outbound_rx, tokio::io::stdout()).await {
                error!(error = %e, "osmgrd: Outbound replication failed");
            }
        }),
    };
    let mut tasks = vec![outbound];
    if config.replication.inbound == InboundSource::Stdin {
        let agent = agent.clone();
        tasks.push(tokio::spawn(async move {
            match pump_inbound(BufReader::new(tokio::io::stdin()), agent).await {
                Ok(applied) => info!(applied, "osmgrd: Inbound replication finished"),
                Err(e) => error!(error = %e, "osmgrd: Inbound replication failed"),
            }
        }));
    }

    info!("osmgrd: Listening for kernel and configuration events...");

    let result = tokio::select! {
        signal = shutdown_signal() => {
            match signal {
                Ok(signal) => {
                    info!(signal, "osmgrd: Received shutdown signal");
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::new(e).context("Failed to install signal handlers")),
            }
        }
        stopped = &mut listener_stopped => match stopped {
            Ok(reason) => Err(anyhow::Error::new(reason).context("Kernel event listener failed")),
            Err(_) => Err(anyhow!("Kernel event listener exited without a reason")),
        },
    };

    for task in tasks {
        task.abort();
    }
    info!(stats = %agent.stats(), "osmgrd: Reconciliation summary");

    result
}

/// Waits for SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "SIGINT")
}
