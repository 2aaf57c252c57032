/// SkySync Agent Daemon - background log uploader
use clap::{Parser, Subcommand};
use skysync_agent::{ControlMessage, SyncController, TickOutcome};
use skysync_core::{AgentConfig, ControlFlags, RegistrationUpdate, StatusEvent};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "skysync-agentd")]
#[command(about = "SkySync vehicle log upload agent", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync loop
    Run {
        /// Seconds between sync cycles
        #[arg(long, default_value_t = 2)]
        interval: u64,
        /// Watch a different log directory than the configured one
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Register this vehicle with the cloud service
    Register {
        /// Account email address
        #[arg(short, long)]
        email: String,
        /// Cloud service hostname
        #[arg(long)]
        remote_host: Option<String>,
        /// Cloud service ssh port
        #[arg(long)]
        remote_port: Option<u16>,
        /// Remote ssh user
        #[arg(long)]
        remote_user: Option<String>,
        /// Private key used for the rsync transport
        #[arg(long)]
        identity_file: Option<PathBuf>,
    },
}

fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skysync")
        .join("agent.toml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skysync=info,skysync_agentd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Run { interval, log_dir } => run(cfg_path, interval, log_dir).await?,
        Commands::Register {
            email,
            remote_host,
            remote_port,
            remote_user,
            identity_file,
        } => {
            let update = RegistrationUpdate {
                email: Some(email),
                remote_host,
                remote_port,
                remote_user,
                identity_file,
            };
            register(cfg_path, update).await?;
        }
    }

    Ok(())
}

fn load_config(cfg_path: &Path) -> anyhow::Result<AgentConfig> {
    let cfg = AgentConfig::load(cfg_path)?;
    cfg.validate()?;
    std::fs::create_dir_all(&cfg.log_dir)?;
    std::fs::create_dir_all(&cfg.archive_dir)?;
    Ok(cfg)
}

async fn run(cfg_path: PathBuf, interval: u64, log_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let mut cfg = load_config(&cfg_path)?;
    if let Some(dir) = log_dir {
        std::fs::create_dir_all(&dir)?;
        cfg.log_dir = dir;
    }
    let tick_interval = Duration::from_secs(interval);

    tracing::info!("Starting SkySync agent");
    tracing::info!("Watching: {}", cfg.log_dir.display());
    tracing::info!("Service: {}", cfg.base_url());

    // Standalone operation: no autopilot or network module feeds the
    // flags, so arm state and reachability are treated as clear and
    // shutdown is the only external input.
    let (flags_tx, mut flags_rx) = watch::channel(ControlFlags::all_clear());
    let (events_tx, events_rx) = mpsc::channel::<StatusEvent>(64);

    let mut controller = SyncController::new(cfg, cfg_path, flags_rx.clone(), events_tx)?;

    tokio::spawn(shutdown_listener(flags_tx));
    tokio::spawn(print_events(events_rx));

    loop {
        if flags_rx.borrow().unload_requested {
            break;
        }

        // a refused authorization or a failed cycle backs off a little
        let backoff = tick_interval + Duration::from_secs(1);
        let pause = match controller.tick().await {
            Ok(TickOutcome::NotReady) => backoff,
            Ok(_) => tick_interval,
            Err(e) => {
                tracing::error!("Sync cycle failed: {}", e);
                backoff
            }
        };

        // wake early if a shutdown request lands mid-pause
        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            _ = flags_rx.changed() => {}
        }
    }

    tracing::info!("SkySync agent stopped");
    Ok(())
}

async fn register(cfg_path: PathBuf, update: RegistrationUpdate) -> anyhow::Result<()> {
    let cfg = load_config(&cfg_path)?;

    let (_flags_tx, flags_rx) = watch::channel(ControlFlags::all_clear());
    let (events_tx, mut events_rx) = mpsc::channel::<StatusEvent>(64);

    let mut controller = SyncController::new(cfg, cfg_path, flags_rx, events_tx)?;
    controller
        .handle_message(ControlMessage::Register(update))
        .await?;

    while let Ok(event) = events_rx.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

/// Flip the unload flag on SIGINT or SIGTERM.
async fn shutdown_listener(flags_tx: watch::Sender<ControlFlags>) {
    use tokio::signal::unix::{signal, SignalKind};

    let term = async {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("Cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = term => {}
    }

    tracing::info!("Shutdown requested");
    flags_tx.send_modify(|flags| flags.unload_requested = true);
}

/// Emit status events as JSON lines for whatever is supervising us.
async fn print_events(mut events_rx: mpsc::Receiver<StatusEvent>) {
    while let Some(event) = events_rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Cannot serialize status event: {}", e),
        }
    }
}
