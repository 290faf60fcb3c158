//! kiosk-service: local service layer for the kiosk and its remote dialer

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kiosk_service::config::{
    DialerConfig, KioskConfig, DEFAULT_DIALER_PORT, DEFAULT_HTTP_PORT, DEFAULT_RELAY_PORT,
    SEED_FILE,
};
use kiosk_service::relay::{self, AndroidIntentDialer};
use kiosk_service::service::stopped;
use kiosk_service::{seed, KioskService};

/// Kiosk content server, session persistence and dialer relay
#[derive(Parser)]
#[command(name = "kiosk-service")]
#[command(about = "Local service layer for a kiosk device", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the content/API server, the relay server and the relay client
    Serve(ServeArgs),

    /// Run the remote dialer listener (on the phone)
    Dialer(DialerArgs),

    /// Create or update the local login seed file
    Seed {
        /// Application-private data directory
        #[arg(long, env = "KIOSK_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Port for the content/API server
    #[arg(long, env = "KIOSK_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    port: u16,

    /// Address the HTTP and relay servers bind to
    #[arg(long, env = "KIOSK_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Main content root
    #[arg(long, env = "KIOSK_CONTENT_DIR", default_value = "renderer")]
    content_dir: PathBuf,

    /// Root served under /icon/
    #[arg(long, env = "KIOSK_ICON_DIR", default_value = "assets/icons")]
    icon_dir: PathBuf,

    /// Root served under /contact/
    #[arg(long, env = "KIOSK_CONTACT_DIR", default_value = "assets/contact")]
    contact_dir: PathBuf,

    /// Application-private data directory
    #[arg(long, env = "KIOSK_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Port for the fan-out relay server
    #[arg(long, env = "KIOSK_RELAY_PORT", default_value_t = DEFAULT_RELAY_PORT)]
    relay_port: u16,

    /// Remote dialer WebSocket URL (empty disables the relay client)
    #[arg(long, env = "KIOSK_DIALER_URL", default_value = "ws://192.168.1.60:5001")]
    dialer_url: String,

    /// Ports reported by the status API
    #[arg(
        long,
        env = "KIOSK_MONITORED_PORTS",
        value_delimiter = ',',
        default_value = "5000,5001,6001"
    )]
    monitored_ports: Vec<u16>,

    /// Directory holding the battery capacity and status files
    #[arg(long, env = "KIOSK_BATTERY_DIR", default_value = "/sys/class/power_supply/BAT0")]
    battery_dir: PathBuf,
}

#[derive(Args)]
struct DialerArgs {
    /// Port to listen on
    #[arg(long, env = "TERMUX_WS_PORT", default_value_t = DEFAULT_DIALER_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Heartbeat interval in milliseconds
    #[arg(long, env = "TERMUX_WS_PING_INTERVAL_MS", default_value_t = 30_000)]
    ping_interval_ms: u64,

    /// Activity-manager program used to open the dialer
    #[arg(long, default_value = "am")]
    am_program: String,
}

impl From<ServeArgs> for KioskConfig {
    fn from(args: ServeArgs) -> Self {
        let dialer_url = Some(args.dialer_url.trim().to_string()).filter(|url| !url.is_empty());
        Self {
            bind: args.bind,
            http_port: args.port,
            relay_port: args.relay_port,
            content_root: args.content_dir,
            aux_roots: vec![
                ("icon".to_string(), args.icon_dir),
                ("contact".to_string(), args.contact_dir),
            ],
            data_dir: args.data_dir,
            dialer_url,
            monitored_ports: args.monitored_ports,
            battery_dir: args.battery_dir,
            ..KioskConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => {
            serve(args.into()).await?;
        },
        Commands::Dialer(args) => {
            let config = DialerConfig {
                bind: args.bind,
                port: args.port,
                ping_interval: Duration::from_millis(args.ping_interval_ms),
            };
            dialer(config, args.am_program).await?;
        },
        Commands::Seed { data_dir } => {
            let report = seed::prepare(&data_dir.join(SEED_FILE)).await?;
            info!(
                users = report.users.len(),
                hashed = report.hashed,
                created = report.created,
                "Seed file ready"
            );
        },
    }
    Ok(())
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn termination() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    Ok(())
}

async fn serve(config: KioskConfig) -> Result<()> {
    let service = KioskService::bind(config).await?;
    let mut signal = Ok(());
    service
        .run(async {
            signal = termination().await;
        })
        .await?;
    signal
}

async fn dialer(config: DialerConfig, am_program: String) -> Result<()> {
    let listener = TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("failed to bind dialer listener on {}", config.addr()))?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(relay::listener::serve(
        listener,
        Arc::new(AndroidIntentDialer::new(am_program)),
        config.ping_interval,
        stopped(stop_rx),
    ));

    let signal = termination().await;
    info!("Shutting down");
    let _ = stop_tx.send(true);
    server.await??;
    signal
}
