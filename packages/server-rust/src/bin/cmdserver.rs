//! `cmdserver` binary.
//!
//! Starts the control service and any named services, then runs until a
//! control client issues `SHUTDOWN` or the process receives Ctrl+C.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use cmdserver::{CommandServer, ControlConfig, ServerConfig, ServiceFactory};
use cmdserver_core::ServiceSpec;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-port TCP service host with a runtime control channel")]
struct Args {
    /// Control service as `password:port`
    #[arg(short, long, env = "CMDSERVER_CONTROL")]
    control: Option<ControlConfig>,

    /// Service to start as `name:port`; repeat or separate with commas
    #[arg(short = 's', long = "service", value_delimiter = ',')]
    services: Vec<ServiceSpec>,

    /// Maximum number of concurrent connections across all services
    #[arg(short, long, default_value_t = 10, env = "CMDSERVER_MAX_CONNECTIONS")]
    max_connections: usize,

    /// Address to bind every service on
    #[arg(long, default_value = "0.0.0.0", env = "CMDSERVER_HOST")]
    host: String,

    /// Where to write the process id
    #[arg(long, default_value = "/tmp/cmdServer.pid", env = "CMDSERVER_PID_FILE")]
    pid_file: PathBuf,

    /// Append logs to this file instead of stdout
    #[arg(short, long, env = "CMDSERVER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    debug: bool,
}

fn init_tracing(debug: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug, args.log_file.as_deref())?;

    if args.control.is_none() && args.services.is_empty() {
        anyhow::bail!("must start at least one service (use --control or --service)");
    }

    let config = ServerConfig {
        host: args.host,
        max_connections: args.max_connections,
        control: args.control,
        services: args.services,
        pid_file: Some(args.pid_file),
        ..ServerConfig::default()
    };

    let server = CommandServer::new(config, ServiceFactory::with_builtins());
    if let Err(e) = server.start().await {
        server.shutdown().await;
        return Err(e.into());
    }
    let ports = server.ports().await;
    info!(?ports, health = ?server.health_state(), "cmdserver running");

    tokio::select! {
        () = server.wait_for_shutdown() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("received Ctrl+C, shutting down");
            server.shutdown().await;
        }
    }

    info!(
        remaining = server.shutdown_controller().active_count(),
        "cmdserver exiting"
    );
    Ok(())
}
