use clap::Parser;
use dut_monitor::config;
use dut_monitor::orchestrator::{Orchestrator, OrchestratorConfig, Target};
use dut_monitor::version;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long a signalled shutdown waits for workers to finish their analytics
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn init_logger() {
    // Use LOG_LEVEL env var (fall back to RUST_LOG)
    let filter = env::var("LOG_LEVEL")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .with_target(false)
        .init();
}

#[derive(Parser)]
#[command(name = "dut-monitor")]
#[command(about = "Polls devices over SNMP or their CLI and analyzes the results", long_about = None)]
struct Args {
    /// JSON file with the list of device profiles
    #[arg(long, env = "DUT_MONITOR_PROFILES")]
    profiles: PathBuf,

    /// Directory for per-device log files
    #[arg(long, env = "DUT_MONITOR_LOG_DIR", default_value = "logfiles")]
    log_dir: PathBuf,

    /// Delay between worker starts, in milliseconds
    #[arg(long, env = "DUT_MONITOR_STAGGER_MS", default_value_t = 1000)]
    stagger_ms: u64,

    /// Skip the per-profile environment check
    #[arg(long, default_value_t = false)]
    skip_preflight: bool,
}

#[tokio::main]
async fn main() {
    init_logger();

    let args = Args::parse();
    version::log_startup();

    let profiles = match config::load_profiles(&args.profiles) {
        Ok(profiles) => profiles,
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(2);
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(OrchestratorConfig {
        log_dir: args.log_dir,
        stagger: Duration::from_millis(args.stagger_ms),
        preflight: !args.skip_preflight,
    }));

    let runner = Arc::clone(&orchestrator);
    let run = tokio::task::spawn_blocking(move || {
        if runner.run(profiles) == 0 {
            tracing::warn!("No worker was started");
        }
        runner.join(Target::All, None);
        runner.wait_stopped(Target::All, None);
    });

    tokio::select! {
        result = run => {
            if let Err(e) = result {
                tracing::error!("Orchestrator task failed: {}", e);
                std::process::exit(1);
            }
            tracing::info!("All workers finished");
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received, stopping workers...");
            let stopper = Arc::clone(&orchestrator);
            let stopped = tokio::task::spawn_blocking(move || {
                stopper.stop_workers(Some(SHUTDOWN_GRACE))
            })
            .await
            .unwrap_or(false);
            if !stopped {
                tracing::warn!("Some workers did not stop within {:?}", SHUTDOWN_GRACE);
            }
            std::process::exit(1);
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to register Ctrl+C handler");
        tracing::info!("Received Ctrl+C");
    }
}
