//! dispatch-server
//!
//! Serves static files and the diagnostic routes from a configurable
//! worker pool. Applications embed the library to register their own
//! handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dispatch_server::config::watcher::apply_updates;
use dispatch_server::config::{load_config, validate_config, ConfigWatcher, ServerConfig};
use dispatch_server::lifecycle::signals::shutdown_signal;
use dispatch_server::observability::{logging, metrics};
use dispatch_server::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "dispatch-server", version, about = "Pattern-routed HTTP server")]
struct Cli {
    /// TOML configuration file. Watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plain HTTP port, overriding the file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Worker count, overriding the file.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Verbose logging and diagnostic routes.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("dispatch-server: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(workers) = cli.workers {
        config.workers.count = workers;
    }
    config.debug |= cli.debug;

    if let Err(errors) = validate_config(&config) {
        for error in errors {
            eprintln!("dispatch-server: {error}");
        }
        return ExitCode::FAILURE;
    }

    logging::init_logging(&config.observability, config.debug);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.count)
        .thread_name("dispatch-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config, cli.config))
}

async fn run(config: ServerConfig, config_path: Option<PathBuf>) -> ExitCode {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dispatch-server starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                error = %e,
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config);

    // Keep the watcher alive for the life of the server.
    let _watcher = config_path.and_then(|path| {
        let (watcher, updates) = ConfigWatcher::new(&path);
        match watcher.run() {
            Ok(handle) => {
                tokio::spawn(apply_updates(updates, server.context().clone()));
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config hot reload unavailable");
                None
            }
        }
    });

    match server.run_until(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            eprintln!("dispatch-server: {e}");
            ExitCode::FAILURE
        }
    }
}
