//! Daemon entrypoint: parses CLI flags, brings up logging, and runs the
//! session supervisor until a shutdown signal arrives.

use clap::{Parser, Subcommand};
use tracing::{error, info};

use watchd::config::Config;
use watchd::supervisor::SessionSupervisor;

#[derive(Parser, Debug)]
#[command(name = "watchd", about = "Runs commands under a PTY, watches their output, and notifies on trouble")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print version and exit.
    #[arg(long, short = 'V')]
    version: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground (the default when no subcommand is given).
    Run,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("watchd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run())
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();

    if let Err(e) = watchd::logging::init(&config.log_file) {
        eprintln!("failed to initialize logging: {e}");
    }

    info!(socket = %config.socket_path, ntfy_url = %config.ntfy_url, "watchd starting");

    let supervisor = SessionSupervisor::new(&config);
    if let Err(e) = supervisor.run().await {
        error!(error = %e, "supervisor exited with error");
        return Err(e);
    }

    Ok(())
}
