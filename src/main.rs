use clap::Parser;
use colored::*;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tagmesh::cli::Cli;
use tagmesh::cluster::{ClusterHandle, LocalRuntime, MembershipReporter};
use tagmesh::{server, BootstrapResult, Bootstrapper};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Set up colored output
    if cli.no_color {
        colored::control::set_override(false);
    }

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".bright_red().bold(), e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> BootstrapResult<()> {
    let config = cli.load_config()?;
    config.validate()?;

    let bootstrapper = Bootstrapper::from_config(&config)?;
    let plan = bootstrapper.plan().await?;
    let handle = Arc::new(
        bootstrapper
            .start(plan, Arc::new(LocalRuntime::new()))
            .await?,
    );

    let reporter = MembershipReporter::new(handle.clone());
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    server::serve(reporter, config.service_port, shutdown).await?;

    handle.shutdown();
    Ok(())
}
