// Single positional argument: a path to a TOML config file. No flags,
// no subcommands — `clap` is not part of the workspace's dependency
// stack and a one-argument CLI does not need it.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);

    if let Err(e) = coordinator::run(config_path).await {
        tracing::error!(error = %e, critical = e.is_critical(), "coordinator halted");
        std::process::exit(1);
    }
}
