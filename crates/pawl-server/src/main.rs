use clap::Parser;
use pawl_server::standard_host;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "pawl-server", about = "Pawl remote condition host, protocol v1")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 7295)]
    port: u16,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let addr = format!("0.0.0.0:{}", cli.port);
    let host = Arc::new(standard_host());
    info!("starting pawl-server on {addr}");
    info!("hosting conditions: {}", host.names().join(", "));

    pawl_server::run_server(&host, &addr);
}
