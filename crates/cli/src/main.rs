use clap::Parser;
use dns_forward_domain::CliOverrides;
use dns_forward_infrastructure::{DnsServerHandler, ProxyPool};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod bootstrap;
mod server;

#[derive(Parser)]
#[command(name = "dns-forward")]
#[command(version)]
#[command(about = "DNS forwarder with upstream health checking and failover")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS server port
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        dns_port: cli.dns_port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level.clone(),
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;
    bootstrap::init_logging(&config);

    info!("Starting dns-forward v{}", env!("CARGO_PKG_VERSION"));

    let forward_config = config.forward_config()?;
    let pool = Arc::new(ProxyPool::from_config(&forward_config).await?);
    let handler = DnsServerHandler::new(Arc::clone(&pool));

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(server::start_dns_server(
        config.server.listen_addr(),
        handler,
        shutdown.clone(),
    ));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        result = server => {
            match result {
                Ok(Err(e)) => error!(error = %e, "DNS server error"),
                Err(e) => error!(error = %e, "DNS server task failed"),
                Ok(Ok(())) => {}
            }
        }
    }

    shutdown.cancel();
    pool.close();

    info!("Server shutdown complete");
    Ok(())
}
