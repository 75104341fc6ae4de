mod cmd;

use std::process::ExitCode;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use cmd::*;
use tracing::{error, info};
use wordtally::distributor::{self, DistributorConfig};
use wordtally::transport::Endpoint;
use wordtally::worker::{self, WorkerConfig};
use wordtally::{Result, tracer};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _ = tracer::setup_tracing(args.log_format);

    match run(args.cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cmd: Command) -> Result<()> {
    match cmd {
        Command::Distributor {
            file,
            ports,
            host,
            reduce_timeout_ms,
            rip_timeout_ms,
            format,
        } => {
            let config = DistributorConfig {
                endpoints: endpoints(&host, &ports),
                reduce_timeout: Duration::from_millis(reduce_timeout_ms),
                rip_timeout: Duration::from_millis(rip_timeout_ms),
                format,
            };
            info!(config = %serde_json::to_string(&config)?, "distributor starting");

            let document = Bytes::from(tokio::fs::read(&file).await?);
            let (tally, _report) = distributor::run(&config, document).await?;

            let rows = distributor::rank(&tally);
            distributor::write(config.format, &rows, &mut std::io::stdout().lock())?;
        }
        Command::Worker {
            ports,
            host,
            recv_timeout_ms,
        } => {
            let config = WorkerConfig {
                endpoints: endpoints(&host, &ports),
                recv_timeout: Duration::from_millis(recv_timeout_ms),
            };
            info!(config = %serde_json::to_string(&config)?, "worker starting");
            worker::run(config).await?;
        }
    }
    Ok(())
}

fn endpoints(host: &str, ports: &[u16]) -> Vec<Endpoint> {
    ports
        .iter()
        .map(|port| Endpoint::from_port(host, *port))
        .collect()
}
