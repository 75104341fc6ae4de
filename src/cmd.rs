use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wordtally::distributor::OutputFormat;
use wordtally::tracer::LogFormat;
use wordtally::transport::HOST;

#[derive(Parser, Debug)]
#[clap(version, about = "Distributed word frequency counting")]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: Command,

    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Count the words of FILE using the workers listening on PORTS.
    Distributor {
        file: PathBuf,
        /// One port per worker endpoint. The first one also runs the reduce rounds.
        #[arg(required = true)]
        ports: Vec<u16>,
        #[arg(long, default_value = HOST)]
        host: String,
        #[arg(long, default_value_t = 5000)]
        reduce_timeout_ms: u64,
        #[arg(long, default_value_t = 1000)]
        rip_timeout_ms: u64,
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },
    /// Serve map and reduce requests on every PORT until told to stop.
    Worker {
        #[arg(required = true)]
        ports: Vec<u16>,
        #[arg(long, default_value = HOST)]
        host: String,
        #[arg(long, default_value_t = 2000)]
        recv_timeout_ms: u64,
    },
}
