use clap::Parser;
use env_logger::TimestampPrecision;
use thiserror::Error;
use tokio::runtime::Runtime;
use tonic::Status;

use crate::{
    monitor::{GeyserMonitor, TransactionFilter},
    token_authenticator::GeyserConnectionError,
};

mod monitor;
mod token_authenticator;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Yellowstone gRPC endpoint. Any `http://`/`https://` prefix is stripped.
    #[arg(long, env)]
    endpoint: String,

    /// Access token, attached to every call as `x-token` metadata.
    #[arg(long, env)]
    x_token: String,

    /// Wallet or liquidity-pool program address to watch.
    #[arg(long, env)]
    account: String,

    /// Drop failed transactions from the stream.
    #[arg(long, env)]
    exclude_failed: bool,

    /// Drop vote transactions from the stream.
    #[arg(long, env)]
    exclude_vote: bool,
}

#[derive(Debug, Error)]
pub enum GeyserMonitorError {
    #[error("GrpcError {0}")]
    GrpcError(#[from] Status),
    #[error("ConnectionError {0}")]
    ConnectionError(#[from] GeyserConnectionError),
    #[error("IoError {0}")]
    IoError(#[from] std::io::Error),
}

fn main() -> Result<(), GeyserMonitorError> {
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Micros))
        .init();
    let args = Args::parse();

    let filter = TransactionFilter {
        address: args.account,
        exclude_failed: args.exclude_failed,
        exclude_vote: args.exclude_vote,
    };
    let monitor = GeyserMonitor::new(&args.endpoint, &args.x_token, filter)?;

    let runtime = Runtime::new()?;
    runtime.block_on(monitor.run())
}
