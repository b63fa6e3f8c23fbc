//! Host process: serves the local filesystem over stdin/stdout.
//!
//! Each line on stdin is one client message, each line on stdout one host
//! message. Logs go to stderr so stdout stays a clean wire.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fsbridge::channel::{json_lines, HostEndpoint};
use fsbridge::host::Host;
use fsbridge::{BridgeConfig, NativeFs};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fsbridge-host", version, about = "Serve host filesystem operations over JSON lines on stdio")]
struct Args {
    /// Poll period of the native watcher, in milliseconds
    #[arg(long, env = "FSBRIDGE_POLL_INTERVAL_MS", default_value_t = 100)]
    poll_interval_ms: u64,

    /// Use OS change notifications instead of polling
    #[arg(long, env = "FSBRIDGE_NATIVE_EVENTS")]
    native_events: bool,

    /// Bytes per read/write step
    #[arg(long, env = "FSBRIDGE_IO_CHUNK_SIZE", default_value_t = 64 * 1024)]
    io_chunk_size: usize,

    /// Concurrent stats while listing a directory
    #[arg(long, env = "FSBRIDGE_STAT_CONCURRENCY", default_value_t = 16)]
    stat_concurrency: usize,

    /// Capacity of the message queues
    #[arg(long, env = "FSBRIDGE_CHANNEL_CAPACITY", default_value_t = 256)]
    channel_capacity: usize,
}

impl Args {
    fn config(&self) -> BridgeConfig {
        BridgeConfig::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_polling(!self.native_events)
            .with_io_chunk_size(self.io_chunk_size)
            .with_stat_concurrency(self.stat_concurrency)
            .with_channel_capacity(self.channel_capacity)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    let config = args.config();
    if let Err(err) = config.validate() {
        error!(error = %err, "refusing to start");
        process::exit(2);
    }

    let endpoint: HostEndpoint =
        json_lines(tokio::io::stdin(), tokio::io::stdout(), config.channel_capacity);
    info!(polling = config.use_polling, "fsbridge host serving on stdio");

    let host = Host::new(Arc::new(NativeFs::new(config)), endpoint);
    tokio::select! {
        _ = host.run() => info!("client disconnected"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
}
