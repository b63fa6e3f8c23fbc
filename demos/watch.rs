//! Example: Stream changes of a local directory until Ctrl-C
//!
//! Usage:
//!   cargo run --example watch -- [--path DIR] [--exclude GLOB] [--recursive]

mod cli;

use std::sync::Arc;

use cli::{file_url, init_tracing, usage_and_exit, ArgParser};
use fsbridge::{
    BridgeClient, CancellationToken, FileChangeEvent, FileChangeType, FileSystemProvider, NativeFs, WatchOptions,
};
use tokio::sync::mpsc;

const USAGE: &str =
    "Usage: cargo run --example watch -- [--path DIR] [--exclude GLOB]... [--recursive]";

#[tokio::main]
async fn main() {
    init_tracing();
    let mut parser = ArgParser::new(USAGE);
    let path = parser.take_value(&["--path", "-p"]).unwrap_or_else(|| ".".to_string());
    let recursive = parser.take_flag(&["--recursive", "-r"]);
    let mut excludes = Vec::new();
    while let Some(pattern) = parser.take_value(&["--exclude", "-x"]) {
        excludes.push(pattern);
    }
    if !parser.remaining().is_empty() {
        usage_and_exit(USAGE);
    }
    let url = file_url(&path, USAGE);
    println!("\n👀 Watching: {}\n", url);

    let (client, _host) = BridgeClient::in_process(Arc::new(NativeFs::default()), 64);
    let cancel = CancellationToken::new();
    let (listener, mut events) = mpsc::unbounded_channel::<Vec<FileChangeEvent>>();

    let stop = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        stop.cancel();
    });

    let printer = tokio::spawn(async move {
        while let Some(batch) = events.recv().await {
            for event in batch {
                let path = event.path.unwrap_or_default();
                match event.kind {
                    FileChangeType::Created => println!("  + {}", path),
                    FileChangeType::Changed => println!("  ~ {}", path),
                    FileChangeType::Deleted => println!("  - {}", path),
                    FileChangeType::Ready => println!("--- live changes (Ctrl-C to stop) ---"),
                }
            }
        }
    });

    let options = WatchOptions {
        recursive,
        excludes,
    };
    if let Err(e) = client.watch(&url, &options, listener, &cancel).await {
        eprintln!("❌ Watch failed: {}", e);
        std::process::exit(1);
    }
    let _ = printer.await;
    println!("Watch stopped.");
}
