//! Example: List a local directory through an in-process bridge
//!
//! Usage:
//!   cargo run --example ls -- [--path DIR]

mod cli;

use std::sync::Arc;

use cli::{file_url, init_tracing, usage_and_exit, ArgParser};
use fsbridge::{BridgeClient, CancellationToken, FileSystemProvider, NativeFs};

const USAGE: &str = "Usage: cargo run --example ls -- [--path DIR]";

#[tokio::main]
async fn main() {
    init_tracing();
    let mut parser = ArgParser::new(USAGE);
    let path = parser.take_value(&["--path", "-p"]).unwrap_or_else(|| ".".to_string());
    if !parser.remaining().is_empty() {
        usage_and_exit(USAGE);
    }
    let url = file_url(&path, USAGE);

    let (client, _host) = BridgeClient::in_process(Arc::new(NativeFs::default()), 64);

    println!("\n📁 Listing: {}\n", url);

    match client.read_directory(&url, &CancellationToken::new()).await {
        Ok(mut entries) => {
            if entries.is_empty() {
                println!("  (empty)");
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in entries {
                let type_icon = if entry.is_dir() { "📁" } else { "📄" };
                let size_str = match entry.size {
                    Some(size) if entry.is_file() => format_size(size),
                    _ => String::new(),
                };
                let link = if entry.is_symlink == Some(true) { " ->" } else { "" };
                println!("  {} {}{} {}", type_icon, entry.name, link, size_str);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to list: {}", e);
            std::process::exit(1);
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2}GB", bytes as f64 / 1_073_741_824.0)
    }
}
