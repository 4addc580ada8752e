//! Data stream tail
//!
//! Connects to a sequencer stream server, replays the log from a given entry
//! and keeps following live commits, logging every decoded record.

use anyhow::Result;
use clap::Parser;
use datastream::StreamClient;
use sequencer::telemetry::init_tracing;

mod record;

use record::Record;

/// Follow a sequencer data stream
#[derive(Parser, Debug)]
#[command(name = "ds-tail")]
#[command(about = "Follow a sequencer data stream and log decoded records", long_about = None)]
struct Args {
    /// Stream server address
    #[arg(long, default_value = "127.0.0.1:6900")]
    server: String,

    /// First entry to receive
    #[arg(long, default_value = "0")]
    from: u64,

    /// Stop after this many entries (0 = follow forever)
    #[arg(long, default_value = "0")]
    limit: u64,

    /// Print each record as a JSON line instead of logging it
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    tracing::info!("Following data stream at {} from entry {}", args.server, args.from);
    let mut client = StreamClient::connect(&args.server, args.from).await?;

    let mut received = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            item = client.recv() => {
                let Some(item) = item else {
                    tracing::warn!("Stream connection closed");
                    break;
                };
                let entry = item?;
                let record = Record::decode(&entry)?;
                if args.json {
                    println!("{}", serde_json::json!({ "id": entry.id, "record": record }));
                } else {
                    record.log(entry.id);
                }

                received += 1;
                if args.limit != 0 && received >= args.limit {
                    break;
                }
            }
        }
    }

    tracing::info!("Received {} entries", received);
    Ok(())
}
