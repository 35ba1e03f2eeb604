//! Probe: raw trade shape for one wallet
//!
//! Hits GET <data_api_base>/trades?user=<addr> and documents:
//! - Response envelope and record count
//! - Which key of each field chain the records actually use
//! - How many records normalize, drop, or fall back to a default side

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use sharpscout::api::{HttpSource, MarketSource};
use sharpscout::config::{AppConfig, CONFIG_PATH};
use sharpscout::normalize::{TRADE_CHAINS, normalize_all};
use sharpscout::wallets::normalize_address;

#[derive(Parser)]
#[command(name = "probe_trades", about = "Inspect the raw trade records of a wallet")]
struct Args {
    /// Wallet address to probe
    address: String,

    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Print the first raw record
    #[arg(long)]
    sample: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config)?;
    let address = normalize_address(&args.address)?;
    let source = HttpSource::new(&config.http)?;

    println!("=== Probe: trades ===");
    println!("Wallet: {address}");
    println!();

    let start = Instant::now();
    let raws = source.trades(&address, config.http.trade_limit).await?;
    println!("Fetched {} record(s) in {:?}", raws.len(), start.elapsed());
    if args.sample {
        if let Some(first) = raws.first() {
            println!("\nSample record (first):");
            println!("{}", serde_json::to_string_pretty(first)?);
        }
    }
    println!();

    println!("--- Field chain hits ---");
    for chain in TRADE_CHAINS {
        let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
        let mut missing = 0;
        for raw in &raws {
            match chain.pick(raw) {
                Some((key, _)) => *hits.entry(key).or_default() += 1,
                None => missing += 1,
            }
        }
        let hits: Vec<String> = chain
            .keys
            .iter()
            .map(|k| format!("{k}={}", hits.get(k).copied().unwrap_or(0)))
            .collect();
        println!("  {:<12} {}  missing={missing}", chain.field, hits.join(" "));
    }
    println!();

    let normalized = normalize_all(&raws, &address);
    println!("--- Normalization ---");
    println!("  Normalized:      {}", normalized.trades.len());
    println!("  Dropped:         {}", normalized.dropped);
    println!("  Defaulted sides: {}", normalized.defaulted_sides);
    let undated = normalized
        .trades
        .iter()
        .filter(|t| t.event_date.is_none())
        .count();
    println!("  Without date:    {undated}");
    println!();

    println!("=== Probe complete ===");
    Ok(())
}
