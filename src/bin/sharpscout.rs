use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sharpscout::api::HttpSource;
use sharpscout::cache::TieredCache;
use sharpscout::config::{AppConfig, CONFIG_PATH};
use sharpscout::reporter;
use sharpscout::scanner::Scanner;
use sharpscout::types::{MarketSummary, SortMode};
use sharpscout::wallets::{WalletList, WalletStore};

#[derive(Parser)]
#[command(name = "sharpscout", about = "Aggregate open Polymarket positions across tracked wallets")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the tracked wallet list
    Wallets {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Run one scan and print the ranked markets
    Scan {
        #[arg(long, value_enum, default_value_t = SortMode::WagerDesc)]
        sort: SortMode,

        /// Also export positions to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print one JSON line per market instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rescan on an interval until Ctrl+C
    Watch {
        /// Seconds between refreshes (defaults to scan.refresh_interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        #[arg(long, value_enum, default_value_t = SortMode::WagerDesc)]
        sort: SortMode,

        /// Drop the TTL cache tier too on every refresh
        #[arg(long)]
        hard: bool,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    List,
    Add {
        address: String,
        #[arg(long, default_value = "")]
        label: String,
    },
    Remove {
        address: String,
    },
    /// Copy the wallet file (defaults to a dated file beside it)
    Backup {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config)?;
    let store = WalletStore::new(config.wallets.resolved_path());

    match args.command {
        Command::Wallets { action } => run_wallets(&store, action),
        Command::Scan { sort, csv, json } => {
            let wallets = store.load()?;
            let scanner = build_scanner(&config)?;
            let summaries = scan_once(&scanner, &wallets, sort).await;
            print_summaries(&summaries, wallets.len(), json);
            if let Some(path) = csv {
                reporter::export_csv(&path, &summaries)?;
                info!("Exported positions to {}", path.display());
            }
            Ok(())
        }
        Command::Watch {
            interval,
            sort,
            hard,
            json,
        } => {
            let interval = interval.unwrap_or(config.scan.refresh_interval_secs).max(1);
            let scanner = build_scanner(&config)?;
            watch(&scanner, &store, Duration::from_secs(interval), sort, hard, json).await;
            Ok(())
        }
    }
}

fn run_wallets(store: &WalletStore, action: WalletAction) -> Result<()> {
    match action {
        WalletAction::List => {
            let wallets = store.load()?;
            if wallets.is_empty() {
                println!("No wallets tracked ({})", store.path().display());
            }
            for (wallet, label) in wallets.iter().zip(wallets.display_labels()) {
                println!("{}  {label}", wallet.address);
            }
        }
        WalletAction::Add { address, label } => {
            store.add(&address, &label)?;
        }
        WalletAction::Remove { address } => {
            store.remove(&address)?;
        }
        WalletAction::Backup { out } => {
            let dest = out.unwrap_or_else(|| dated_backup_path(store.path()));
            store.backup(&dest)?;
            info!("Backed up wallets to {}", dest.display());
        }
    }
    Ok(())
}

/// `wallets.json` → `wallets_backup_20300601_120000.json` in the same directory.
fn dated_backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("wallets");
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    path.with_file_name(format!("{stem}_backup_{stamp}.json"))
}

fn build_scanner(config: &AppConfig) -> Result<Scanner> {
    let source = HttpSource::new(&config.http).context("failed to set up market source")?;
    let cache = TieredCache::new(&config.cache);
    Ok(Scanner::new(Arc::new(source), Arc::new(cache), config))
}

async fn scan_once(scanner: &Scanner, wallets: &WalletList, sort: SortMode) -> Vec<MarketSummary> {
    if wallets.is_empty() {
        warn!("No wallets tracked; add one with `sharpscout wallets add <address>`");
    }
    let today = chrono::Local::now().date_naive();
    scanner.scan(wallets, today, sort).await
}

fn print_summaries(summaries: &[MarketSummary], tracked: usize, json: bool) {
    if json {
        for summary in summaries {
            reporter::report_summary(summary);
        }
    } else {
        reporter::print_table(summaries, tracked);
    }
}

/// Refresh loop. Each cycle reloads the wallet file so edits made from
/// another shell are picked up.
async fn watch(
    scanner: &Scanner,
    store: &WalletStore,
    interval: Duration,
    sort: SortMode,
    hard: bool,
    json: bool,
) {
    info!(
        "Watching (interval: {}s, hard refresh: {hard}). Press Ctrl+C to stop.",
        interval.as_secs()
    );
    loop {
        match store.load() {
            Ok(wallets) => {
                let summaries = scan_once(scanner, &wallets, sort).await;
                print_summaries(&summaries, wallets.len(), json);
            }
            Err(e) => warn!("Failed to load wallets: {e}"),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                scanner.refresh(hard);
            }
        }
    }
}
