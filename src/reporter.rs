use std::fmt::Write as _;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::types::{MarketSummary, PositionType};

/// How many tracked wallets agree on a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agreement {
    Strong,
    Shared,
}

impl Agreement {
    pub fn label(self) -> &'static str {
        match self {
            Agreement::Strong => "strong",
            Agreement::Shared => "shared",
        }
    }
}

/// Marker for a market held by `wallet_count` of `tracked` wallets. With
/// three or more tracked, three holders are strong and two are shared.
/// With exactly two tracked, both holding is shared.
pub fn agreement_tier(wallet_count: usize, tracked: usize) -> Option<Agreement> {
    match (tracked, wallet_count) {
        (t, n) if t >= 3 && n >= 3 => Some(Agreement::Strong),
        (t, 2) if t >= 2 => Some(Agreement::Shared),
        _ => None,
    }
}

/// Emit a market summary as a single JSON line to stdout.
pub fn report_summary(summary: &MarketSummary) {
    if let Ok(json) = serde_json::to_string(summary) {
        println!("{json}");
    }
}

/// Human-readable table: one header line per market, one line per wallet.
pub fn render_table(summaries: &[MarketSummary], tracked: usize) -> String {
    let mut out = String::new();
    if summaries.is_empty() {
        out.push_str("No open positions.\n");
        return out;
    }
    for summary in summaries {
        let date = summary
            .event_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "TBD".to_string());
        let marker = agreement_tier(summary.wallet_count, tracked)
            .map(|a| format!("  [{}]", a.label()))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{}  {}  {} wallet(s)  ${:.2}{}",
            summary.market_name, date, summary.wallet_count, summary.total_wager, marker
        );
        for (label, pos) in &summary.wallets {
            let kind = match pos.position_type {
                PositionType::Long => "long",
                PositionType::Short => "short",
            };
            let _ = writeln!(
                out,
                "    {label:<24} {:<16} {:>10.2} sh @ {:.4}  ${:.2}  {kind}  ({} trades)",
                pos.outcome, pos.total_shares, pos.avg_cost_per_share, pos.total_cost, pos.trade_count
            );
        }
    }
    out
}

pub fn print_table(summaries: &[MarketSummary], tracked: usize) {
    print!("{}", render_table(summaries, tracked));
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Market Name")]
    market_name: &'a str,
    #[serde(rename = "Wallet Label")]
    wallet_label: &'a str,
    #[serde(rename = "Outcome")]
    outcome: &'a str,
    #[serde(rename = "Total Shares")]
    total_shares: f64,
    #[serde(rename = "Avg Cost Per Share")]
    avg_cost_per_share: f64,
    #[serde(rename = "Total Cost")]
    total_cost: f64,
    #[serde(rename = "Trade Count")]
    trade_count: usize,
}

/// One CSV row per wallet position, markets in their ranked order.
pub fn write_csv<W: io::Write>(writer: W, summaries: &[MarketSummary]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for summary in summaries {
        for (label, pos) in &summary.wallets {
            csv.serialize(CsvRow {
                market_name: &summary.market_name,
                wallet_label: label,
                outcome: &pos.outcome,
                total_shares: pos.total_shares,
                avg_cost_per_share: pos.avg_cost_per_share,
                total_cost: pos.total_cost,
                trade_count: pos.trade_count,
            })
            .context("failed to write CSV row")?;
        }
    }
    csv.flush().context("failed to flush CSV output")?;
    Ok(())
}

pub fn export_csv(path: &Path, summaries: &[MarketSummary]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(file, summaries)
}
