use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome literal used when a trade carries no outcome name.
pub const UNKNOWN_OUTCOME: &str = "Unknown";

/// Market name used when neither the trade nor any metadata source names it.
pub const UNKNOWN_MARKET: &str = "Unknown Market";

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Where a trade's side came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideSource {
    /// Matched the side vocabulary.
    Explicit,
    /// No usable side; the maker flag was set.
    MakerFlag,
    /// Nothing to go on; assumed Buy.
    Default,
}

/// A trade record after field-chain normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTrade {
    pub wallet: String,
    /// Condition id; empty when the record had none.
    pub market_id: String,
    pub market_name: Option<String>,
    pub outcome: String,
    pub side: Side,
    pub side_source: SideSource,
    pub size: f64,
    pub price: f64,
    pub event_date: Option<NaiveDate>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CanonicalTrade {
    /// `size > 0 && price > 0`. Anything else carries no aggregation signal.
    pub fn is_valid(&self) -> bool {
        self.size.is_finite() && self.price.is_finite() && self.size > 0.0 && self.price > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionType {
    Long,
    Short,
}

/// A wallet's net holding in one outcome of one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub outcome: String,
    pub total_shares: f64,
    pub avg_cost_per_share: f64,
    pub total_cost: f64,
    pub position_type: PositionType,
    pub trade_count: usize,
}

/// Why a market was judged resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSignal {
    /// `closed`, `archived` or `acceptingOrders == false` on a metadata record.
    ExplicitFlag { flag: String },
    /// An outcome priced at or beyond the extremity threshold.
    ExtremePrice { outcome: String, price: f64 },
}

/// Resolved metadata for one condition id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub condition_id: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub prices: BTreeMap<String, f64>,
    pub resolved: bool,
    pub signal: Option<ResolutionSignal>,
}

impl MarketInfo {
    /// Sentinel for a missing id: unknown liveness counts as live.
    pub fn unknown() -> Self {
        Self {
            condition_id: String::new(),
            name: UNKNOWN_MARKET.to_string(),
            date: None,
            prices: BTreeMap::new(),
            resolved: false,
            signal: None,
        }
    }
}

/// One tracked wallet's live trades, keyed for display by its label.
#[derive(Debug, Clone)]
pub struct WalletTrades {
    pub label: String,
    pub trades: Vec<CanonicalTrade>,
}

/// Per-market view across all tracked wallets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market_name: String,
    pub condition_ids: BTreeSet<String>,
    pub event_date: Option<NaiveDate>,
    /// Wallet label → that wallet's dominant position in this market.
    pub wallets: BTreeMap<String, Position>,
    pub wallet_count: usize,
    pub total_wager: f64,
}

/// Ordering applied to the assembled market list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    /// Total wager, high to low.
    #[default]
    WagerDesc,
    /// Total wager, low to high.
    WagerAsc,
    /// Number of tracked wallets holding a position, high to low.
    MostWallets,
    /// Market name A–Z.
    Name,
}
