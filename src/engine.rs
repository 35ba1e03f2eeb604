use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use tracing::debug;

use crate::types::{
    CanonicalTrade, MarketInfo, MarketSummary, Position, PositionType, Side, SortMode,
    UNKNOWN_MARKET, WalletTrades,
};

/// Net share counts below this are a closed position.
pub const FLAT_EPSILON: f64 = 1e-4;

/// Fold one wallet's trades in one market outcome into a net position.
///
/// Buys add size and `size * price`; sells subtract both, so a round trip
/// reduces the cost basis instead of booking a second leg. Returns `None` for
/// an empty or flat (`|net| < FLAT_EPSILON`) position. Trades with a
/// non-positive size or price are skipped entirely.
///
/// `avg_cost_per_share` is the ratio of the signed sums and can be negative
/// when sells were priced above buys. It is a display figure, not P&L.
pub fn aggregate_position<'a, I>(trades: I) -> Option<Position>
where
    I: IntoIterator<Item = &'a CanonicalTrade>,
{
    let mut net_shares = 0.0;
    let mut net_cost = 0.0;
    let mut trade_count = 0;
    let mut outcomes = BTreeSet::new();

    for trade in trades.into_iter().filter(|t| t.is_valid()) {
        let notional = trade.size * trade.price;
        match trade.side {
            Side::Buy => {
                net_shares += trade.size;
                net_cost += notional;
            }
            Side::Sell => {
                net_shares -= trade.size;
                net_cost -= notional;
            }
        }
        outcomes.insert(trade.outcome.as_str());
        trade_count += 1;
    }

    if trade_count == 0 || net_shares.abs() < FLAT_EPSILON {
        return None;
    }

    Some(Position {
        outcome: outcomes.into_iter().collect::<Vec<_>>().join(", "),
        total_shares: net_shares.abs(),
        avg_cost_per_share: net_cost / net_shares,
        total_cost: net_cost.abs(),
        position_type: if net_shares > 0.0 {
            PositionType::Long
        } else {
            PositionType::Short
        },
        trade_count,
    })
}

/// Pick the outcome with the largest total cost. Exact ties keep the outcome
/// that sorts first.
pub fn dominant_position(by_outcome: BTreeMap<String, Position>) -> Option<Position> {
    by_outcome.into_values().fold(None, |best, pos| match best {
        Some(b) if b.total_cost >= pos.total_cost => Some(b),
        _ => Some(pos),
    })
}

/// Display name for the market a trade belongs to.
fn market_name(trade: &CanonicalTrade, markets: &HashMap<String, MarketInfo>) -> String {
    if let Some(name) = &trade.market_name {
        return name.clone();
    }
    if trade.market_id.is_empty() {
        return UNKNOWN_MARKET.to_string();
    }
    markets
        .get(&trade.market_id)
        .map(|info| info.name.clone())
        .unwrap_or_else(|| trade.market_id.clone())
}

#[derive(Default)]
struct MarketAcc {
    condition_ids: BTreeSet<String>,
    event_date: Option<NaiveDate>,
    wallets: BTreeMap<String, Position>,
}

/// Merge every wallet's trades into ranked per-market summaries.
///
/// Trades are grouped by (market name, outcome) and aggregated; each wallet
/// keeps its dominant outcome per market. A market is dropped when any of
/// its condition ids resolved. Ids absent from `markets` count as live.
pub fn assemble(
    wallets: &[WalletTrades],
    markets: &HashMap<String, MarketInfo>,
    sort: SortMode,
) -> Vec<MarketSummary> {
    let mut by_market: BTreeMap<String, MarketAcc> = BTreeMap::new();

    for wallet in wallets {
        let mut groups: BTreeMap<String, BTreeMap<&str, Vec<&CanonicalTrade>>> = BTreeMap::new();
        for trade in &wallet.trades {
            groups
                .entry(market_name(trade, markets))
                .or_default()
                .entry(trade.outcome.as_str())
                .or_default()
                .push(trade);
        }

        for (name, outcomes) in groups {
            let positions: BTreeMap<String, Position> = outcomes
                .iter()
                .filter_map(|(outcome, trades)| {
                    aggregate_position(trades.iter().copied())
                        .map(|pos| (outcome.to_string(), pos))
                })
                .collect();
            let Some(best) = dominant_position(positions) else {
                continue;
            };

            let acc = by_market.entry(name).or_default();
            for trade in outcomes.values().flatten() {
                if !trade.market_id.is_empty() {
                    acc.condition_ids.insert(trade.market_id.clone());
                }
                if let Some(date) = trade.event_date {
                    acc.event_date = Some(acc.event_date.map_or(date, |d| d.min(date)));
                }
            }
            acc.wallets.insert(wallet.label.clone(), best);
        }
    }

    let mut summaries: Vec<MarketSummary> = by_market
        .into_iter()
        .filter(|(name, acc)| {
            let resolved = acc
                .condition_ids
                .iter()
                .filter_map(|id| markets.get(id))
                .find(|info| info.resolved);
            if let Some(info) = resolved {
                debug!(
                    "Dropping resolved market \"{name}\" ({}): {:?}",
                    info.condition_id, info.signal
                );
            }
            resolved.is_none()
        })
        .map(|(market_name, acc)| MarketSummary {
            total_wager: acc.wallets.values().map(|p| p.total_cost).sum(),
            wallet_count: acc.wallets.len(),
            market_name,
            condition_ids: acc.condition_ids,
            event_date: acc.event_date,
            wallets: acc.wallets,
        })
        .collect();

    sort_markets(&mut summaries, sort);
    summaries
}

fn by_name(a: &MarketSummary, b: &MarketSummary) -> Ordering {
    a.market_name.cmp(&b.market_name)
}

/// Order summaries in place. Every mode falls back to market name A–Z.
pub fn sort_markets(markets: &mut [MarketSummary], sort: SortMode) {
    match sort {
        SortMode::WagerDesc => markets.sort_by(|a, b| {
            b.total_wager
                .total_cmp(&a.total_wager)
                .then_with(|| by_name(a, b))
        }),
        SortMode::WagerAsc => markets.sort_by(|a, b| {
            a.total_wager
                .total_cmp(&b.total_wager)
                .then_with(|| by_name(a, b))
        }),
        SortMode::MostWallets => markets.sort_by(|a, b| {
            b.wallet_count
                .cmp(&a.wallet_count)
                .then_with(|| by_name(a, b))
        }),
        SortMode::Name => markets.sort_by(by_name),
    }
}
