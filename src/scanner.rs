use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::{FutureExt, StreamExt, stream};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::MarketSource;
use crate::cache::{CacheKey, CacheValue, LookupCache};
use crate::config::AppConfig;
use crate::engine::assemble;
use crate::normalize::{is_live_event, normalize_all};
use crate::resolver::MarketResolver;
use crate::types::{CanonicalTrade, MarketInfo, MarketSummary, SortMode, WalletTrades};
use crate::wallets::{Wallet, WalletList};

/// One refresh pipeline: fetch and normalize each wallet's trades, resolve
/// every market they touch, drop past events, assemble ranked summaries.
pub struct Scanner {
    source: Arc<dyn MarketSource>,
    cache: Arc<dyn LookupCache>,
    resolver: MarketResolver,
    trade_limit: usize,
    max_concurrency: usize,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn MarketSource>,
        cache: Arc<dyn LookupCache>,
        config: &AppConfig,
    ) -> Self {
        let resolver = MarketResolver::new(
            source.clone(),
            cache.clone(),
            config.scan.extreme_price_threshold,
        );
        Self {
            source,
            cache,
            resolver,
            trade_limit: config.http.trade_limit,
            max_concurrency: config.scan.max_concurrency.max(1),
        }
    }

    /// User refresh: forget the per-cycle memo. With `hard`, the TTL tier too.
    pub fn refresh(&self, hard: bool) {
        if hard {
            self.cache.invalidate_all();
        } else {
            self.cache.invalidate_session();
        }
    }

    /// Raw trade page for a wallet, through the cache. Failures give an
    /// empty page that is not cached.
    async fn raw_trades(&self, address: &str) -> Arc<Vec<Value>> {
        let key = CacheKey::Trades(address.to_string());
        let fetch = async {
            match self.source.trades(address, self.trade_limit).await {
                Ok(trades) => Some(CacheValue::Trades(Arc::new(trades))),
                Err(e) => {
                    warn!("Failed to fetch trades for {address}: {e:#}");
                    None
                }
            }
        }
        .boxed();
        match self.cache.get_or_fetch(key, fetch).await {
            Some(CacheValue::Trades(trades)) => trades,
            _ => Arc::new(Vec::new()),
        }
    }

    async fn wallet_trades(&self, wallet: &Wallet) -> Vec<CanonicalTrade> {
        let raws = self.raw_trades(&wallet.address).await;
        let normalized = normalize_all(&raws, &wallet.address);
        debug!(
            "{}: {} trade(s) normalized, {} dropped, {} with defaulted side",
            wallet.display_label(),
            normalized.trades.len(),
            normalized.dropped,
            normalized.defaulted_sides
        );
        normalized.trades
    }

    /// Run the pipeline for `wallets` as of `today`.
    pub async fn scan(
        &self,
        wallets: &WalletList,
        today: NaiveDate,
        sort: SortMode,
    ) -> Vec<MarketSummary> {
        let labels = wallets.display_labels();
        let per_wallet: Vec<Vec<CanonicalTrade>> = stream::iter(wallets.iter())
            .map(|wallet| self.wallet_trades(wallet))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let market_ids: BTreeSet<&str> = per_wallet
            .iter()
            .flatten()
            .map(|t| t.market_id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        let markets: HashMap<String, MarketInfo> = stream::iter(market_ids)
            .map(|id| async move { (id.to_string(), self.resolver.resolve(id).await) })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut live_trades = 0;
        let wallet_trades: Vec<WalletTrades> = labels
            .into_iter()
            .zip(&per_wallet)
            .map(|(label, trades)| {
                let trades: Vec<CanonicalTrade> = trades
                    .iter()
                    .map(|t| enrich(t, &markets))
                    .filter(|t| is_live_event(t.event_date, today))
                    .collect();
                live_trades += trades.len();
                WalletTrades { label, trades }
            })
            .collect();

        let summaries = assemble(&wallet_trades, &markets, sort);
        info!(
            "Scanned {} wallet(s): {} live trade(s), {} market(s) resolved, {} open market(s)",
            wallets.len(),
            live_trades,
            markets.len(),
            summaries.len()
        );
        summaries
    }
}

/// Fill a missing market name or event date from resolved metadata.
fn enrich(trade: &CanonicalTrade, markets: &HashMap<String, MarketInfo>) -> CanonicalTrade {
    let mut trade = trade.clone();
    if let Some(info) = markets.get(&trade.market_id) {
        if trade.market_name.is_none() {
            trade.market_name = Some(info.name.clone());
        }
        if trade.event_date.is_none() {
            trade.event_date = info.date;
        }
    }
    trade
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use crate::api::MetadataSource;
    use crate::cache::TieredCache;
    use crate::testing::FakeSource;
    use crate::types::PositionType;

    const W1: &str = "0x1111111111111111111111111111111111111111";
    const W2: &str = "0x2222222222222222222222222222222222222222";

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()
    }

    fn scanner(source: FakeSource) -> (Scanner, Arc<FakeSource>) {
        let source = Arc::new(source);
        let config = AppConfig::default();
        let cache = Arc::new(TieredCache::new(&config.cache));
        (Scanner::new(source.clone(), cache, &config), source)
    }

    fn wallets() -> WalletList {
        let mut list = WalletList::new();
        list.add(W1, "Freedom").unwrap();
        list.add(W2, "Sharp").unwrap();
        list
    }

    fn raw(cond: &str, outcome: &str, side: &str, size: f64, price: f64, date: &str) -> Value {
        json!({
            "conditionId": cond,
            "outcome": outcome,
            "side": side,
            "size": size,
            "price": price,
            "eventSlug": format!("nba-lal-bos-{date}"),
        })
    }

    fn open_market(name: &str) -> Value {
        json!({
            "question": name,
            "closed": false,
            "acceptingOrders": true,
            "outcomes": ["Yes", "No"],
            "outcomePrices": ["0.5", "0.5"]
        })
    }

    #[tokio::test]
    async fn end_to_end_two_wallets() {
        let source = FakeSource::new()
            .with_trades(
                W1,
                vec![
                    raw("c-a", "Yes", "BUY", 10.0, 0.40, "2030-06-02"),
                    raw("c-a", "Yes", "SELL", 4.0, 0.60, "2030-06-02"),
                ],
            )
            .with_trades(W2, vec![raw("c-a", "Yes", "BUY", 20.0, 0.50, "2030-06-02")])
            .with_detail(MetadataSource::Gamma, "c-a", open_market("Lakers vs Celtics"));
        let (scanner, _) = scanner(source);

        let out = scanner.scan(&wallets(), today(), SortMode::WagerDesc).await;
        assert_eq!(out.len(), 1);
        let market = &out[0];
        assert_eq!(market.market_name, "Lakers vs Celtics");
        assert_eq!(market.wallet_count, 2);
        assert!(approx_eq(market.total_wager, 1.6 + 10.0));

        let freedom = &market.wallets["Freedom"];
        assert_eq!(freedom.outcome, "Yes");
        assert!(approx_eq(freedom.total_shares, 6.0));
        assert!(approx_eq(freedom.total_cost, 1.6));
        assert!(approx_eq(freedom.avg_cost_per_share, 1.6 / 6.0));
        assert_eq!(freedom.position_type, PositionType::Long);
        assert_eq!(freedom.trade_count, 2);
    }

    #[tokio::test]
    async fn past_and_undated_trades_are_excluded() {
        let mut undated = raw("c-b", "Yes", "BUY", 5.0, 0.5, "x");
        undated["eventSlug"] = json!("no-date-here");
        let source = FakeSource::new()
            .with_trades(
                W1,
                vec![raw("c-a", "Yes", "BUY", 5.0, 0.5, "2030-05-31"), undated],
            )
            .with_detail(MetadataSource::Gamma, "c-a", open_market("Past"))
            .with_detail(MetadataSource::Gamma, "c-b", open_market("Undated"));
        let (scanner, _) = scanner(source);
        assert!(scanner.scan(&wallets(), today(), SortMode::WagerDesc).await.is_empty());
    }

    #[tokio::test]
    async fn market_date_fills_missing_trade_date() {
        let mut trade = raw("c-a", "Yes", "BUY", 5.0, 0.5, "x");
        trade["eventSlug"] = json!("no-date-here");
        let mut market = open_market("Dated by metadata");
        market["endDate"] = json!("2030-06-05T00:00:00Z");
        let source = FakeSource::new()
            .with_trades(W1, vec![trade])
            .with_detail(MetadataSource::Gamma, "c-a", market);
        let (scanner, _) = scanner(source);
        let out = scanner.scan(&wallets(), today(), SortMode::WagerDesc).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_date, NaiveDate::from_ymd_opt(2030, 6, 5));
    }

    #[tokio::test]
    async fn resolved_markets_are_dropped() {
        let mut closed = open_market("Closed");
        closed["closed"] = json!(true);
        let source = FakeSource::new()
            .with_trades(
                W1,
                vec![
                    raw("c-a", "Yes", "BUY", 5.0, 0.5, "2030-06-02"),
                    raw("c-b", "Yes", "BUY", 5.0, 0.5, "2030-06-02"),
                ],
            )
            .with_detail(MetadataSource::Gamma, "c-a", closed)
            .with_detail(MetadataSource::Gamma, "c-b", open_market("Open"));
        let (scanner, _) = scanner(source);
        let out = scanner.scan(&wallets(), today(), SortMode::WagerDesc).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].market_name, "Open");
    }

    #[tokio::test]
    async fn unknown_liveness_stays_visible() {
        let source = FakeSource::new()
            .with_trades(W1, vec![raw("c-a", "Yes", "BUY", 5.0, 0.5, "2030-06-02")])
            .failing(MetadataSource::Gamma)
            .failing(MetadataSource::Events)
            .failing(MetadataSource::Markets);
        let (scanner, _) = scanner(source);
        let out = scanner.scan(&wallets(), today(), SortMode::WagerDesc).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].market_name, "c-a");
    }

    #[tokio::test]
    async fn failing_wallet_degrades_to_no_trades() {
        let source = FakeSource::new()
            .with_trades(W2, vec![raw("c-a", "Yes", "BUY", 5.0, 0.5, "2030-06-02")])
            .failing_wallet(W1)
            .with_detail(MetadataSource::Gamma, "c-a", open_market("Open"));
        let (scanner, _) = scanner(source);
        let out = scanner.scan(&wallets(), today(), SortMode::WagerDesc).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].wallet_count, 1);
        assert!(out[0].wallets.contains_key("Sharp"));
    }

    #[tokio::test]
    async fn refresh_clears_session_tier_only() {
        let source = FakeSource::new()
            .with_trades(W1, vec![raw("c-a", "Yes", "BUY", 5.0, 0.5, "2030-06-02")])
            .with_detail(MetadataSource::Gamma, "c-a", open_market("Open"));
        let (scanner, source) = scanner(source);
        let list = wallets();

        scanner.scan(&list, today(), SortMode::WagerDesc).await;
        assert_eq!(source.trade_calls.load(Ordering::SeqCst), 2);

        scanner.refresh(false);
        scanner.scan(&list, today(), SortMode::WagerDesc).await;
        assert_eq!(source.trade_calls.load(Ordering::SeqCst), 2);

        scanner.refresh(true);
        scanner.scan(&list, today(), SortMode::WagerDesc).await;
        assert_eq!(source.trade_calls.load(Ordering::SeqCst), 4);
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_wallet_list() {
        let (scanner, source) = scanner(FakeSource::new());
        let out = scanner.scan(&WalletList::new(), today(), SortMode::WagerDesc).await;
        assert!(out.is_empty());
        assert_eq!(source.trade_calls.load(Ordering::SeqCst), 0);
    }
}
