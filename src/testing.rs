use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

use crate::api::{MarketSource, MetadataSource};

/// In-memory [`MarketSource`] for unit tests.
#[derive(Default)]
pub struct FakeSource {
    trades: HashMap<String, Vec<Value>>,
    details: HashMap<(MetadataSource, String), Value>,
    failing: HashSet<MetadataSource>,
    failing_wallets: HashSet<String>,
    pub trade_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub queried: Mutex<Vec<MetadataSource>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trades(mut self, wallet: &str, trades: Vec<Value>) -> Self {
        self.trades.insert(wallet.to_lowercase(), trades);
        self
    }

    pub fn with_detail(mut self, source: MetadataSource, condition_id: &str, record: Value) -> Self {
        self.details.insert((source, condition_id.to_string()), record);
        self
    }

    pub fn failing(mut self, source: MetadataSource) -> Self {
        self.failing.insert(source);
        self
    }

    pub fn failing_wallet(mut self, wallet: &str) -> Self {
        self.failing_wallets.insert(wallet.to_lowercase());
        self
    }

    pub fn queried(&self) -> Vec<MetadataSource> {
        self.queried.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MarketSource for FakeSource {
    async fn trades(&self, wallet: &str, _limit: usize) -> Result<Vec<Value>> {
        self.trade_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_wallets.contains(wallet) {
            bail!("connection reset");
        }
        Ok(self.trades.get(wallet).cloned().unwrap_or_default())
    }

    async fn market_detail(
        &self,
        source: MetadataSource,
        condition_id: &str,
    ) -> Result<Option<Value>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut q) = self.queried.lock() {
            q.push(source);
        }
        if self.failing.contains(&source) {
            bail!("{} timed out", source.label());
        }
        Ok(self
            .details
            .get(&(source, condition_id.to_string()))
            .cloned())
    }
}
