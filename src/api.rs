use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::HttpConfig;

/// Market metadata endpoints, in the order the resolver tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataSource {
    /// Gamma market detail. The only source with `closed` / `archived` /
    /// `acceptingOrders` flags.
    Gamma,
    /// Data-API events lookup.
    Events,
    /// Data-API markets lookup.
    Markets,
}

impl MetadataSource {
    pub const FALLBACK_ORDER: [MetadataSource; 3] = [
        MetadataSource::Gamma,
        MetadataSource::Events,
        MetadataSource::Markets,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetadataSource::Gamma => "gamma",
            MetadataSource::Events => "events",
            MetadataSource::Markets => "markets",
        }
    }
}

/// External data the scan pipeline reads. Errors are transport or shape
/// failures; callers degrade them to "no data".
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Most recent raw trade records for a wallet.
    async fn trades(&self, wallet: &str, limit: usize) -> Result<Vec<Value>>;

    /// First metadata record a source returns for a condition id.
    async fn market_detail(&self, source: MetadataSource, condition_id: &str)
    -> Result<Option<Value>>;
}

/// Trade list from whichever envelope the response uses: a bare list, or an
/// object holding a `data` or `trades` list.
pub fn unwrap_trade_list(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => ["data", "trades"]
            .iter()
            .find_map(|key| match obj.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// First record of a metadata response: a list's head, a `data` list's head,
/// or the object itself.
pub fn unwrap_first_record(body: Value) -> Option<Value> {
    match body {
        Value::Array(items) => items.into_iter().next(),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items.into_iter().next(),
            Some(other) => {
                obj.insert("data".to_string(), other);
                Some(Value::Object(obj))
            }
            None if obj.is_empty() => None,
            None => Some(Value::Object(obj)),
        },
        _ => None,
    }
}

/// Polymarket data / gamma APIs over reqwest.
pub struct HttpSource {
    client: reqwest::Client,
    data_api_base: String,
    gamma_api_base: String,
    metadata_timeout: Duration,
    trades_timeout: Duration,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sharpscout/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            data_api_base: config.data_api_base.trim_end_matches('/').to_string(),
            gamma_api_base: config.gamma_api_base.trim_end_matches('/').to_string(),
            metadata_timeout: Duration::from_secs(config.metadata_timeout_secs),
            trades_timeout: Duration::from_secs(config.trades_timeout_secs),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)], timeout: Duration) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        resp.json()
            .await
            .with_context(|| format!("GET {url} returned invalid JSON"))
    }
}

#[async_trait]
impl MarketSource for HttpSource {
    async fn trades(&self, wallet: &str, limit: usize) -> Result<Vec<Value>> {
        let url = format!("{}/trades", self.data_api_base);
        let limit = limit.to_string();
        let body = self
            .get_json(&url, &[("user", wallet), ("limit", limit.as_str())], self.trades_timeout)
            .await?;
        let trades = unwrap_trade_list(body);
        debug!("Fetched {} raw trades for {wallet}", trades.len());
        Ok(trades)
    }

    async fn market_detail(
        &self,
        source: MetadataSource,
        condition_id: &str,
    ) -> Result<Option<Value>> {
        let (url, key) = match source {
            MetadataSource::Gamma => (format!("{}/markets", self.gamma_api_base), "condition_ids"),
            MetadataSource::Events => (format!("{}/events", self.data_api_base), "conditionId"),
            MetadataSource::Markets => (format!("{}/markets", self.data_api_base), "conditionId"),
        };
        let body = self
            .get_json(&url, &[(key, condition_id)], self.metadata_timeout)
            .await?;
        Ok(unwrap_first_record(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trade_list_envelopes() {
        assert_eq!(unwrap_trade_list(json!([{"a": 1}, {"a": 2}])).len(), 2);
        assert_eq!(unwrap_trade_list(json!({"data": [{"a": 1}]})).len(), 1);
        assert_eq!(unwrap_trade_list(json!({"trades": [{"a": 1}]})).len(), 1);
        assert!(unwrap_trade_list(json!({"error": "rate limited"})).is_empty());
        assert!(unwrap_trade_list(json!("nope")).is_empty());
    }

    #[test]
    fn trade_list_skips_non_list_data() {
        let body = json!({"data": {"count": 0}, "trades": [{"a": 1}]});
        assert_eq!(unwrap_trade_list(body).len(), 1);
    }

    #[test]
    fn first_record_envelopes() {
        assert_eq!(
            unwrap_first_record(json!([{"title": "A"}, {"title": "B"}])),
            Some(json!({"title": "A"}))
        );
        assert_eq!(
            unwrap_first_record(json!({"data": [{"title": "C"}]})),
            Some(json!({"title": "C"}))
        );
        assert_eq!(
            unwrap_first_record(json!({"title": "D"})),
            Some(json!({"title": "D"}))
        );
        assert_eq!(unwrap_first_record(json!([])), None);
        assert_eq!(unwrap_first_record(json!({"data": []})), None);
        assert_eq!(unwrap_first_record(json!({})), None);
    }

    #[test]
    fn fallback_order_is_fixed() {
        let labels: Vec<_> = MetadataSource::FALLBACK_ORDER
            .iter()
            .map(|s| s.label())
            .collect();
        assert_eq!(labels, ["gamma", "events", "markets"]);
    }
}
