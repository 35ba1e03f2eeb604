use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::api::{MarketSource, MetadataSource};
use crate::cache::{CacheKey, CacheValue, LookupCache};
use crate::normalize::{FieldChain, parse_date, parse_number};
use crate::types::{MarketInfo, ResolutionSignal};

/// Absorbs float noise so that 0.95 and 0.05 themselves count as extreme.
const PRICE_EPSILON: f64 = 1e-9;

/// Ids longer than this are shortened when no source names the market.
const SHORT_ID_LEN: usize = 16;

const GAMMA_NAME: FieldChain = FieldChain {
    field: "name",
    keys: &["question", "title", "slug"],
};
const EVENTS_NAME: FieldChain = FieldChain {
    field: "name",
    keys: &["title", "question", "slug"],
};
const MARKETS_NAME: FieldChain = FieldChain {
    field: "name",
    keys: &["question", "title"],
};
const MARKET_DATE: FieldChain = FieldChain {
    field: "date",
    keys: &["endDate", "startDate", "date", "eventDate", "end_date_iso"],
};
const ACCEPTING_ORDERS: FieldChain = FieldChain {
    field: "accepting_orders",
    keys: &["acceptingOrders", "accepting_orders"],
};
const CLOSED: FieldChain = FieldChain {
    field: "closed",
    keys: &["closed"],
};
const ARCHIVED: FieldChain = FieldChain {
    field: "archived",
    keys: &["archived"],
};
const OUTCOME_NAME: FieldChain = FieldChain {
    field: "outcome",
    keys: &["title", "name", "outcome"],
};
const OUTCOME_PRICE: FieldChain = FieldChain {
    field: "price",
    keys: &["price", "lastPrice", "currentPrice"],
};
const TOKEN_NAME: FieldChain = FieldChain {
    field: "outcome",
    keys: &["outcome", "title"],
};
const TOKEN_PRICE: FieldChain = FieldChain {
    field: "price",
    keys: &["price", "lastPrice"],
};

fn name_chain(source: MetadataSource) -> FieldChain {
    match source {
        MetadataSource::Gamma => GAMMA_NAME,
        MetadataSource::Events => EVENTS_NAME,
        MetadataSource::Markets => MARKETS_NAME,
    }
}

/// A list field that may arrive as a JSON array or a JSON-encoded string.
fn json_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Outcome → price from any record shape the metadata sources use:
/// `outcomes` as objects, `outcomes` + `outcomePrices` as parallel lists,
/// or `tokens` as objects. The first price seen for an outcome wins.
pub fn extract_outcome_prices(record: &Value) -> BTreeMap<String, f64> {
    let mut prices = BTreeMap::new();

    let outcomes = json_list(record.get("outcomes"));
    let parallel = json_list(record.get("outcomePrices"));
    for (i, item) in outcomes.iter().enumerate() {
        let entry = match item {
            Value::Object(_) => OUTCOME_NAME.string(item).zip(OUTCOME_PRICE.number(item)),
            Value::String(name) => parallel
                .get(i)
                .and_then(parse_number)
                .map(|price| (name.clone(), price)),
            _ => None,
        };
        if let Some((name, price)) = entry {
            prices.entry(name).or_insert(price);
        }
    }

    for token in json_list(record.get("tokens")) {
        if let Some((name, price)) = TOKEN_NAME.string(&token).zip(TOKEN_PRICE.number(&token)) {
            prices.entry(name).or_insert(price);
        }
    }

    prices
}

/// First outcome priced at or below `threshold` or at or above `1 - threshold`.
pub fn extreme_outcome(prices: &BTreeMap<String, f64>, threshold: f64) -> Option<(&str, f64)> {
    prices
        .iter()
        .find(|(_, p)| **p <= threshold + PRICE_EPSILON || **p >= 1.0 - threshold - PRICE_EPSILON)
        .map(|(name, p)| (name.as_str(), *p))
}

/// Display name when no source names the market.
pub fn short_id(condition_id: &str) -> String {
    if condition_id.chars().count() > SHORT_ID_LEN {
        let head: String = condition_id.chars().take(SHORT_ID_LEN).collect();
        format!("{head}...")
    } else {
        condition_id.to_string()
    }
}

/// Everything collected from the sources queried so far. `prices` keeps the
/// first price per outcome for display; `extreme` is checked per source, so a
/// later source's extreme price counts even when an earlier one named the
/// same outcome.
#[derive(Debug, Default)]
struct Signals {
    name: Option<String>,
    date: Option<NaiveDate>,
    prices: BTreeMap<String, f64>,
    explicit_flag: Option<String>,
    extreme: Option<(String, f64)>,
    flags_seen: bool,
    any_data: bool,
}

impl Signals {
    fn absorb(&mut self, source: MetadataSource, record: &Value, threshold: f64) {
        if self.name.is_none() {
            self.name = name_chain(source).string(record);
        }
        if self.date.is_none() {
            self.date = MARKET_DATE.value(record).and_then(parse_date);
        }
        let prices = extract_outcome_prices(record);
        if self.extreme.is_none() {
            self.extreme = extreme_outcome(&prices, threshold)
                .map(|(outcome, price)| (outcome.to_string(), price));
        }
        for (outcome, price) in prices {
            self.prices.entry(outcome).or_insert(price);
        }

        let closed = CLOSED.flag(record);
        let archived = ARCHIVED.flag(record);
        let accepting = ACCEPTING_ORDERS.flag(record);
        if closed.is_some() || archived.is_some() || accepting.is_some() {
            self.flags_seen = true;
        }
        if self.explicit_flag.is_none() {
            self.explicit_flag = if closed == Some(true) {
                Some("closed".to_string())
            } else if archived == Some(true) {
                Some("archived".to_string())
            } else if accepting == Some(false) {
                Some("acceptingOrders=false".to_string())
            } else {
                None
            };
        }

        self.any_data |= self.name.is_some()
            || self.date.is_some()
            || !self.prices.is_empty()
            || self.flags_seen;
    }

    /// Nothing a further source could add changes the verdict or the name.
    fn settled(&self) -> bool {
        self.explicit_flag.is_some()
            || self.extreme.is_some()
            || (self.name.is_some() && !self.prices.is_empty() && self.flags_seen)
    }

    fn into_info(self, condition_id: &str) -> MarketInfo {
        let signal = match (self.explicit_flag, self.extreme) {
            (Some(flag), _) => Some(ResolutionSignal::ExplicitFlag { flag }),
            (None, Some((outcome, price))) => {
                Some(ResolutionSignal::ExtremePrice { outcome, price })
            }
            (None, None) => None,
        };
        MarketInfo {
            condition_id: condition_id.to_string(),
            name: self.name.unwrap_or_else(|| short_id(condition_id)),
            date: self.date,
            prices: self.prices,
            resolved: signal.is_some(),
            signal,
        }
    }
}

/// Liveness resolver backed by a [`MarketSource`] and a [`LookupCache`].
///
/// Metadata sources are tried in [`MetadataSource::FALLBACK_ORDER`]. A market
/// is resolved when any source carries an explicit closed flag OR any source
/// prices an outcome at an extreme. Missing data keeps the market live.
pub struct MarketResolver {
    source: Arc<dyn MarketSource>,
    cache: Arc<dyn LookupCache>,
    extreme_threshold: f64,
}

impl MarketResolver {
    pub fn new(
        source: Arc<dyn MarketSource>,
        cache: Arc<dyn LookupCache>,
        extreme_threshold: f64,
    ) -> Self {
        Self {
            source,
            cache,
            extreme_threshold,
        }
    }

    /// Metadata and liveness for a condition id. Never fails: an empty id
    /// gives the "Unknown Market" sentinel, and exhausted sources give a live
    /// market named after the shortened id.
    pub async fn resolve(&self, condition_id: &str) -> MarketInfo {
        let id = condition_id.trim();
        if id.is_empty() {
            return MarketInfo::unknown();
        }

        let key = CacheKey::MarketInfo(id.to_string());
        let fetch = async {
            self.lookup(id)
                .await
                .map(|info| CacheValue::MarketInfo(Arc::new(info)))
        }
        .boxed();

        match self.cache.get_or_fetch(key, fetch).await {
            Some(CacheValue::MarketInfo(info)) => info.as_ref().clone(),
            _ => Signals::default().into_info(id),
        }
    }

    /// Query sources in order. `None` when no source produced any data.
    async fn lookup(&self, id: &str) -> Option<MarketInfo> {
        let mut signals = Signals::default();

        for source in MetadataSource::FALLBACK_ORDER {
            match self.source.market_detail(source, id).await {
                Ok(Some(record)) => signals.absorb(source, &record, self.extreme_threshold),
                Ok(None) => debug!("{}: no record for {id}", source.label()),
                Err(e) => debug!("{}: lookup failed for {id}: {e:#}", source.label()),
            }
            if signals.settled() {
                break;
            }
        }

        if !signals.any_data {
            debug!("No metadata for {id}, treating as live");
            return None;
        }
        Some(signals.into_info(id))
    }
}
