use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::types::{CanonicalTrade, Side, SideSource, UNKNOWN_OUTCOME};

/// Ordered list of synonymous JSON keys for one canonical field. The first
/// key holding a present value (not null, not an empty string) wins.
#[derive(Debug, Clone, Copy)]
pub struct FieldChain {
    pub field: &'static str,
    pub keys: &'static [&'static str],
}

impl FieldChain {
    /// First key with a present value, together with that value.
    pub fn pick<'a>(&self, record: &'a Value) -> Option<(&'static str, &'a Value)> {
        self.keys.iter().find_map(|key| {
            let value = record.get(*key)?;
            match value {
                Value::Null => None,
                Value::String(s) if s.trim().is_empty() => None,
                _ => Some((*key, value)),
            }
        })
    }

    pub fn value<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.pick(record).map(|(_, value)| value)
    }

    /// String or number rendered as a string.
    pub fn string(&self, record: &Value) -> Option<String> {
        match self.value(record)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn number(&self, record: &Value) -> Option<f64> {
        self.value(record).and_then(parse_number)
    }

    /// First synonym that parses to a finite value above zero. Zero, missing
    /// and unparseable values fall through to the next key.
    pub fn positive_number(&self, record: &Value) -> Option<f64> {
        self.keys
            .iter()
            .filter_map(|key| record.get(*key).and_then(parse_number))
            .find(|v| *v > 0.0)
    }

    pub fn flag(&self, record: &Value) -> Option<bool> {
        self.value(record).and_then(parse_flag)
    }
}

pub const SIZE: FieldChain = FieldChain {
    field: "size",
    keys: &["size", "amount", "quantity"],
};
pub const PRICE: FieldChain = FieldChain {
    field: "price",
    keys: &["price", "priceNum", "fillPrice"],
};
pub const SIDE: FieldChain = FieldChain {
    field: "side",
    keys: &["side", "type"],
};
pub const MAKER: FieldChain = FieldChain {
    field: "maker",
    keys: &["isMaker", "maker"],
};
pub const OUTCOME: FieldChain = FieldChain {
    field: "outcome",
    keys: &["outcome", "outcomeName", "outcomeTitle"],
};
pub const MARKET_ID: FieldChain = FieldChain {
    field: "market_id",
    keys: &["conditionId", "condition_id", "market"],
};
pub const MARKET_NAME: FieldChain = FieldChain {
    field: "market_name",
    keys: &["marketName", "market_name", "question", "title"],
};
pub const EVENT_DATE: FieldChain = FieldChain {
    field: "event_date",
    keys: &["eventDate", "endDate", "startDate", "gameStartTime"],
};
pub const EVENT_SLUG: FieldChain = FieldChain {
    field: "event_slug",
    keys: &["eventSlug", "slug"],
};
pub const TIMESTAMP: FieldChain = FieldChain {
    field: "timestamp",
    keys: &["timestamp", "matchTime"],
};

/// Every chain the normalizer consults, in the order fields are extracted.
pub const TRADE_CHAINS: [FieldChain; 10] = [
    SIZE,
    PRICE,
    SIDE,
    MAKER,
    OUTCOME,
    MARKET_ID,
    MARKET_NAME,
    EVENT_DATE,
    EVENT_SLUG,
    TIMESTAMP,
];

const BUY_WORDS: &[&str] = &["buy", "b", "long", "bid"];
const SELL_WORDS: &[&str] = &["sell", "s", "short", "ask", "ask_order"];

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_CUTOFF: f64 = 1e10;

/// Parse a JSON number or numeric string. Non-finite values are rejected.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

fn parse_epoch(secs_or_millis: f64) -> Option<DateTime<Utc>> {
    let secs = if secs_or_millis > EPOCH_MILLIS_CUTOFF {
        secs_or_millis / 1000.0
    } else {
        secs_or_millis
    };
    DateTime::from_timestamp(secs as i64, 0)
}

/// Parse a date from an epoch number, an ISO timestamp or a `YYYY-MM-DD` prefix.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => parse_epoch(n.as_f64()?).map(|dt| dt.date_naive()),
        Value::String(s) => parse_date_str(s.trim()),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    if s.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.date_naive());
        }
        return NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| dt.date());
    }
    let prefix = s.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// First `YYYY-MM-DD` embedded in an event slug, e.g. `nba-lal-bos-2025-01-15`.
pub fn date_from_slug(slug: &str) -> Option<NaiveDate> {
    slug.as_bytes()
        .windows(10)
        .filter(|w| is_iso_date_shape(w))
        .filter_map(|w| std::str::from_utf8(w).ok())
        .find_map(|w| NaiveDate::parse_from_str(w, "%Y-%m-%d").ok())
}

fn is_iso_date_shape(w: &[u8]) -> bool {
    w.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}

/// Side from the explicit vocabulary, then the maker flag, then Buy.
pub fn infer_side(record: &Value) -> (Side, SideSource) {
    if let Some(raw) = SIDE.string(record) {
        let word = raw.to_lowercase();
        if BUY_WORDS.contains(&word.as_str()) {
            return (Side::Buy, SideSource::Explicit);
        }
        if SELL_WORDS.contains(&word.as_str()) {
            return (Side::Sell, SideSource::Explicit);
        }
    }
    if MAKER.flag(record) == Some(true) {
        return (Side::Buy, SideSource::MakerFlag);
    }
    (Side::Buy, SideSource::Default)
}

/// Event date from explicit date fields, else from the event slug.
pub fn event_date(record: &Value) -> Option<NaiveDate> {
    EVENT_DATE
        .value(record)
        .and_then(parse_date)
        .or_else(|| EVENT_SLUG.string(record).and_then(|s| date_from_slug(&s)))
}

/// Normalize one raw record. `None` when no size or price synonym holds a
/// positive number.
pub fn normalize(raw: &Value, wallet: &str) -> Option<CanonicalTrade> {
    let size = SIZE.positive_number(raw)?;
    let price = PRICE.positive_number(raw)?;
    let (side, side_source) = infer_side(raw);

    Some(CanonicalTrade {
        wallet: wallet.to_lowercase(),
        market_id: MARKET_ID.string(raw).unwrap_or_default(),
        market_name: MARKET_NAME.string(raw),
        outcome: OUTCOME
            .string(raw)
            .unwrap_or_else(|| UNKNOWN_OUTCOME.to_string()),
        side,
        side_source,
        size,
        price,
        event_date: event_date(raw),
        timestamp: TIMESTAMP.number(raw).and_then(parse_epoch),
    })
}

/// Result of normalizing one wallet's trade page.
#[derive(Debug, Default)]
pub struct Normalized {
    pub trades: Vec<CanonicalTrade>,
    pub dropped: usize,
    pub defaulted_sides: usize,
}

pub fn normalize_all(raws: &[Value], wallet: &str) -> Normalized {
    let mut out = Normalized::default();
    for raw in raws {
        match normalize(raw, wallet) {
            Some(trade) => {
                if trade.side_source == SideSource::Default {
                    out.defaulted_sides += 1;
                }
                out.trades.push(trade);
            }
            None => out.dropped += 1,
        }
    }
    out
}

/// Live-trade filter: the event date must be known and not in the past.
///
/// Unknown dates are excluded. This is the opposite of market liveness, where
/// missing data keeps the market visible.
pub fn is_live_event(event_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    matches!(event_date, Some(date) if date >= today)
}
