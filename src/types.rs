use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::LadderError;

/// A price or quantity as it arrived on the wire.
///
/// Exchanges send levels either as decimal strings (`"50000.10"`) or as JSON
/// numbers; both are kept verbatim and only parsed when aggregated. Any other
/// JSON value (`null`, bools, arrays, objects) becomes [`RawValue::Invalid`]
/// so one bad entry costs only its own level.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Invalid,
}

impl RawValue {
    /// Parse to a finite `f64`. Returns `None` for unparseable text, NaN,
    /// infinities and invalid values.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Number(v) => *v,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
            RawValue::Invalid => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawValue::Number(v) => serializer.serialize_f64(*v),
            RawValue::Text(s) => serializer.serialize_str(s),
            RawValue::Invalid => serializer.serialize_none(),
        }
    }
}

struct RawValueVisitor;

impl<'de> Visitor<'de> for RawValueVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a price or quantity")
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<RawValue, E> {
        Ok(RawValue::Invalid)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawValue, E> {
        Ok(RawValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawValue, E> {
        Ok(RawValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawValue, E> {
        Ok(RawValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RawValue, E> {
        Ok(RawValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RawValue, E> {
        Ok(RawValue::Text(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Invalid)
    }

    fn visit_none<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Invalid)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<RawValue, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawValue, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(RawValue::Invalid)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawValue, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(RawValue::Invalid)
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawValueVisitor)
    }
}

/// One `[price, quantity]` entry of a depth update.
///
/// Decoding reads the first two elements and ignores any extra ones. A
/// short array or a non-array entry yields invalid values, which the
/// aggregator skips.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawLevel(pub RawValue, pub RawValue);

impl RawLevel {
    pub fn new(price: impl Into<RawValue>, quantity: impl Into<RawValue>) -> Self {
        Self(price.into(), quantity.into())
    }

    pub fn price(&self) -> Option<f64> {
        self.0.as_f64()
    }

    pub fn quantity(&self) -> Option<f64> {
        self.1.as_f64()
    }
}

struct RawLevelVisitor;

impl<'de> Visitor<'de> for RawLevelVisitor {
    type Value = RawLevel;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a [price, quantity] level")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawLevel, A::Error> {
        let price = seq.next_element::<RawValue>()?.unwrap_or(RawValue::Invalid);
        let quantity = seq.next_element::<RawValue>()?.unwrap_or(RawValue::Invalid);
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(RawLevel(price, quantity))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawLevel, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    // Scalars in place of a level.
    fn visit_bool<E: de::Error>(self, _: bool) -> Result<RawLevel, E> {
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<RawLevel, E> {
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<RawLevel, E> {
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<RawLevel, E> {
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<RawLevel, E> {
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawLevel, E> {
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    fn visit_none<E: de::Error>(self) -> Result<RawLevel, E> {
        Ok(RawLevel(RawValue::Invalid, RawValue::Invalid))
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<RawLevel, D::Error> {
        d.deserialize_any(self)
    }
}

impl<'de> Deserialize<'de> for RawLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawLevelVisitor)
    }
}

struct MetadataVisitor;

impl<'de> Visitor<'de> for MetadataVisitor {
    type Value = Option<u64>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an event time or update id")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Option<u64>, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Option<u64>, E> {
        Ok(u64::try_from(v).ok())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Option<u64>, E> {
        Ok((v.is_finite() && v >= 0.0).then_some(v as u64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Option<u64>, E> {
        Ok(v.trim().parse().ok())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Option<u64>, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Option<u64>, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Option<u64>, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Option<u64>, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Option<u64>, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Option<u64>, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

/// `E` / `U` metadata: integers pass through, non-negative floats are
/// truncated, numeric strings are parsed, anything else becomes `None`.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    deserializer.deserialize_any(MetadataVisitor)
}

/// Depth update payload.
///
/// Field names follow the Binance depth stream:
///   e  = event type
///   E  = event time (ms)
///   s  = symbol
///   U  = update id (`lastUpdateId` on partial book snapshots)
///   bids / b, asks / a = `[price, quantity]` levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(
        rename = "E",
        default,
        deserialize_with = "lenient_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(
        rename = "U",
        alias = "lastUpdateId",
        default,
        deserialize_with = "lenient_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub update_id: Option<u64>,
    #[serde(alias = "b")]
    pub bids: Vec<RawLevel>,
    #[serde(alias = "a")]
    pub asks: Vec<RawLevel>,
}

/// All levels seen during one flush window, coalesced.
///
/// `update_id` and `event_time` come from the last update in the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batch {
    pub bids: Vec<RawLevel>,
    pub asks: Vec<RawLevel>,
    #[serde(rename = "E", skip_serializing_if = "Option::is_none")]
    pub event_time: Option<u64>,
    #[serde(rename = "U", skip_serializing_if = "Option::is_none")]
    pub update_id: Option<u64>,
}

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

/// Price grouping granularity offered to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TickSize {
    Hundredth,
    #[default]
    Tenth,
    One,
}

impl TickSize {
    pub const ALL: [TickSize; 3] = [TickSize::Hundredth, TickSize::Tenth, TickSize::One];

    pub fn as_f64(&self) -> f64 {
        match self {
            TickSize::Hundredth => 0.01,
            TickSize::Tenth => 0.1,
            TickSize::One => 1.0,
        }
    }

    /// Integer scale factor `1 / tick`, as used by the rounding grid.
    pub fn multiplier(&self) -> f64 {
        match self {
            TickSize::Hundredth => 100.0,
            TickSize::Tenth => 10.0,
            TickSize::One => 1.0,
        }
    }
}

impl fmt::Display for TickSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickSize::Hundredth => f.write_str("0.01"),
            TickSize::Tenth => f.write_str("0.1"),
            TickSize::One => f.write_str("1"),
        }
    }
}

impl FromStr for TickSize {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| LadderError::InvalidTickSize(s.to_string()))?;
        TickSize::ALL
            .into_iter()
            .find(|t| t.as_f64() == value)
            .ok_or_else(|| LadderError::InvalidTickSize(s.to_string()))
    }
}
