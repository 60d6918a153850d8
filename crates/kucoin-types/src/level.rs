//! Price level types with decimal precision
//!
//! KuCoin encodes levels as positional string arrays (`["price", "size"]`),
//! both in REST depth snapshots and in persisted book files. [`Level`]
//! serializes back to the same shape so persisted files mirror the venue.

use rust_decimal::Decimal;
use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single price level in the order book
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Level {
    /// Price of this level
    pub price: Decimal,
    /// Resting size at this price
    pub size: Decimal,
}

impl Level {
    /// Create a new price level
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Check if this level has zero size (should be removed)
    pub fn is_zero(&self) -> bool {
        self.size.is_zero()
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.price.to_string())?;
        tuple.serialize_element(&self.size.to_string())?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl<'de> Visitor<'de> for LevelVisitor {
            type Value = Level;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [price, size] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Level, A::Error> {
                let price = seq
                    .next_element::<FlexDecimal>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let size = seq
                    .next_element::<FlexDecimal>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                // Feed records carry a trailing sequence number
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(Level::new(price.0, size.0))
            }
        }

        deserializer.deserialize_seq(LevelVisitor)
    }
}

/// Decimal accepted from either a JSON string or a JSON number
struct FlexDecimal(Decimal);

impl<'de> Deserialize<'de> for FlexDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_decimal(deserializer).map(FlexDecimal)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

/// CRITICAL: Custom deserializer to preserve decimal precision
/// KuCoin sends prices as strings; numbers are accepted without a detour through f64
pub fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    use de::Error;

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => Decimal::from_str(&s).map_err(D::Error::custom),
        StringOrNumber::Number(n) => {
            let s = n.to_string();
            if s.contains('e') || s.contains('E') {
                Decimal::from_scientific(&s).map_err(D::Error::custom)
            } else {
                Decimal::from_str(&s).map_err(D::Error::custom)
            }
        }
    }
}

/// Sequence numbers arrive as strings in change records and as numbers elsewhere
pub fn deserialize_sequence<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use de::Error;

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse::<u64>().map_err(D::Error::custom),
        StringOrNumber::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("sequence out of range: {}", n))),
    }
}

/// Read a decimal out of an already-parsed JSON value
pub fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .ok()
                .or_else(|| Decimal::from_scientific(&s).ok())
        }
        _ => None,
    }
}

/// Read a sequence number out of an already-parsed JSON value
pub fn sequence_from_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_level_from_string_pair() {
        let level: Level = serde_json::from_str(r#"["0.00037526", "50"]"#).unwrap();
        assert_eq!(level.price, dec!(0.00037526));
        assert_eq!(level.size, dec!(50));
    }

    #[test]
    fn test_level_ignores_trailing_sequence() {
        let level: Level = serde_json::from_str(r#"["10.0", "5", "11501462"]"#).unwrap();
        assert_eq!(level, Level::new(dec!(10.0), dec!(5)));
    }

    #[test]
    fn test_level_from_numbers() {
        let level: Level = serde_json::from_str(r#"[88813.5, 0.00460208]"#).unwrap();
        assert_eq!(level.price.to_string(), "88813.5");
        assert_eq!(level.size.to_string(), "0.00460208");
    }

    #[test]
    fn test_level_serializes_as_string_pair() {
        let level = Level::new(dec!(10.50), dec!(3));
        let json = serde_json::to_string(&level).unwrap();
        assert_eq!(json, r#"["10.50","3"]"#);
    }

    #[test]
    fn test_level_rejects_short_array() {
        assert!(serde_json::from_str::<Level>(r#"["10.0"]"#).is_err());
        assert!(serde_json::from_str::<Level>(r#"["abc", "1"]"#).is_err());
    }

    #[test]
    fn test_value_helpers() {
        let value = serde_json::json!(["9.5", "3", "102"]);
        assert_eq!(decimal_from_value(&value[0]), Some(dec!(9.5)));
        assert_eq!(sequence_from_value(&value[2]), Some(102));
        assert_eq!(sequence_from_value(&serde_json::json!(102)), Some(102));
        assert_eq!(sequence_from_value(&serde_json::json!("x")), None);
    }

    #[test]
    fn test_level_is_zero() {
        assert!(Level::new(dec!(100), Decimal::ZERO).is_zero());
        assert!(!Level::new(dec!(100), Decimal::ONE).is_zero());
    }
}
