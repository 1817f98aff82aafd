//! Lenient field deserializers for recorder exports.
//!
//! Recorder dumps are loosely typed: heart rate may arrive as a string,
//! flags as floats, stages as numbers or labels.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
    Flag(bool),
}

/// Timestamp accepted in any layout understood by [`super::parse_timestamp`]
pub fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Loose::deserialize(deserializer)? {
        Loose::Text(s) => super::parse_timestamp(&s).map_err(de::Error::custom),
        Loose::Number(n) => DateTime::from_timestamp(n as i64, 0)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", n))),
        Loose::Flag(_) => Err(de::Error::custom("boolean is not a timestamp")),
    }
}

/// Number, numeric string, boolean or null
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(match value {
        None => None,
        Some(Loose::Number(n)) if n.is_nan() => None,
        Some(Loose::Number(n)) => Some(n),
        Some(Loose::Flag(b)) => Some(if b { 1.0 } else { 0.0 }),
        Some(Loose::Text(s)) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(s.parse::<f64>().map_err(de::Error::custom)?)
            }
        }
    })
}

/// Label stored as text; numeric codes are rendered without a trailing `.0`
pub fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(match value {
        None => None,
        Some(Loose::Number(n)) if n.is_nan() => None,
        Some(Loose::Number(n)) if n.fract() == 0.0 => Some(format!("{}", n as i64)),
        Some(Loose::Number(n)) => Some(n.to_string()),
        Some(Loose::Flag(b)) => Some(b.to_string()),
        Some(Loose::Text(s)) if s.trim().is_empty() => None,
        Some(Loose::Text(s)) => Some(s.trim().to_string()),
    })
}
