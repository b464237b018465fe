// Utility functions and helpers

use chrono::{DateTime, Utc};

/// Convert a UTC time to nanoseconds since Unix epoch, the unit of IBC timeout timestamps
pub fn datetime_to_nanos(time: DateTime<Utc>) -> u64 {
    time.timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or(0)
}

/// Current wall-clock time in nanoseconds
pub fn now_nanos() -> u64 {
    datetime_to_nanos(Utc::now())
}

/// Clamp an unsigned chain value into SQLite's signed integer range.
///
/// Timeout timestamps are nanoseconds and fit comfortably until the year 2262;
/// anything larger saturates, which keeps ordering comparisons correct.
pub fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Inverse of [`to_sql_int`]; negative values never get written so they map to zero.
pub fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Width of `u128::MAX` in decimal digits
const FEE_AMOUNT_DIGITS: usize = 39;

/// Encode a fee amount as fixed-width decimal text.
///
/// Token amounts routinely exceed SQLite's signed integer range, so they are
/// stored as zero-padded text; equal widths make text comparison numeric.
pub fn fee_amount_to_sql(amount: u128) -> String {
    format!("{:0width$}", amount, width = FEE_AMOUNT_DIGITS)
}

/// Inverse of [`fee_amount_to_sql`]
pub fn fee_amount_from_sql(text: &str) -> Option<u128> {
    text.trim().parse().ok()
}

/// Parse an IBC height in `revision-height` form ("1-1000") or a bare number.
///
/// Returns the revision height. An empty string is the zero sentinel.
pub fn parse_timeout_height(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    match raw.split_once('-') {
        Some((revision, height)) => {
            revision.parse::<u64>().ok()?;
            height.parse().ok()
        }
        None => raw.parse().ok(),
    }
}

/// Parse a nanosecond timeout timestamp. An empty string is the zero sentinel.
pub fn parse_timeout_timestamp(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    // Values above u64 are clamped rather than rejected; the raw string keeps the precision.
    match raw.parse::<u128>() {
        Ok(value) => Some(u64::try_from(value).unwrap_or(u64::MAX)),
        Err(_) => None,
    }
}

/// Serde helper storing byte payloads as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for token amounts: accepts an integer or a decimal string.
///
/// TOML integers stop at `i64::MAX`, so larger amounts serialize as strings.
pub mod token_amount {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Integer(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        match i64::try_from(*amount) {
            Ok(small) => serializer.serialize_i64(small),
            Err(_) => serializer.serialize_str(&amount.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Integer(amount) => Ok(u128::from(amount)),
            RawAmount::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid token amount: {}", text))),
        }
    }
}
