//! Shared helpers: base-36 encoding, masking, text sanitization and expiry math.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Maximum length of any free-text field written to a store.
pub const MAX_TEXT_LEN: usize = 1000;

/// Number of leading code characters that may appear in logs.
const MASKED_PREFIX_LEN: usize = 8;

/// Encode an integer in lowercase base 36.
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    // Only ASCII digits were pushed
    String::from_utf8(digits).unwrap_or_default()
}

/// Milliseconds since the Unix epoch, clamped at zero.
pub fn millis(instant: DateTime<Utc>) -> u64 {
    instant.timestamp_millis().max(0) as u64
}

/// Show only the start of a code, for logs and transaction records.
pub fn mask_code(code: &str) -> String {
    let head: String = code.chars().take(MASKED_PREFIX_LEN).collect();
    format!("{}...", head)
}

/// Take at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Strip markup characters, cap the length and trim whitespace.
pub fn sanitize_text(s: &str) -> String {
    truncate_chars(s, MAX_TEXT_LEN)
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Longest provider id accepted as a document key.
const MAX_KEY_LEN: usize = 64;

/// Whether `s` can be used as a document key segment: ASCII letters, digits,
/// `-` and `_` only.
pub fn is_safe_key(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_KEY_LEN
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// How an activation's expiration instant is derived from its creation instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Exactly `days * 24h` after creation.
    Exact,
    /// The last millisecond (UTC) of the day `days` after creation.
    #[default]
    EndOfDay,
}

impl ExpiryPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "end_of_day" | "end-of-day" | "eod" => Some(Self::EndOfDay),
            _ => None,
        }
    }

    pub fn expires_at(&self, created_at: DateTime<Utc>, days: u32) -> DateTime<Utc> {
        let exact = created_at + Duration::days(i64::from(days));
        match self {
            Self::Exact => exact,
            Self::EndOfDay => match NaiveTime::from_hms_milli_opt(23, 59, 59, 999) {
                Some(end) => exact.date_naive().and_time(end).and_utc(),
                None => exact,
            },
        }
    }
}
