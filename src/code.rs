//! Activation code issuance.
//!
//! Codes have the shape `PREFIX-TIMESTAMP-RANDOM[-RANDOM]`:
//! - `PREFIX`: the plan's code prefix (default prefix for unknown plans)
//! - `TIMESTAMP`: issue time in milliseconds, uppercase base 36
//! - `RANDOM`: one or two fixed-length segments from the grammar's alphabet
//!
//! With the default grammar a code looks like `ANIM1M-LOYW3V28-7QX2` (20 chars).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::plans::PlanCatalog;
use crate::util::{mask_code, millis, to_base36};

const BASE36_UPPER: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DECIMAL: &[u8] = b"0123456789";

const MAX_PREFIX_LEN: usize = 8;
/// u64::MAX in base 36 is 13 digits.
const MAX_TIMESTAMP_LEN: usize = 13;

/// Character set of the random segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentAlphabet {
    #[default]
    Base36,
    Decimal,
}

impl SegmentAlphabet {
    fn chars(&self) -> &'static [u8] {
        match self {
            Self::Base36 => BASE36_UPPER,
            Self::Decimal => DECIMAL,
        }
    }

    fn contains(&self, c: char) -> bool {
        c.is_ascii() && self.chars().contains(&(c as u8))
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "base36" | "alphanumeric" => Some(Self::Base36),
            "decimal" | "digits" => Some(Self::Decimal),
            _ => None,
        }
    }
}

/// Shape of the random tail of a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGrammar {
    /// Number of random segments, 1 or 2
    pub random_segments: u8,
    /// Characters per random segment
    pub random_len: usize,
    pub alphabet: SegmentAlphabet,
}

impl Default for CodeGrammar {
    fn default() -> Self {
        Self {
            random_segments: 1,
            random_len: 4,
            alphabet: SegmentAlphabet::Base36,
        }
    }
}

impl CodeGrammar {
    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.random_segments) {
            return Err(CheckoutError::configuration(format!(
                "Code grammar needs 1 or 2 random segments, got {}",
                self.random_segments
            )));
        }
        if !(2..=8).contains(&self.random_len) {
            return Err(CheckoutError::configuration(format!(
                "Random segment length must be between 2 and 8, got {}",
                self.random_len
            )));
        }
        Ok(())
    }

    /// Format check for a code issued under this grammar.
    pub fn matches(&self, code: &str) -> bool {
        let segments: Vec<&str> = code.split('-').collect();
        if segments.len() != 2 + self.random_segments as usize {
            return false;
        }

        let prefix = segments[0];
        if prefix.is_empty()
            || prefix.len() > MAX_PREFIX_LEN
            || !prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return false;
        }

        let timestamp = segments[1];
        if timestamp.is_empty()
            || timestamp.len() > MAX_TIMESTAMP_LEN
            || !timestamp.chars().all(|c| SegmentAlphabet::Base36.contains(c))
        {
            return false;
        }

        segments[2..].iter().all(|segment| {
            segment.len() == self.random_len && segment.chars().all(|c| self.alphabet.contains(c))
        })
    }
}

/// Entropy source for the random segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Randomness {
    /// Thread-local PRNG, fast and good enough for redemption codes
    Thread,
    /// Operating system CSPRNG
    #[default]
    Secure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuerOptions {
    pub grammar: CodeGrammar,
    pub randomness: Randomness,
    /// Generation attempts before giving up with `CheckoutError::Generation`
    pub max_attempts: u32,
}

impl Default for IssuerOptions {
    fn default() -> Self {
        Self {
            grammar: CodeGrammar::default(),
            randomness: Randomness::default(),
            max_attempts: 5,
        }
    }
}

impl IssuerOptions {
    pub fn validate(&self) -> Result<()> {
        self.grammar.validate()?;
        if self.max_attempts == 0 {
            return Err(CheckoutError::configuration(
                "Code generation needs at least one attempt",
            ));
        }
        Ok(())
    }
}

/// An issued activation code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationCode(String);

impl ActivationCode {
    /// Accept an externally supplied code if it fits `grammar`.
    pub fn parse(code: &str, grammar: &CodeGrammar) -> Result<Self> {
        let code = code.trim();
        if grammar.matches(code) {
            Ok(Self(code.to_string()))
        } else {
            Err(CheckoutError::validation(format!(
                "Malformed activation code: {}",
                mask_code(code)
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// First characters only, safe for logs.
    pub fn masked(&self) -> String {
        mask_code(&self.0)
    }
}

impl fmt::Display for ActivationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActivationCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives activation codes from plan types.
#[derive(Debug, Clone)]
pub struct CodeIssuer {
    prefixes: BTreeMap<String, String>,
    default_prefix: String,
    options: IssuerOptions,
}

impl CodeIssuer {
    pub fn new(catalog: &PlanCatalog, options: IssuerOptions) -> Self {
        Self {
            prefixes: catalog
                .iter()
                .map(|(plan_type, plan)| (plan_type.to_string(), plan.code_prefix.clone()))
                .collect(),
            default_prefix: catalog.default_prefix.clone(),
            options,
        }
    }

    pub fn options(&self) -> &IssuerOptions {
        &self.options
    }

    pub fn grammar(&self) -> &CodeGrammar {
        &self.options.grammar
    }

    pub fn prefix_for(&self, plan_type: &str) -> &str {
        self.prefixes
            .get(plan_type)
            .map(String::as_str)
            .unwrap_or(&self.default_prefix)
    }

    pub fn validate(&self, code: &str) -> bool {
        self.options.grammar.matches(code)
    }

    /// Issue a code stamped with the current time.
    pub fn issue(&self, plan_type: &str) -> Result<ActivationCode> {
        self.issue_at(plan_type, Utc::now())
    }

    /// Issue a code stamped with `now`.
    pub fn issue_at(&self, plan_type: &str, now: DateTime<Utc>) -> Result<ActivationCode> {
        let prefix = self.prefix_for(plan_type);
        let timestamp = to_base36(millis(now)).to_uppercase();

        for attempt in 1..=self.options.max_attempts {
            let code = self.compose(prefix, &timestamp);
            if self.validate(&code) {
                tracing::debug!(code = %mask_code(&code), plan_type, "Activation code generated");
                return Ok(ActivationCode(code));
            }
            tracing::warn!(
                attempt,
                code = %mask_code(&code),
                "Generated activation code failed format check, regenerating"
            );
        }

        Err(CheckoutError::Generation {
            attempts: self.options.max_attempts,
        })
    }

    fn compose(&self, prefix: &str, timestamp: &str) -> String {
        let grammar = &self.options.grammar;
        let mut segments = vec![prefix.to_string(), timestamp.to_string()];
        for _ in 0..grammar.random_segments {
            let segment = match self.options.randomness {
                Randomness::Thread => {
                    random_segment(&mut rand::thread_rng(), grammar.alphabet, grammar.random_len)
                }
                Randomness::Secure => {
                    random_segment(&mut rand::rngs::OsRng, grammar.alphabet, grammar.random_len)
                }
            };
            segments.push(segment);
        }
        segments.join("-")
    }
}

fn random_segment<R: Rng + ?Sized>(rng: &mut R, alphabet: SegmentAlphabet, len: usize) -> String {
    let chars = alphabet.chars();
    (0..len)
        .map(|_| chars[rng.gen_range(0..chars.len())] as char)
        .collect()
}
