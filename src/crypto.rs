//! Client IP fingerprinting.
//!
//! Records can carry a salted SHA-256 of the buyer's IP so support can
//! correlate duplicate purchases without storing the address itself.

use std::net::IpAddr;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::util::{millis, to_base36};

/// Hex characters kept from the digest.
const IP_HASH_LEN: usize = 32;

/// Hash an IP address with an application salt, returns 32 lowercase hex chars.
pub fn hash_ip(ip: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.trim().as_bytes());
    hasher.update(salt.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(IP_HASH_LEN);
    digest
}

/// Placeholder stored when the IP cannot be determined.
pub fn unknown_ip_hash() -> String {
    format!("unknown_{}", to_base36(millis(Utc::now())))
}

/// Turns the caller's address into the `IPHash` field.
#[derive(Debug, Clone)]
pub struct IpHasher {
    /// `None` when fingerprinting is switched off
    salt: Option<String>,
}

impl IpHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: Some(salt.into()),
        }
    }

    /// A hasher that never attaches an IP hash.
    pub fn disabled() -> Self {
        Self { salt: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.salt.is_some()
    }

    /// `None` when disabled; a placeholder when the address is unknown.
    pub fn fingerprint(&self, ip: Option<IpAddr>) -> Option<String> {
        let salt = self.salt.as_deref()?;
        Some(match ip {
            Some(ip) => hash_ip(&ip.to_string(), salt),
            None => unknown_ip_hash(),
        })
    }
}
