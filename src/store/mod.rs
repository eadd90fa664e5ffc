//! Remote document store abstraction.
//!
//! The realtime database is consumed as a tree of JSON documents addressed by
//! slash-separated paths. Activation records live under `ActivationCodes/`,
//! audit entries under `TransactionLogs/` and one marker per paid subscription
//! under `IssuedSubscriptions/`.

mod memory;
mod realtime;

pub use memory::{FailureMode, MemoryDocumentStore};
pub use realtime::{RealtimeConfig, RealtimeDatabase};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub const ACTIVATION_CODES: &str = "ActivationCodes";
pub const TRANSACTION_LOGS: &str = "TransactionLogs";
pub const ISSUED_SUBSCRIPTIONS: &str = "IssuedSubscriptions";

pub fn activation_code_path(code: &str) -> String {
    format!("{}/{}", ACTIVATION_CODES, code)
}

pub fn transaction_log_path(log_id: &str) -> String {
    format!("{}/{}", TRANSACTION_LOGS, log_id)
}

pub fn issued_subscription_path(subscription_id: &str) -> String {
    format!("{}/{}", ISSUED_SUBSCRIPTIONS, subscription_id)
}

/// Keyed JSON document store.
///
/// Implementations report `CheckoutError::Configuration` when the store
/// rejects our credentials and `CheckoutError::Transient` for anything a
/// retry or a local fallback could absorb.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write `document` at `path`, replacing whatever was there.
    async fn set(&self, path: &str, document: &Value) -> Result<()>;

    /// Read the document at `path`; `None` when absent.
    async fn get(&self, path: &str) -> Result<Option<Value>>;
}

/// Replace `{".sv": "timestamp"}` sentinels with `now_millis`, the way the
/// realtime database does on write.
pub fn resolve_server_values(value: &mut Value, now_millis: i64) {
    match value {
        Value::Object(map) => {
            let is_timestamp_sentinel = map.len() == 1
                && map.get(".sv").and_then(Value::as_str) == Some("timestamp");
            if is_timestamp_sentinel {
                *value = Value::from(now_millis);
            } else {
                for child in map.values_mut() {
                    resolve_server_values(child, now_millis);
                }
            }
        }
        Value::Array(items) => {
            for child in items {
                resolve_server_values(child, now_millis);
            }
        }
        _ => {}
    }
}
