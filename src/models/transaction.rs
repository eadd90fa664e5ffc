use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::{ClientInfo, CreatedAt};
use crate::plans::PlanConfig;
use crate::util::{mask_code, millis, sanitize_text, to_base36, truncate_chars};

const MAX_SUBSCRIPTION_ID_LEN: usize = 20;

pub const STATUS_COMPLETED: &str = "completed";

/// Audit entry stored under `TransactionLogs/<log id>` after a successful issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLog {
    /// Masked code, never the full value
    pub code: String,
    pub plan: String,
    pub price: String,
    pub subscription_id: String,
    pub timestamp: String,
    pub app: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
}

impl TransactionLog {
    pub fn completed(
        code: &str,
        plan: &PlanConfig,
        subscription_id: &str,
        app: &str,
        client: Option<&ClientInfo>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            code: mask_code(code),
            plan: sanitize_text(&plan.name),
            price: sanitize_text(&plan.price),
            subscription_id: sanitize_text(&truncate_chars(
                subscription_id,
                MAX_SUBSCRIPTION_ID_LEN,
            )),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            app: sanitize_text(app),
            status: STATUS_COMPLETED.to_string(),
            client: client.map(ClientInfo::sanitized),
        }
    }
}

/// Marker stored under `IssuedSubscriptions/<subscription id>` once a code
/// has been issued for that subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IssuedSubscription {
    /// Masked code
    pub code: String,
    #[serde(rename = "Type")]
    pub plan_type: String,
    pub created_at: CreatedAt,
}

impl IssuedSubscription {
    pub fn new(code: &str, plan_type: &str) -> Self {
        Self {
            code: mask_code(code),
            plan_type: sanitize_text(plan_type),
            created_at: CreatedAt::server(),
        }
    }
}

/// Log key: `<base36 millis>_<4 random base36 chars>`.
pub fn new_log_id(now: DateTime<Utc>) -> String {
    const CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect();
    format!("{}_{}", to_base36(millis(now)), suffix)
}
