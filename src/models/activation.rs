use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ClientInfo;
use crate::plans::PlanConfig;
use crate::util::{sanitize_text, ExpiryPolicy};

/// Placeholder the realtime database replaces with its own clock on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerValue {
    #[serde(rename = ".sv")]
    pub sv: String,
}

impl ServerValue {
    pub fn timestamp() -> Self {
        Self {
            sv: "timestamp".to_string(),
        }
    }
}

/// Creation time of a record: assigned by the server when written remotely,
/// taken from the client clock otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatedAt {
    Server(ServerValue),
    Millis(i64),
}

impl CreatedAt {
    pub fn server() -> Self {
        Self::Server(ServerValue::timestamp())
    }

    pub fn client(now: DateTime<Utc>) -> Self {
        Self::Millis(now.timestamp_millis())
    }
}

/// Document stored under `ActivationCodes/<code>`.
///
/// Field names are PascalCase because the consumer application that redeems
/// codes reads them as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivationRecord {
    pub is_used: bool,
    #[serde(rename = "Type")]
    pub plan_type: String,
    pub subscription_id: String,
    pub created_at: CreatedAt,
    pub plan: String,
    pub price: String,
    pub duration_days: u32,
    /// Set by the consumer application on redemption
    pub used_by: String,
    /// Set by the consumer application on redemption (millis, 0 = unused)
    pub used_date: i64,
    /// Millis since epoch
    pub expires_at: i64,
    pub app: String,
    /// ISO-8601 client time of issuance
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
    #[serde(rename = "IPHash", default, skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
}

/// Inputs for building an [`ActivationRecord`].
pub struct NewActivation<'a> {
    pub plan_type: &'a str,
    pub subscription_id: &'a str,
    pub plan: &'a PlanConfig,
    pub app: &'a str,
    pub issued_at: DateTime<Utc>,
    pub expiry: ExpiryPolicy,
    pub client_info: Option<&'a ClientInfo>,
    pub ip_hash: Option<String>,
}

impl ActivationRecord {
    /// Build a sanitized, unused record with a server-assigned creation time.
    pub fn new(input: NewActivation<'_>) -> Self {
        let expires_at = input
            .expiry
            .expires_at(input.issued_at, input.plan.days)
            .timestamp_millis();

        Self {
            is_used: false,
            plan_type: sanitize_text(input.plan_type),
            subscription_id: sanitize_text(input.subscription_id),
            created_at: CreatedAt::server(),
            plan: sanitize_text(&input.plan.name),
            price: sanitize_text(&input.plan.price),
            duration_days: input.plan.days,
            used_by: String::new(),
            used_date: 0,
            expires_at,
            app: sanitize_text(input.app),
            timestamp: input.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            client_info: input.client_info.map(ClientInfo::sanitized),
            ip_hash: input.ip_hash.map(|h| sanitize_text(&h)),
        }
    }

    /// Same record, stamped with the client clock for local storage.
    pub fn with_client_clock(mut self, now: DateTime<Utc>) -> Self {
        self.created_at = CreatedAt::client(now);
        self
    }
}

/// A record held in the local fallback store because the remote write failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineActivation {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(flatten)]
    pub record: ActivationRecord,
    pub offline: bool,
}
