//! Activation record persistence.
//!
//! Writes go to the remote [`DocumentStore`] first. When the remote write
//! fails transiently the record lands in the [`OfflineLedger`] instead and the
//! caller still sees success. Credential or setup problems are surfaced as
//! `CheckoutError::Configuration` and disable the store for the rest of its
//! life.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;

use crate::code::CodeGrammar;
use crate::config::Config;
use crate::crypto::IpHasher;
use crate::error::{CheckoutError, Result, msg};
use crate::models::{
    ActivationRecord, ClientInfo, IssuedSubscription, NewActivation, OfflineActivation,
    TransactionLog, new_log_id,
};
use crate::plans::PlanConfig;
use crate::storage::OfflineLedger;
use crate::store::{
    DocumentStore, RealtimeDatabase, activation_code_path, issued_subscription_path,
    transaction_log_path,
};
use crate::util::{ExpiryPolicy, is_safe_key, mask_code};

/// Where a stored record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Remote,
    /// Remote write failed; held in the local ledger
    Offline,
}

#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    pub app_name: String,
    pub expiry: ExpiryPolicy,
    pub grammar: CodeGrammar,
}

impl PersistenceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.app_name.clone(),
            expiry: config.expiry,
            grammar: config.issuer.grammar,
        }
    }
}

/// One activation to persist.
#[derive(Debug, Clone, Copy)]
pub struct StoreRequest<'a> {
    pub code: &'a str,
    pub plan_type: &'a str,
    pub subscription_id: &'a str,
    pub plan: &'a PlanConfig,
    pub client_info: Option<&'a ClientInfo>,
    /// Caller address, hashed into `IPHash`
    pub client_ip: Option<IpAddr>,
}

pub struct ActivationStore {
    remote: Arc<dyn DocumentStore>,
    ledger: Arc<OfflineLedger>,
    ip_hasher: IpHasher,
    options: PersistenceOptions,
    disabled: AtomicBool,
}

impl ActivationStore {
    pub fn new(
        remote: Arc<dyn DocumentStore>,
        ledger: Arc<OfflineLedger>,
        ip_hasher: IpHasher,
        options: PersistenceOptions,
    ) -> Self {
        Self {
            remote,
            ledger,
            ip_hasher,
            options,
            disabled: AtomicBool::new(false),
        }
    }

    /// Connect to the realtime database named in `config`.
    pub fn connect(config: &Config, ledger: Arc<OfflineLedger>) -> Result<Self> {
        let realtime = config
            .realtime
            .as_ref()
            .ok_or_else(|| CheckoutError::configuration("Realtime database is not configured"))?;
        let remote = RealtimeDatabase::connect(realtime)?;
        let ip_hasher = if config.ip_hashing {
            IpHasher::new(config.ip_hash_salt.clone())
        } else {
            IpHasher::disabled()
        };

        Ok(Self::new(
            Arc::new(remote),
            ledger,
            ip_hasher,
            PersistenceOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> &PersistenceOptions {
        &self.options
    }

    pub fn ledger(&self) -> &OfflineLedger {
        &self.ledger
    }

    /// Whether a configuration error has shut this store down.
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_disabled() {
            return Err(CheckoutError::configuration(
                "Activation store disabled after a configuration error",
            ));
        }
        Ok(())
    }

    fn disable(&self, err: &CheckoutError) {
        if !self.disabled.swap(true, Ordering::Relaxed) {
            tracing::error!("Disabling activation store: {}", err);
        }
    }

    /// Persist one activation record.
    ///
    /// Inputs are validated before anything is written. A transient remote
    /// failure diverts the record to the offline ledger; a configuration
    /// failure is returned.
    pub async fn store(&self, request: StoreRequest<'_>) -> Result<StoreOutcome> {
        if !self.options.grammar.matches(request.code) {
            return Err(CheckoutError::validation(format!(
                "{}: {}",
                msg::INVALID_CODE,
                mask_code(request.code)
            )));
        }
        if request.subscription_id.trim().is_empty() {
            return Err(CheckoutError::validation(msg::MISSING_SUBSCRIPTION_ID));
        }
        if !is_safe_key(request.subscription_id) {
            return Err(CheckoutError::validation(msg::INVALID_SUBSCRIPTION_ID));
        }
        if request.plan_type.trim().is_empty() {
            return Err(CheckoutError::validation(msg::UNKNOWN_PLAN));
        }
        self.ensure_enabled()?;

        let now = Utc::now();
        let record = ActivationRecord::new(NewActivation {
            plan_type: request.plan_type,
            subscription_id: request.subscription_id,
            plan: request.plan,
            app: &self.options.app_name,
            issued_at: now,
            expiry: self.options.expiry,
            client_info: request.client_info,
            ip_hash: self.ip_hasher.fingerprint(request.client_ip),
        });
        let document = serde_json::to_value(&record)?;

        match self
            .remote
            .set(&activation_code_path(request.code), &document)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    code = %mask_code(request.code),
                    plan_type = request.plan_type,
                    "Activation code stored"
                );
                self.mark_issued(&request).await;
                self.log_transaction(&request).await;
                Ok(StoreOutcome::Remote)
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    code = %mask_code(request.code),
                    "Remote store failed, keeping activation offline: {}",
                    e
                );
                self.ledger.append(OfflineActivation {
                    code: request.code.to_string(),
                    record: record.with_client_clock(now),
                    offline: true,
                })?;
                Ok(StoreOutcome::Offline)
            }
            Err(e) => {
                if matches!(e, CheckoutError::Configuration(_)) {
                    self.disable(&e);
                }
                Err(e)
            }
        }
    }

    /// Whether `code` is already taken, remotely or in the offline ledger.
    ///
    /// Read failures count as "not taken".
    pub async fn exists(&self, code: &str) -> bool {
        if self.ledger.contains(code) {
            return true;
        }
        if self.is_disabled() {
            return false;
        }

        match self.remote.get(&activation_code_path(code)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(code = %mask_code(code), "Existence check failed: {}", e);
                if matches!(e, CheckoutError::Configuration(_)) {
                    self.disable(&e);
                }
                false
            }
        }
    }

    /// Whether a code was already issued for `subscription_id`, remotely or
    /// in the offline ledger. Read failures count as "not issued".
    pub async fn already_issued(&self, subscription_id: &str) -> bool {
        if self.ledger.issued_for(subscription_id) {
            return true;
        }
        if self.is_disabled() || !is_safe_key(subscription_id) {
            return false;
        }

        match self.remote.get(&issued_subscription_path(subscription_id)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(subscription_id, "Issued subscription check failed: {}", e);
                if matches!(e, CheckoutError::Configuration(_)) {
                    self.disable(&e);
                }
                false
            }
        }
    }

    /// Read the stored record for `code`, if any.
    pub async fn fetch(&self, code: &str) -> Result<Option<ActivationRecord>> {
        self.ensure_enabled()?;
        match self.remote.get(&activation_code_path(code)).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Best effort, like the transaction log.
    async fn mark_issued(&self, request: &StoreRequest<'_>) {
        let marker = IssuedSubscription::new(request.code, request.plan_type);
        let result = match serde_json::to_value(&marker) {
            Ok(document) => {
                self.remote
                    .set(&issued_subscription_path(request.subscription_id), &document)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(
                subscription_id = request.subscription_id,
                "Failed to mark subscription as issued: {}",
                e
            );
        }
    }

    /// Best-effort audit entry; failures are only logged.
    async fn log_transaction(&self, request: &StoreRequest<'_>) {
        let now = Utc::now();
        let entry = TransactionLog::completed(
            request.code,
            request.plan,
            request.subscription_id,
            &self.options.app_name,
            request.client_info,
            now,
        );

        let document = match serde_json::to_value(&entry) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Failed to serialize transaction log: {}", e);
                return;
            }
        };

        let path = transaction_log_path(&new_log_id(now));
        if let Err(e) = self.remote.set(&path, &document).await {
            tracing::warn!(code = %entry.code, "Failed to write transaction log: {}", e);
        }
    }
}

impl std::fmt::Debug for ActivationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationStore")
            .field("options", &self.options)
            .field("disabled", &self.is_disabled())
            .finish()
    }
}
