//! Checkout flow: subscription creation, approval, code issuance.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::code::{ActivationCode, CodeIssuer, IssuerOptions};
use crate::config::Config;
use crate::error::{CheckoutError, Result, msg};
use crate::models::{ActivationRecord, ClientInfo, NewActivation, OfflineActivation};
use crate::payments::{PayPalSubscriptions, PaymentWidget, Subscription, wait_for_widget};
use crate::persistence::{ActivationStore, StoreOutcome, StoreRequest};
use crate::plans::{PlanCatalog, PlanConfig};
use crate::presenter::Presenter;
use crate::storage::{FileStorage, OfflineLedger};
use crate::util::{ExpiryPolicy, is_safe_key, mask_code};

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub app_name: String,
    pub expiry: ExpiryPolicy,
    pub support_email: String,
    pub widget_timeout: Duration,
    /// Subscribe requests closer together than this are ignored
    pub click_debounce: Duration,
}

impl CheckoutSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.app_name.clone(),
            expiry: config.expiry,
            support_email: config.support_email.clone(),
            widget_timeout: config.widget_timeout,
            click_debounce: config.click_debounce,
        }
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            app_name: "App-Animes".to_string(),
            expiry: ExpiryPolicy::default(),
            support_email: "support@example.com".to_string(),
            widget_timeout: Duration::from_secs(10),
            click_debounce: Duration::from_secs(3),
        }
    }
}

/// Where an issued code was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    Remote,
    /// Remote write failed transiently; held in the local ledger
    Offline,
    /// Remote store unusable for this session; issued without it
    LocalOnly,
}

impl From<StoreOutcome> for Persistence {
    fn from(outcome: StoreOutcome) -> Self {
        match outcome {
            StoreOutcome::Remote => Self::Remote,
            StoreOutcome::Offline => Self::Offline,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub session_id: Uuid,
    pub code: ActivationCode,
    pub plan_type: String,
    pub plan: PlanConfig,
    pub persistence: Persistence,
    /// Shown to the buyer next to the code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSource {
    Remote,
    Offline,
}

/// What is known about an issued code.
#[derive(Debug, Clone, Serialize)]
pub struct CodeStatus {
    pub code: String,
    pub source: CodeSource,
    pub plan_type: String,
    pub plan: String,
    pub is_used: bool,
    pub expires_at: i64,
}

impl CodeStatus {
    fn from_record(code: &str, source: CodeSource, record: &ActivationRecord) -> Self {
        Self {
            code: code.to_string(),
            source,
            plan_type: record.plan_type.clone(),
            plan: record.plan.clone(),
            is_used: record.is_used,
            expires_at: record.expires_at,
        }
    }
}

/// Shared, immutable checkout service. Per-buyer state lives in
/// [`CheckoutSession`].
pub struct Checkout {
    catalog: PlanCatalog,
    issuer: CodeIssuer,
    store: Option<Arc<ActivationStore>>,
    ledger: Arc<OfflineLedger>,
    widget: Option<Arc<dyn PaymentWidget>>,
    settings: CheckoutSettings,
}

impl Checkout {
    pub fn new(
        catalog: PlanCatalog,
        issuer_options: IssuerOptions,
        store: Option<Arc<ActivationStore>>,
        ledger: Arc<OfflineLedger>,
        widget: Option<Arc<dyn PaymentWidget>>,
        settings: CheckoutSettings,
    ) -> Self {
        let issuer = CodeIssuer::new(&catalog, issuer_options);
        Self {
            catalog,
            issuer,
            store,
            ledger,
            widget,
            settings,
        }
    }

    /// Wire everything from `config`.
    ///
    /// A missing or invalid realtime database is not fatal: the checkout
    /// runs local-only and says so in the logs.
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = config.load_catalog()?;
        catalog.validate()?;
        config.issuer.validate()?;

        let storage = FileStorage::new(&config.offline_store_dir)?;
        tracing::info!(path = %storage.path().display(), "Offline ledger ready");
        let ledger = Arc::new(OfflineLedger::new(Box::new(storage)));

        let store = match ActivationStore::connect(config, ledger.clone()) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::error!("Realtime database unavailable, codes will be issued locally: {}", e);
                None
            }
        };

        let widget = match &config.paypal {
            Some(paypal) => {
                tracing::info!(mode = ?paypal.mode, "PayPal subscriptions enabled");
                Some(Arc::new(PayPalSubscriptions::new(paypal.clone())) as Arc<dyn PaymentWidget>)
            }
            None => {
                tracing::warn!("PayPal is not configured, subscriptions cannot be created");
                None
            }
        };

        Ok(Self::new(
            catalog,
            config.issuer,
            store,
            ledger,
            widget,
            CheckoutSettings::from_config(config),
        ))
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn issuer(&self) -> &CodeIssuer {
        &self.issuer
    }

    pub fn ledger(&self) -> &OfflineLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    pub fn has_remote_store(&self) -> bool {
        self.store.as_ref().is_some_and(|store| !store.is_disabled())
    }

    pub fn session(self: &Arc<Self>, presenter: Arc<dyn Presenter>) -> CheckoutSession {
        CheckoutSession::new(self.clone(), presenter)
    }

    /// Look up an issued code, remote store first, then the offline ledger.
    pub async fn code_status(&self, code: &str) -> Result<CodeStatus> {
        let code = ActivationCode::parse(code, self.issuer.grammar())?;

        if let Some(store) = &self.store
            && !store.is_disabled()
        {
            match store.fetch(code.as_str()).await {
                Ok(Some(record)) => {
                    return Ok(CodeStatus::from_record(
                        code.as_str(),
                        CodeSource::Remote,
                        &record,
                    ));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(code = %code.masked(), "Remote lookup failed: {}", e),
            }
        }

        self.ledger
            .entries()
            .iter()
            .find(|entry| entry.code == code.as_str())
            .map(|entry| CodeStatus::from_record(code.as_str(), CodeSource::Offline, &entry.record))
            .ok_or_else(|| CheckoutError::NotFound(format!("Activation code {}", code.masked())))
    }
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("plans", &self.catalog.plans.len())
            .field("remote_store", &self.store.is_some())
            .field("widget", &self.widget.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

/// One buyer's checkout.
pub struct CheckoutSession {
    id: Uuid,
    checkout: Arc<Checkout>,
    presenter: Arc<dyn Presenter>,
    attempts: u32,
    current_transaction: Option<String>,
    local_only: bool,
    last_subscribe: Option<Instant>,
    client_ip: Option<IpAddr>,
}

impl CheckoutSession {
    pub fn new(checkout: Arc<Checkout>, presenter: Arc<dyn Presenter>) -> Self {
        let local_only = !checkout.has_remote_store();
        Self {
            id: Uuid::new_v4(),
            checkout,
            presenter,
            attempts: 0,
            current_transaction: None,
            local_only,
            last_subscribe: None,
            client_ip: None,
        }
    }

    /// Address of the buyer, when known.
    pub fn with_client_ip(mut self, client_ip: Option<IpAddr>) -> Self {
        self.client_ip = client_ip;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Codes generated so far in this session, collisions included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_transaction(&self) -> Option<&str> {
        self.current_transaction.as_deref()
    }

    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// Create a subscription for `plan_type` through the payment widget.
    ///
    /// Returns `Ok(None)` when the request lands inside the click debounce
    /// window of the previous one.
    pub async fn subscribe(&mut self, plan_type: &str) -> Result<Option<Subscription>> {
        let now = Instant::now();
        if let Some(last) = self.last_subscribe
            && now.duration_since(last) < self.checkout.settings.click_debounce
        {
            tracing::debug!(session_id = %self.id, "Ignoring repeated subscribe request");
            return Ok(None);
        }
        self.last_subscribe = Some(now);

        let result = self.create_subscription(plan_type).await;
        if let Err(e) = &result {
            tracing::warn!(session_id = %self.id, plan_type, "Subscription failed: {}", e);
            self.presenter.show_error(&self.user_message(e));
        }
        result.map(Some)
    }

    async fn create_subscription(&mut self, plan_type: &str) -> Result<Subscription> {
        let plan = self
            .checkout
            .catalog
            .get(plan_type)
            .ok_or_else(|| CheckoutError::validation(msg::UNKNOWN_PLAN))?;
        let widget = self
            .checkout
            .widget
            .as_ref()
            .ok_or_else(|| CheckoutError::configuration("Payment widget is not configured"))?;

        wait_for_widget(widget.as_ref(), self.checkout.settings.widget_timeout).await?;

        self.presenter.show_loading(msg::CREATING_SUBSCRIPTION);
        let result = widget.create_subscription(plan).await;
        self.presenter.hide_loading();

        let subscription = result?;
        tracing::info!(
            session_id = %self.id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Subscription created"
        );
        self.current_transaction = Some(subscription.id.clone());
        Ok(subscription)
    }

    /// Handle an approved subscription: confirm it with the payment provider,
    /// then issue, persist and display a code. At most one code is issued per
    /// subscription.
    pub async fn approve(
        &mut self,
        plan_type: &str,
        subscription_id: &str,
        client_info: Option<&ClientInfo>,
    ) -> Result<CheckoutOutcome> {
        self.presenter.show_loading(msg::GENERATING_CODE);
        let result = self.issue_and_store(plan_type, subscription_id, client_info).await;
        self.presenter.hide_loading();

        match &result {
            Ok(outcome) => {
                self.presenter.display_code(&outcome.code, &outcome.plan);
                if let Some(notice) = &outcome.notice {
                    self.presenter.show_error(notice);
                }
            }
            Err(e) => {
                tracing::error!(session_id = %self.id, plan_type, "Activation failed: {}", e);
                self.presenter.show_error(&self.user_message(e));
            }
        }
        result
    }

    async fn issue_and_store(
        &mut self,
        plan_type: &str,
        subscription_id: &str,
        client_info: Option<&ClientInfo>,
    ) -> Result<CheckoutOutcome> {
        let plan = self
            .checkout
            .catalog
            .get(plan_type)
            .cloned()
            .ok_or_else(|| CheckoutError::validation(msg::UNKNOWN_PLAN))?;
        let subscription_id = subscription_id.trim();
        if subscription_id.is_empty() {
            return Err(CheckoutError::validation(msg::MISSING_SUBSCRIPTION_ID));
        }
        if !is_safe_key(subscription_id) {
            return Err(CheckoutError::validation(msg::INVALID_SUBSCRIPTION_ID));
        }
        self.current_transaction = Some(subscription_id.to_string());

        self.verify_payment(&plan, subscription_id).await?;

        let store = if self.local_only {
            None
        } else {
            self.checkout.store.clone()
        };

        let already_issued = match &store {
            Some(store) => store.already_issued(subscription_id).await,
            None => self.checkout.ledger.issued_for(subscription_id),
        };
        if already_issued {
            tracing::warn!(
                session_id = %self.id,
                subscription_id,
                "Subscription already has a code"
            );
            return Err(CheckoutError::Conflict(msg::ALREADY_ISSUED.to_string()));
        }

        let Some(store) = store else {
            return self.issue_locally(plan_type, plan, subscription_id, client_info);
        };

        let max_attempts = self.checkout.issuer.options().max_attempts;
        let mut last_collision = None;
        for _ in 0..max_attempts {
            self.attempts += 1;
            let code = self.checkout.issuer.issue(plan_type)?;

            if store.exists(code.as_str()).await {
                tracing::warn!(session_id = %self.id, code = %code.masked(), "Code collision, regenerating");
                last_collision = Some(code);
                continue;
            }

            let request = StoreRequest {
                code: code.as_str(),
                plan_type,
                subscription_id,
                plan: &plan,
                client_info,
                client_ip: self.client_ip,
            };
            match store.store(request).await {
                Ok(outcome) => {
                    return Ok(self.outcome(code, plan_type, plan, outcome.into(), None));
                }
                Err(e @ CheckoutError::Validation(_)) => return Err(e),
                Err(e) => {
                    if matches!(e, CheckoutError::Configuration(_)) {
                        self.local_only = true;
                    }
                    tracing::error!(
                        session_id = %self.id,
                        "Could not persist activation, issuing locally: {}",
                        e
                    );
                    return self.issue_locally(plan_type, plan, subscription_id, client_info);
                }
            }
        }

        Err(collision_error(last_collision))
    }

    /// Ask the payment provider whether `subscription_id` pays for `plan`.
    async fn verify_payment(&self, plan: &PlanConfig, subscription_id: &str) -> Result<()> {
        let widget = self
            .checkout
            .widget
            .as_ref()
            .ok_or_else(|| CheckoutError::configuration("Payment widget is not configured"))?;

        let subscription = match widget.get_subscription(subscription_id).await {
            Ok(subscription) => subscription,
            Err(CheckoutError::NotFound(_)) => {
                tracing::warn!(session_id = %self.id, subscription_id, "Unknown subscription");
                return Err(CheckoutError::validation(msg::SUBSCRIPTION_NOT_APPROVED));
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = subscription.ensure_pays_for(plan) {
            tracing::warn!(
                session_id = %self.id,
                subscription_id,
                status = %subscription.status,
                "Subscription does not pay for this plan: {}",
                e
            );
            return Err(e);
        }
        Ok(())
    }

    /// Issue without the remote store, keeping a copy in the offline ledger.
    fn issue_locally(
        &mut self,
        plan_type: &str,
        plan: PlanConfig,
        subscription_id: &str,
        client_info: Option<&ClientInfo>,
    ) -> Result<CheckoutOutcome> {
        let ledger = self.checkout.ledger.clone();
        let code = self.issue_unused(plan_type, |code| ledger.contains(code.as_str()))?;
        let now = Utc::now();
        let settings = &self.checkout.settings;

        let record = ActivationRecord::new(NewActivation {
            plan_type,
            subscription_id,
            plan: &plan,
            app: &settings.app_name,
            issued_at: now,
            expiry: settings.expiry,
            client_info,
            ip_hash: None,
        })
        .with_client_clock(now);

        if let Err(e) = self.checkout.ledger.append(OfflineActivation {
            code: code.to_string(),
            record,
            offline: true,
        }) {
            tracing::error!(code = %code.masked(), "Failed to keep locally issued code: {}", e);
        }
        tracing::warn!(session_id = %self.id, code = %code.masked(), "Activation code issued locally");

        let notice = format!(
            "Your code was issued without a server connection. If the app does not accept it, \
             contact {} with subscription id {}.",
            settings.support_email, subscription_id
        );
        Ok(self.outcome(code, plan_type, plan, Persistence::LocalOnly, Some(notice)))
    }

    /// Issue codes until one is not `taken`, within the issuer's attempt budget.
    fn issue_unused(
        &mut self,
        plan_type: &str,
        taken: impl Fn(&ActivationCode) -> bool,
    ) -> Result<ActivationCode> {
        let max_attempts = self.checkout.issuer.options().max_attempts;
        let mut last_collision = None;
        for _ in 0..max_attempts {
            self.attempts += 1;
            let code = self.checkout.issuer.issue(plan_type)?;
            if !taken(&code) {
                return Ok(code);
            }
            tracing::warn!(
                session_id = %self.id,
                code = %code.masked(),
                "Code already held locally, regenerating"
            );
            last_collision = Some(code);
        }
        Err(collision_error(last_collision))
    }

    fn outcome(
        &self,
        code: ActivationCode,
        plan_type: &str,
        plan: PlanConfig,
        persistence: Persistence,
        notice: Option<String>,
    ) -> CheckoutOutcome {
        CheckoutOutcome {
            session_id: self.id,
            code,
            plan_type: plan_type.to_string(),
            plan,
            persistence,
            notice,
        }
    }

    fn user_message(&self, err: &CheckoutError) -> String {
        match err {
            CheckoutError::Validation(message) | CheckoutError::Conflict(message) => {
                message.clone()
            }
            CheckoutError::Configuration(_) => msg::SERVICE_UNAVAILABLE.to_string(),
            CheckoutError::GenerationCollision(_) | CheckoutError::Generation { .. } => format!(
                "{} Please contact {}{}.",
                msg::ISSUANCE_FAILED,
                self.checkout.settings.support_email,
                self.current_transaction
                    .as_deref()
                    .map(|id| format!(" with subscription id {}", mask_code(id)))
                    .unwrap_or_default()
            ),
            _ => msg::ISSUANCE_FAILED.to_string(),
        }
    }
}

fn collision_error(last_collision: Option<ActivationCode>) -> CheckoutError {
    CheckoutError::GenerationCollision(
        last_collision
            .map(|code| code.masked())
            .unwrap_or_default(),
    )
}

impl std::fmt::Debug for CheckoutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("id", &self.id)
            .field("attempts", &self.attempts)
            .field("current_transaction", &self.current_transaction)
            .field("local_only", &self.local_only)
            .finish()
    }
}
