mod paypal;

pub use paypal::*;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};

use crate::error::{CheckoutError, Result, msg};
use crate::plans::PlanConfig;

const WIDGET_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const STATUS_APPROVED: &str = "APPROVED";
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// A subscription as the payment provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    /// Provider plan the subscription was created for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Where the buyer approves the subscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_url: Option<String>,
}

impl Subscription {
    /// Approved by the buyer or already billing.
    pub fn is_paid(&self) -> bool {
        matches!(self.status.as_str(), STATUS_APPROVED | STATUS_ACTIVE)
    }

    /// Check that this subscription pays for `plan`.
    pub fn ensure_pays_for(&self, plan: &PlanConfig) -> Result<()> {
        if !self.is_paid() {
            return Err(CheckoutError::validation(msg::SUBSCRIPTION_NOT_APPROVED));
        }
        if self.plan_id.as_deref() != Some(plan.provider_plan_id.as_str()) {
            return Err(CheckoutError::validation(msg::SUBSCRIPTION_PLAN_MISMATCH));
        }
        Ok(())
    }
}

/// Payment provider collaborator. Approval comes back separately, carrying
/// the subscription id, and is confirmed with [`PaymentWidget::get_subscription`].
#[async_trait]
pub trait PaymentWidget: Send + Sync {
    /// Whether the widget is loaded and ready to create subscriptions.
    fn is_available(&self) -> bool;

    async fn create_subscription(&self, plan: &PlanConfig) -> Result<Subscription>;

    /// Current state of subscription `id` at the provider.
    async fn get_subscription(&self, id: &str) -> Result<Subscription>;
}

/// Poll `widget` until it is available or `timeout` elapses.
pub async fn wait_for_widget(widget: &dyn PaymentWidget, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if widget.is_available() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            tracing::error!(
                timeout_ms = timeout.as_millis() as u64,
                "Payment widget never became available"
            );
            return Err(CheckoutError::configuration(msg::WIDGET_TIMEOUT));
        }
        sleep(WIDGET_POLL_INTERVAL).await;
    }
}
