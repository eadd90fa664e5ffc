use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{PaymentWidget, Subscription};
use crate::error::{CheckoutError, Result};
use crate::plans::PlanConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayPalMode {
    #[default]
    Sandbox,
    Live,
}

impl PayPalMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sandbox" | "test" => Some(Self::Sandbox),
            "live" | "production" => Some(Self::Live),
            _ => None,
        }
    }

    pub fn api_base(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub mode: PayPalMode,
    pub brand_name: String,
    pub locale: String,
}

#[derive(Debug, Serialize)]
struct CreateSubscriptionRequest<'a> {
    plan_id: &'a str,
    application_context: ApplicationContext<'a>,
}

#[derive(Debug, Serialize)]
struct ApplicationContext<'a> {
    brand_name: &'a str,
    locale: &'a str,
    shipping_preference: &'static str,
    user_action: &'static str,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    id: String,
    status: String,
    #[serde(default)]
    plan_id: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

impl From<SubscriptionResponse> for Subscription {
    fn from(response: SubscriptionResponse) -> Self {
        let approve_url = response
            .links
            .into_iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href);
        Self {
            id: response.id,
            status: response.status,
            plan_id: response.plan_id,
            approve_url,
        }
    }
}

/// PayPal Subscriptions API client.
#[derive(Debug, Clone)]
pub struct PayPalSubscriptions {
    client: Client,
    config: PayPalConfig,
    api_base: String,
}

impl PayPalSubscriptions {
    pub fn new(config: PayPalConfig) -> Self {
        let api_base = config.mode.api_base().to_string();
        Self::with_api_base(config, api_base)
    }

    /// Point the client at a different API host.
    pub fn with_api_base(config: PayPalConfig, api_base: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn subscription_request<'a>(&'a self, plan: &'a PlanConfig) -> CreateSubscriptionRequest<'a> {
        CreateSubscriptionRequest {
            plan_id: &plan.provider_plan_id,
            application_context: ApplicationContext {
                brand_name: &self.config.brand_name,
                locale: &self.config.locale,
                shipping_preference: "NO_SHIPPING",
                user_action: "SUBSCRIBE_NOW",
            },
        }
    }

    fn map_status(status: StatusCode, body: &str) -> CheckoutError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CheckoutError::configuration(format!("PayPal rejected credentials ({})", status))
            }
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                CheckoutError::validation(format!("PayPal rejected the request: {}", body))
            }
            StatusCode::NOT_FOUND => CheckoutError::NotFound("PayPal subscription".to_string()),
            _ => CheckoutError::transient(format!("PayPal API returned {}: {}", status, body)),
        }
    }

    async fn subscription_from(response: reqwest::Response) -> Result<Subscription> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }

        let subscription: SubscriptionResponse = response.json().await.map_err(|e| {
            CheckoutError::transient(format!("Failed to parse PayPal response: {}", e))
        })?;
        Ok(subscription.into())
    }

    async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CheckoutError::transient(format!("PayPal token request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::transient(format!("PayPal token response: {}", e)))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentWidget for PayPalSubscriptions {
    fn is_available(&self) -> bool {
        !self.config.client_id.trim().is_empty() && !self.config.client_secret.trim().is_empty()
    }

    async fn create_subscription(&self, plan: &PlanConfig) -> Result<Subscription> {
        tracing::info!(plan = %plan.name, "Creating PayPal subscription");
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!("{}/v1/billing/subscriptions", self.api_base))
            .bearer_auth(token)
            .json(&self.subscription_request(plan))
            .send()
            .await
            .map_err(|e| CheckoutError::transient(format!("PayPal subscription request: {}", e)))?;

        Self::subscription_from(response).await
    }

    async fn get_subscription(&self, id: &str) -> Result<Subscription> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!("{}/v1/billing/subscriptions/{}", self.api_base, id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CheckoutError::transient(format!("PayPal subscription lookup: {}", e)))?;

        let subscription = Self::subscription_from(response).await?;
        tracing::debug!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Fetched PayPal subscription"
        );
        Ok(subscription)
    }
}
