pub mod public;

use std::sync::Arc;

use axum::Router;

use crate::checkout::Checkout;

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<Checkout>,
    /// Client address comes from `X-Forwarded-For` instead of the socket
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(checkout: Checkout) -> Self {
        Self::shared(Arc::new(checkout))
    }

    pub fn shared(checkout: Arc<Checkout>) -> Self {
        Self {
            checkout,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trusted_proxy(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}

/// All HTTP routes, state applied.
pub fn router(state: AppState) -> Router {
    Router::new().merge(public::router()).with_state(state)
}
