use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::extractors::Json;
use crate::handlers::AppState;
use crate::presenter::TracingPresenter;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan_type: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub subscription_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approve_url: Option<String>,
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>> {
    let mut session = state.checkout.session(Arc::new(TracingPresenter));

    // A fresh session never debounces
    let subscription = session
        .subscribe(&request.plan_type)
        .await?
        .ok_or_else(|| CheckoutError::Internal("subscribe request was debounced".into()))?;

    Ok(Json(SubscribeResponse {
        subscription_id: subscription.id,
        status: subscription.status,
        approve_url: subscription.approve_url,
    }))
}
