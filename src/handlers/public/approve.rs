use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::checkout::CheckoutOutcome;
use crate::error::Result;
use crate::extractors::{ClientAddr, Json};
use crate::handlers::AppState;
use crate::models::ClientInfo;
use crate::presenter::{PresenterEvent, RecordingPresenter};

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub plan_type: String,
    pub subscription_id: String,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    #[serde(flatten)]
    pub outcome: CheckoutOutcome,
    /// Everything the session asked to show, in order
    pub events: Vec<PresenterEvent>,
}

/// Issue a code for a subscription the buyer approved at the provider. The
/// subscription is confirmed with the provider before anything is issued.
pub async fn approve_subscription(
    State(state): State<AppState>,
    ClientAddr(client_ip): ClientAddr,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>> {
    let presenter = Arc::new(RecordingPresenter::new());
    let mut session = state
        .checkout
        .session(presenter.clone())
        .with_client_ip(client_ip);

    let outcome = session
        .approve(
            &request.plan_type,
            &request.subscription_id,
            request.client_info.as_ref(),
        )
        .await?;

    Ok(Json(ApproveResponse {
        outcome,
        events: presenter.events(),
    }))
}
