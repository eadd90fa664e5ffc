mod approve;
mod codes;
mod subscribe;

pub use approve::*;
pub use codes::*;
pub use subscribe::*;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    remote_store: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        remote_store: state.checkout.has_remote_store(),
    })
}

#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub plan_type: String,
    pub name: String,
    pub price: String,
    pub days: u32,
    pub provider_plan_id: String,
}

pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<PlanSummary>> {
    let plans = state
        .checkout
        .catalog()
        .iter()
        .map(|(plan_type, plan)| PlanSummary {
            plan_type: plan_type.to_string(),
            name: plan.name.clone(),
            price: plan.price.clone(),
            days: plan.days,
            provider_plan_id: plan.provider_plan_id.clone(),
        })
        .collect();
    Json(plans)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/plans", get(list_plans))
        .route("/subscribe", post(create_subscription))
        .route("/approve", post(approve_subscription))
        .route("/codes/{code}", get(get_code_status))
}
