use axum::extract::State;

use crate::checkout::CodeStatus;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::handlers::AppState;

pub async fn get_code_status(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CodeStatus>> {
    let status = state.checkout.code_status(&code).await?;
    Ok(Json(status))
}
