use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use voya_gateway::ReturnOutcome;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ReturnResponse {
    outcome: ReturnOutcome,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/return", get(payment_return))
}

/// Landing point for the partner's redirect back to us. The raw query is
/// handed to the gateway verbatim; provider-specific extras ride along
/// into the audit record.
async fn payment_return(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Json<ReturnResponse>, AppError> {
    let params: BTreeMap<String, String> = raw.into_iter().collect();

    let outcome = state.gateway.handle_return(&params).await?;
    if outcome == ReturnOutcome::InvalidSignature {
        return Err(AppError::SignatureRejected);
    }
    Ok(Json(ReturnResponse { outcome }))
}
