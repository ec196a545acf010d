//! Rebalance workflow endpoints
//!
//! Every selection endpoint answers with the updated session snapshot, so a
//! client can re-render from the response alone.

use super::{respond, ApiState};
use crate::{node::ChannelId, RebalanceError, RebalanceResult};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;

/// Select a channel by ID
#[derive(Debug, Deserialize)]
pub struct ChannelSelectRequest {
    /// Channel ID as listed by the node
    pub channel_id: String,
}

impl ChannelSelectRequest {
    fn channel_id(&self) -> RebalanceResult<ChannelId> {
        let id = self.channel_id.trim();
        if id.is_empty() {
            return Err(RebalanceError::Validation(
                "channel_id must not be empty".to_string(),
            ));
        }
        Ok(ChannelId::from(id))
    }
}

/// Set or clear the amount
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    /// Amount in satoshis, `null` or `0` to clear
    pub amount: Option<u64>,
}

/// Set or clear the fee ceiling
#[derive(Debug, Deserialize)]
pub struct MaxFeeRequest {
    /// Fee ceiling in satoshis, `null` to search all routes
    pub max_fee: Option<u64>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> RebalanceResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| RebalanceError::Validation(rejection.body_text()))
}

async fn with_snapshot(state: &ApiState, result: RebalanceResult<()>) -> impl IntoResponse {
    let result = match result {
        Ok(()) => Ok(state.app.session.snapshot().await),
        Err(e) => Err(e),
    };
    respond(result)
}

/// Current session snapshot
pub async fn get_session(State(state): State<ApiState>) -> impl IntoResponse {
    with_snapshot(&state, Ok(())).await
}

/// Re-check the node version and reload channels
pub async fn refresh_session(State(state): State<ApiState>) -> impl IntoResponse {
    info!("API: Refresh rebalance session");
    state.app.session.refresh().await;
    with_snapshot(&state, Ok(())).await
}

/// Choose the outgoing channel
pub async fn choose_outgoing(
    State(state): State<ApiState>,
    payload: Result<Json<ChannelSelectRequest>, JsonRejection>,
) -> impl IntoResponse {
    let result = match body(payload).and_then(|req| req.channel_id()) {
        Ok(id) => {
            info!("API: Choose outgoing channel {}", id);
            state.app.session.choose_outgoing(&id).await
        }
        Err(e) => Err(e),
    };
    with_snapshot(&state, result).await
}

/// Clear the outgoing and incoming channels
pub async fn reset_outgoing(State(state): State<ApiState>) -> impl IntoResponse {
    let result = state.app.session.reset_outgoing().await;
    with_snapshot(&state, result).await
}

/// Choose the incoming channel
pub async fn choose_incoming(
    State(state): State<ApiState>,
    payload: Result<Json<ChannelSelectRequest>, JsonRejection>,
) -> impl IntoResponse {
    let result = match body(payload).and_then(|req| req.channel_id()) {
        Ok(id) => {
            info!("API: Choose incoming channel {}", id);
            state.app.session.choose_incoming(&id).await
        }
        Err(e) => Err(e),
    };
    with_snapshot(&state, result).await
}

/// Clear the incoming channel
pub async fn reset_incoming(State(state): State<ApiState>) -> impl IntoResponse {
    let result = state.app.session.reset_incoming().await;
    with_snapshot(&state, result).await
}

/// Set the amount to move
pub async fn set_amount(
    State(state): State<ApiState>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> impl IntoResponse {
    let result = match body(payload) {
        Ok(req) => state.app.session.set_amount(req.amount).await,
        Err(e) => Err(e),
    };
    with_snapshot(&state, result).await
}

/// Set the fee ceiling
pub async fn set_max_fee(
    State(state): State<ApiState>,
    payload: Result<Json<MaxFeeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let result = match body(payload) {
        Ok(req) => state.app.session.set_max_fee(req.max_fee).await,
        Err(e) => Err(e),
    };
    with_snapshot(&state, result).await
}

/// Clear the whole selection
pub async fn reset_session(State(state): State<ApiState>) -> impl IntoResponse {
    info!("API: Reset rebalance selection");
    let result = state.app.session.reset_all().await;
    with_snapshot(&state, result).await
}

/// Start the rebalance
pub async fn start_rebalance(State(state): State<ApiState>) -> impl IntoResponse {
    info!("API: Start rebalance");
    respond(state.app.session.start().await)
}

/// Cancel the in-flight rebalance
pub async fn cancel_rebalance(State(state): State<ApiState>) -> impl IntoResponse {
    info!("API: Cancel rebalance");
    respond(state.app.session.cancel().await)
}
