//! Channel listing endpoint

use super::{respond, ApiState};
use crate::balance::{ChannelView, DirectoryStatus};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Channel list ordering
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    /// As returned by the node
    #[default]
    Node,
    /// Lowest balance ratio first
    Ratio,
}

/// Query parameters for the channel list
#[derive(Debug, Default, Deserialize)]
pub struct ChannelListParams {
    /// Ordering of the returned channels
    #[serde(default)]
    pub order: ChannelOrder,
}

/// Channel list response
#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    /// Directory status
    pub status: DirectoryStatus,
    /// Channels with their balance ratio
    pub channels: Vec<ChannelView>,
}

/// List the node's channels from the last refresh
pub async fn list_channels(
    State(state): State<ApiState>,
    Query(params): Query<ChannelListParams>,
) -> impl IntoResponse {
    info!("API: List channels request (order={:?})", params.order);

    let session = &state.app.session;
    let channels = session.channels().await;
    let mut views: Vec<ChannelView> = channels.iter().map(ChannelView::from).collect();
    if let ChannelOrder::Ratio = params.order {
        views.sort_by_key(|v| v.balance_ratio);
    }

    respond(Ok(ChannelListResponse {
        status: session.snapshot().await.directory,
        channels: views,
    }))
}
