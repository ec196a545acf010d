//! Node REST client
//!
//! This module provides a client for LND-compatible nodes over the REST
//! gateway. A rebalance is a circular self-payment: the node creates an
//! invoice for itself and pays it through the outgoing channel, pinning the
//! incoming channel's partner as the last hop.

use crate::{
    config::{NodeConfig, RebalanceConfig},
    node::{
        Channel, ChannelFilter, ChannelId, NodeApi, NodeVersion, RebalanceReceipt,
        RebalanceReply, RebalanceRequest,
    },
    RebalanceError, RebalanceResult,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MACAROON_HEADER: &str = "grpc-metadata-macaroon";

fn map_transport_error(e: reqwest::Error) -> RebalanceError {
    if e.is_timeout() {
        RebalanceError::Transport("request to node timed out".to_string())
    } else {
        RebalanceError::Transport(e.to_string())
    }
}

/// REST client for the Lightning node
pub struct NodeClient {
    /// HTTP client with TLS and macaroon configured
    http: reqwest::Client,
    /// REST base URL
    base_url: String,
    /// Timeout for ordinary calls
    timeout: Duration,
    /// Timeout for the payment call of a rebalance
    payment_timeout: Duration,
    /// Memo attached to self-invoices
    invoice_memo: String,
    /// Expiry of self-invoices in seconds
    invoice_expiry: u64,
}

impl NodeClient {
    /// Build a client for the configured node
    pub async fn connect(config: &NodeConfig, rebalance: &RebalanceConfig) -> RebalanceResult<Self> {
        let base_url = config.base_url();
        info!("Connecting to node REST API at {}", base_url);

        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(cert_path) = &config.tls_certificate {
            debug!("Using TLS certificate: {:?}", cert_path);
            let pem = tokio::fs::read(cert_path).await.map_err(|e| {
                RebalanceError::Config(format!("Failed to read TLS certificate: {}", e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| RebalanceError::Config(format!("Invalid TLS certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let mut headers = HeaderMap::new();
        if let Some(macaroon) = load_macaroon(config).await? {
            let value = HeaderValue::from_str(&macaroon)
                .map_err(|e| RebalanceError::Config(format!("Invalid macaroon: {}", e)))?;
            headers.insert(MACAROON_HEADER, value);
        } else {
            warn!("No macaroon configured, node calls will be unauthenticated");
        }

        let http = builder
            .default_headers(headers)
            .build()
            .map_err(|e| RebalanceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_http(http, base_url, config, rebalance))
    }

    fn with_http(
        http: reqwest::Client,
        base_url: String,
        config: &NodeConfig,
        rebalance: &RebalanceConfig,
    ) -> Self {
        Self {
            http,
            base_url,
            timeout: Duration::from_secs(config.timeout_seconds),
            payment_timeout: Duration::from_secs(rebalance.payment_timeout_seconds),
            invoice_memo: rebalance.invoice_memo.clone(),
            invoice_expiry: rebalance.invoice_expiry_seconds,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> RebalanceResult<T> {
        debug!("GET {}", path);
        let response = self
            .http
            .get(self.url(path))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> RebalanceResult<T> {
        debug!("POST {}", path);
        let response = self
            .http
            .post(self.url(path))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode(response).await
    }

    async fn add_invoice(&self, amount_sats: u64) -> RebalanceResult<AddInvoiceResponse> {
        let request = AddInvoiceRequest {
            memo: &self.invoice_memo,
            value: amount_sats,
            expiry: self.invoice_expiry,
        };
        self.post("/v1/invoices", &request, self.timeout).await
    }

    async fn cancel_invoice(&self, payment_hash: &str) -> RebalanceResult<()> {
        let request = CancelInvoiceRequest { payment_hash };
        let _: serde_json::Value = self
            .post("/v2/invoices/cancel", &request, self.timeout)
            .await?;
        Ok(())
    }

    async fn send_payment(&self, request: &SendPaymentRequest<'_>) -> RebalanceResult<SendPaymentResponse> {
        self.post("/v1/channels/transactions", request, self.payment_timeout)
            .await
    }

    async fn partner_key(&self, channel_id: &ChannelId) -> RebalanceResult<String> {
        let channels = self.list_channels(ChannelFilter { active_only: false }).await?;
        channels
            .into_iter()
            .find(|c| &c.id == channel_id)
            .map(|c| c.partner_public_key)
            .ok_or_else(|| RebalanceError::UnknownChannel(channel_id.to_string()))
    }
}

#[async_trait]
impl NodeApi for NodeClient {
    async fn get_node_version(&self) -> RebalanceResult<NodeVersion> {
        let info: GetInfoResponse = self.get("/v1/getinfo").await?;
        NodeVersion::parse(&info.version).ok_or_else(|| {
            RebalanceError::Node(format!("Unrecognized node version: {:?}", info.version))
        })
    }

    async fn list_channels(&self, filter: ChannelFilter) -> RebalanceResult<Vec<Channel>> {
        let path = format!("/v1/channels?active_only={}", filter.active_only);
        let response: ListChannelsResponse = self.get(&path).await?;

        let channels = response
            .channels
            .into_iter()
            .map(|c| Channel {
                id: ChannelId(c.chan_id),
                partner_public_key: c.remote_pubkey,
                capacity: c.capacity,
                local_balance: c.local_balance,
                remote_balance: c.remote_balance,
                active: c.active,
                private: c.private,
            })
            .collect::<Vec<_>>();

        debug!("Listed {} channels", channels.len());
        Ok(channels)
    }

    async fn rebalance(
        &self,
        request: RebalanceRequest,
        cancel: CancellationToken,
    ) -> RebalanceResult<RebalanceReply> {
        info!(
            "Rebalancing {} sats: outgoing={}, incoming={}, max_fee={:?}",
            request.amount_sats,
            request.outgoing_channel_id,
            request.incoming_channel_id,
            request.max_fee_sats
        );

        let partner = self.partner_key(&request.incoming_channel_id).await?;
        let last_hop = hex::decode(&partner).map_err(|e| {
            RebalanceError::Node(format!("Invalid partner key {}: {}", partner, e))
        })?;

        if cancel.is_cancelled() {
            return Ok(RebalanceReply::Cancelled);
        }

        let invoice = self.add_invoice(request.amount_sats).await?;
        debug!("Created self-invoice for rebalance");

        let payment_request = SendPaymentRequest {
            payment_request: &invoice.payment_request,
            outgoing_chan_id: &request.outgoing_channel_id.0,
            last_hop_pubkey: general_purpose::STANDARD.encode(last_hop),
            fee_limit: request.max_fee_sats.map(|fixed| FeeLimit { fixed }),
            allow_self_payment: true,
        };

        let payment = self.send_payment(&payment_request);
        tokio::pin!(payment);

        let response = tokio::select! {
            response = &mut payment => match response {
                Ok(response) => response,
                Err(e) => {
                    // The node may still be routing; make sure the invoice can no longer settle
                    warn!("Rebalance payment call failed, cancelling self-invoice: {}", e);
                    if let Err(cancel_err) = self.cancel_invoice(&invoice.r_hash).await {
                        error!("Failed to cancel self-invoice: {}", cancel_err);
                    }
                    return Err(e);
                }
            },
            _ = cancel.cancelled() => {
                info!("Cancellation requested, cancelling self-invoice");
                if let Err(e) = self.cancel_invoice(&invoice.r_hash).await {
                    warn!("Failed to cancel self-invoice: {}", e);
                }
                // The node acknowledges by failing the in-flight payment at the last hop
                return match (&mut payment).await {
                    Ok(response) if response.payment_error.is_empty() => {
                        warn!("Rebalance completed before the cancellation took effect");
                        Ok(RebalanceReply::Routed(response.receipt(request.amount_sats)))
                    }
                    _ => Ok(RebalanceReply::Cancelled),
                };
            }
        };

        if !response.payment_error.is_empty() {
            error!("Rebalance payment failed: {}", response.payment_error);
            return Err(RebalanceError::Rebalance(response.payment_error));
        }

        Ok(RebalanceReply::Routed(response.receipt(request.amount_sats)))
    }
}

/// Read the macaroon from file (hex-encoding binary content) or inline config
async fn load_macaroon(config: &NodeConfig) -> RebalanceResult<Option<String>> {
    if let Some(path) = &config.macaroon_file {
        debug!("Reading macaroon from file: {:?}", path);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RebalanceError::Config(format!("Failed to read macaroon file: {}", e)))?;
        return Ok(Some(macaroon_from_bytes(&bytes)));
    }
    Ok(config.macaroon.clone())
}

/// Macaroon files are usually binary; a file already holding hex is used as-is
fn macaroon_from_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.trim();
            if !text.is_empty() && text.chars().all(|c| c.is_ascii_hexdigit()) {
                text.to_string()
            } else {
                hex::encode(bytes)
            }
        }
        Err(_) => hex::encode(bytes),
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> RebalanceResult<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or(text);
        error!("Node returned error: {} - {}", status, message);
        return Err(RebalanceError::Node(format!("{} ({})", message, status)));
    }

    response
        .json()
        .await
        .map_err(|e| RebalanceError::Node(format!("Failed to parse node response: {}", e)))
}

/// int64/uint64 fields arrive as JSON strings from the REST gateway
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n.to_string(),
        Raw::Str(s) => s,
    })
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        if !self.message.is_empty() {
            Some(self.message)
        } else if !self.error.is_empty() {
            Some(self.error)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetInfoResponse {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct ListChannelsResponse {
    #[serde(default)]
    channels: Vec<RestChannel>,
}

#[derive(Debug, Deserialize)]
struct RestChannel {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    remote_pubkey: String,
    #[serde(default, deserialize_with = "de_id")]
    chan_id: String,
    #[serde(default, deserialize_with = "de_u64")]
    capacity: u64,
    #[serde(default, deserialize_with = "de_u64")]
    local_balance: u64,
    #[serde(default, deserialize_with = "de_u64")]
    remote_balance: u64,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Serialize)]
struct AddInvoiceRequest<'a> {
    memo: &'a str,
    value: u64,
    expiry: u64,
}

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
    /// Base64 payment hash
    r_hash: String,
    payment_request: String,
}

#[derive(Debug, Serialize)]
struct CancelInvoiceRequest<'a> {
    payment_hash: &'a str,
}

#[derive(Debug, Serialize)]
struct FeeLimit {
    fixed: u64,
}

#[derive(Debug, Serialize)]
struct SendPaymentRequest<'a> {
    payment_request: &'a str,
    outgoing_chan_id: &'a str,
    last_hop_pubkey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee_limit: Option<FeeLimit>,
    allow_self_payment: bool,
}

#[derive(Debug, Deserialize)]
struct SendPaymentResponse {
    #[serde(default)]
    payment_error: String,
    payment_route: Option<PaymentRoute>,
}

#[derive(Debug, Deserialize)]
struct PaymentRoute {
    #[serde(default, deserialize_with = "de_u64")]
    total_fees: u64,
    #[serde(default, deserialize_with = "de_u64")]
    total_amt: u64,
}

impl SendPaymentResponse {
    fn receipt(&self, requested_sats: u64) -> RebalanceReceipt {
        match &self.payment_route {
            Some(route) => RebalanceReceipt {
                routed_sats: route.total_amt.saturating_sub(route.total_fees),
                fee_sats: route.total_fees,
            },
            None => RebalanceReceipt {
                routed_sats: requested_sats,
                fee_sats: 0,
            },
        }
    }
}
