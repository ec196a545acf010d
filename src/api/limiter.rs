//! Per-client request limiting
//!
//! Each (client IP, route) pair gets a quota of `limit` requests per minute,
//! with bursts of up to `limit`. Requests over the quota are answered with
//! `429 Too Many Requests`.

use super::ApiResponse;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};
use tracing::{debug, warn};

type LimiterKey = (IpAddr, String);

/// Request quota keyed by client and route
pub struct RequestLimiter<C: Clock = DefaultClock> {
    limiter: Arc<RateLimiter<LimiterKey, DefaultKeyedStateStore<LimiterKey>, C, NoOpMiddleware<C::Instant>>>,
}

impl<C: Clock> Clone for RequestLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
        }
    }
}

fn quota(limit: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN))
}

impl RequestLimiter {
    /// Allow `limit` requests per minute per client and route
    pub fn new(limit: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota(limit))),
        }
    }
}

impl<C: Clock> RequestLimiter<C> {
    #[cfg(test)]
    fn with_clock(limit: u32, clock: &C) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(
                quota(limit),
                DefaultKeyedStateStore::default(),
                clock,
            )),
        }
    }

    /// Record a request and return whether it is allowed
    pub fn check(&self, client: IpAddr, route: &str) -> bool {
        self.limiter.check_key(&(client, route.to_string())).is_ok()
    }

    /// Forget clients whose quota is fully replenished
    pub fn prune(&self) {
        self.limiter.retain_recent();
        debug!("Request limiter tracks {} clients", self.limiter.len());
    }
}

/// Middleware enforcing the quota on every matched route
pub async fn limit_requests(
    State(limiter): State<RequestLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    if !limiter.check(client, &route) {
        warn!("Rate limit exceeded for {} on {}", client, route);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::<()>::error("Too many requests, try again later")),
        )
            .into_response();
    }

    next.run(request).await
}
