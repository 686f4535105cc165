//! Per-IP request budgets enforced with governor.
//!
//! Every route draws from the general budget. `/api/token` and
//! `/api/token/refresh` also draw from a tighter token budget.

use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use serde::Serialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};
use tracing::warn;

use crate::config::SecurityConfig;
use crate::telemetry::metrics::record_rate_limited;

pub type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

/// Sustained requests per minute plus the burst a fresh client may spend at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub per_minute: u32,
    pub burst: u32,
}

impl Budget {
    pub const TOKEN: Budget = Budget {
        per_minute: 20,
        burst: 10,
    };

    pub fn general(per_minute: u32) -> Self {
        Self {
            per_minute,
            burst: (per_minute / 2).max(1),
        }
    }

    fn quota(&self) -> Option<Quota> {
        let per_minute = NonZeroU32::new(self.per_minute)?;
        let burst = NonZeroU32::new(self.burst.max(1))?;
        Some(Quota::per_minute(per_minute).allow_burst(burst))
    }

    /// `None` for a zero budget, which disables limiting.
    pub fn limiter(&self) -> Option<Arc<IpLimiter>> {
        self.quota().map(|quota| Arc::new(RateLimiter::dashmap(quota)))
    }
}

#[derive(Clone, Default)]
pub struct RateLimitState {
    general: Option<Arc<IpLimiter>>,
    token: Option<Arc<IpLimiter>>,
    advertised_limit: Option<u32>,
}

impl RateLimitState {
    pub fn from_config(security: &SecurityConfig) -> Self {
        if !security.rate_limiting_enabled {
            return Self::disabled();
        }

        let general = Budget::general(security.rate_limit_requests_per_minute);
        Self {
            general: general.limiter(),
            token: Budget::TOKEN.limiter(),
            advertised_limit: Some(general.per_minute),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.general.is_some() || self.token.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    General,
    Token,
}

impl Bucket {
    fn label(self) -> &'static str {
        match self {
            Bucket::General => "general",
            Bucket::Token => "token",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Bucket::General => "Too many requests",
            Bucket::Token => "Too many login attempts",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimited {
    pub error: String,
    pub code: &'static str,
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        let retry_after = HeaderValue::from(self.retry_after_secs);
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self)).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, retry_after);
        response
    }
}

fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

async fn enforce(
    state: Option<Extension<RateLimitState>>,
    bucket: Bucket,
    request: Request,
    next: Next,
) -> Result<Response, RateLimited> {
    let Some(Extension(state)) = state else {
        return Ok(next.run(request).await);
    };
    let limiter = match bucket {
        Bucket::General => state.general.as_ref(),
        Bucket::Token => state.token.as_ref(),
    };
    let Some(limiter) = limiter else {
        return Ok(next.run(request).await);
    };

    let ip = client_ip(&request);
    if let Err(not_until) = limiter.check_key(&ip) {
        let retry_after_secs = not_until
            .wait_time_from(DefaultClock::default().now())
            .as_secs()
            .max(1);
        warn!(ip = %ip, bucket = bucket.label(), retry_after_secs, "Rate limit exceeded");
        record_rate_limited(bucket.label());

        return Err(RateLimited {
            error: bucket.message().to_string(),
            code: "RATE_LIMITED",
            retry_after_secs,
        });
    }

    let mut response = next.run(request).await;
    if let Some(limit) = state.advertised_limit {
        response
            .headers_mut()
            .insert("X-RateLimit-Limit", HeaderValue::from(limit));
    }
    Ok(response)
}

pub async fn rate_limit_middleware(
    state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimited> {
    enforce(state, Bucket::General, request, next).await
}

pub async fn auth_rate_limit_middleware(
    state: Option<Extension<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimited> {
    enforce(state, Bucket::Token, request, next).await
}
