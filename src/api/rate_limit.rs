// src/api/rate_limit.rs

//! Per-client rate limiting for every route, keyed on the peer IP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::Quota;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type KeyedLimiter = governor::RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Requests each client may burst per window. `0` disables limiting.
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitSettings {
    /// A burst of `max_requests`, refilled one request per `window / max_requests`.
    fn quota(&self) -> Option<Quota> {
        let burst = NonZeroU32::new(self.max_requests)?;
        Quota::with_period(self.window / burst.get()).map(|quota| quota.allow_burst(burst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

/// One GCRA bucket per client IP.
pub struct RateLimiter {
    limiter: Option<KeyedLimiter>,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        let limiter = settings.quota().map(KeyedLimiter::keyed);
        if limiter.is_none() {
            debug!(?settings, "Rate limiting disabled.");
        }
        Self {
            limiter,
            clock: DefaultClock::default(),
        }
    }

    pub fn check(&self, client: IpAddr) -> Decision {
        let Some(limiter) = &self.limiter else {
            return Decision::Allowed;
        };
        match limiter.check_key(&client) {
            Ok(()) => Decision::Allowed,
            Err(not_until) => Decision::Limited {
                retry_after: not_until.wait_time_from(self.clock.now()),
            },
        }
    }

    /// Drops buckets of clients that are back at full capacity.
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            debug!(clients = limiter.len(), "Pruned rate limiter state.");
        }
    }

    /// Prunes every `period` for as long as the server runs.
    pub fn prune_every(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                self.prune();
            }
        })
    }
}

/// The peer IP recorded by `into_make_service_with_connect_info`.
fn client_ip(request: &Request) -> IpAddr {
    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip(),
        None => {
            debug!("No peer address on request, using the shared bucket.");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}

/// Middleware rejecting requests over the limit before they reach a handler.
pub async fn enforce(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    let client = client_ip(&request);
    match limiter.check(client) {
        Decision::Allowed => next.run(request).await,
        Decision::Limited { retry_after } => {
            let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            warn!(%client, path = %request.uri().path(), retry_after = seconds, "Rate limit exceeded.");
            let body = Json(json!({
                "statusCode": 429,
                "error": "Too Many Requests",
                "message": format!("Rate limit exceeded: retry in {} seconds", seconds),
            }));
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, seconds.to_string())],
                body,
            )
                .into_response()
        }
    }
}
