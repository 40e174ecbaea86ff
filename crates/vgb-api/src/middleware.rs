//! Request middleware: rate limiting, CORS, security headers, request ids
//! and access logging.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderName, HeaderValue, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn, Span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics;

type ClientLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Clients tracked before idle entries are pruned.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// A client unseen for this long starts over with a full burst.
const CLIENT_IDLE_TTL: Duration = Duration::from_secs(600);

const REQUEST_ID_HEADER: &str = "x-request-id";

struct ClientEntry {
    limiter: ClientLimiter,
    last_seen: Instant,
}

/// Token bucket per client IP.
#[derive(Clone)]
pub struct RateLimiterCache {
    clients: Arc<Mutex<HashMap<IpAddr, ClientEntry>>>,
    quota: Quota,
}

impl RateLimiterCache {
    /// `requests_per_second` sustained, bursts up to `burst` (never below the rate).
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).map_or(rate, |b| b.max(rate));
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            quota: Quota::per_second(rate).allow_burst(burst),
        }
    }

    /// Take one token for `ip`. False when the client is over its quota.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if clients.len() >= MAX_TRACKED_CLIENTS && !clients.contains_key(&ip) {
            let before = clients.len();
            clients.retain(|_, entry| now.duration_since(entry.last_seen) < CLIENT_IDLE_TTL);
            warn!(pruned = before - clients.len(), "Rate limiter at capacity");
            if clients.len() >= MAX_TRACKED_CLIENTS {
                // Every tracked client is active; the oldest one loses its bucket
                if let Some(oldest) = clients
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_seen)
                    .map(|(ip, _)| *ip)
                {
                    clients.remove(&oldest);
                }
            }
        }

        let entry = clients.entry(ip).or_insert_with(|| ClientEntry {
            limiter: RateLimiter::direct(self.quota),
            last_seen: now,
        });
        entry.last_seen = now;
        entry.limiter.check().is_ok()
    }

    pub fn tracked_clients(&self) -> usize {
        match self.clients.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// CORS for the configured origins, `*` allowing any.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .max_age(Duration::from_secs(600));

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any).allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(allowed)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("referrer-policy", "no-referrer"),
    ("cross-origin-resource-policy", "same-origin"),
];

pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// Propagate the caller's `X-Request-ID` or mint one, and echo it back.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| (1..=128).contains(&s.len()))
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Span::current().record("request_id", id.as_str());
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// One line per request, probes excluded.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    if !matches!(path.as_str(), "/health" | "/ready") {
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        info!(
            %method,
            %path,
            request_id,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    }
    response
}

/// 429 once a client exceeds its quota. Clients without an address pass.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterCache>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(ip) = extract_client_ip(&request) else {
        return next.run(request).await;
    };

    if limiter.check(ip) {
        next.run(request).await
    } else {
        warn!(%ip, path = request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limit_hit(request.uri().path());
        ApiError::RateLimited.into_response()
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer.
fn extract_client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let header_ip = |name: &str, first_hop: bool| {
        let value = request.headers().get(name)?.to_str().ok()?;
        let candidate = if first_hop {
            value.split(',').next()?
        } else {
            value
        };
        candidate.trim().parse::<IpAddr>().ok()
    };

    header_ip("x-forwarded-for", true)
        .or_else(|| header_ip("x-real-ip", false))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<std::net::SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}
