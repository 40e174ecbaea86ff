//! Outbound completion webhooks.
//!
//! Delivery is best-effort: failures are logged and counted, never returned,
//! so a broken receiver cannot change a job's outcome.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{info, warn};
use url::Url;
use vgb_models::WebhookPayload;

use crate::error::{CompileError, CompileResult};
use crate::metrics::record_webhook;

/// Header carrying the body signature when a secret is configured.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// `sha256=<base64url HMAC-SHA256 of body>`.
pub fn sign_body(secret: &str, body: &[u8]) -> CompileResult<String> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CompileError::config_error(format!("Invalid HMAC key: {}", e)))?;
    mac.update(body);
    Ok(format!("sha256={}", URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())))
}

#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration, secret: Option<String>) -> CompileResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vgb-compiler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CompileError::config_error(format!("webhook client: {}", e)))?;
        Ok(Self { http, secret })
    }

    /// POST `payload` to `url`. Returns whether the receiver accepted it.
    pub async fn notify(&self, url: &Url, payload: &WebhookPayload) -> bool {
        let delivered = match self.deliver(url, payload).await {
            Ok(()) => {
                info!(event_id = %payload.event_id, status = %payload.status, "Webhook delivered");
                true
            }
            Err(e) => {
                warn!(
                    event_id = %payload.event_id,
                    url = %url,
                    error = %e,
                    "Webhook delivery failed"
                );
                false
            }
        };
        record_webhook(if delivered { "delivered" } else { "failed" });
        delivered
    }

    async fn deliver(&self, url: &Url, payload: &WebhookPayload) -> Result<(), String> {
        let body = serde_json::to_vec(payload).map_err(|e| e.to_string())?;

        let mut request = self
            .http
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            let signature = sign_body(secret, &body).map_err(|e| e.to_string())?;
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.body(body).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("receiver answered {}", status));
        }
        Ok(())
    }
}
