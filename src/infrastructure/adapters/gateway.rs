//! Payment gateway adapter
//!
//! Wraps the external payment provider: link creation with bounded
//! exponential-backoff retries, read-only status polling, and webhook
//! signature verification.

use crate::{config::AppConfig, shared::error::{AppError, AppResult}};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Webhook replay window: events older or newer than this are rejected.
const REPLAY_WINDOW_SECS: i64 = 300;

/// Minimum length for a settlement reference candidate to be trusted.
const MIN_REFERENCE_LEN: usize = 6;

/// A link as created at the gateway
#[derive(Debug, Clone)]
pub struct GatewayLink {
    pub link_id: String,
    pub link_url: String,
}

/// Parameters for creating a payment link at the gateway
#[derive(Debug, Clone)]
pub struct CreateLinkParams {
    pub customer_id: String,
    pub phone: String,
    pub amount: f64,
    pub plan_id: Option<String>,
    pub plan_name: Option<String>,
}

/// Raw webhook envelope as delivered by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Seam between the lifecycle and the provider HTTP contract
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment link. The link id is generated once; retries reuse
    /// the same request payload, and a duplicate-creation response from the
    /// gateway is resolved to the already-created link.
    async fn create_link(&self, params: &CreateLinkParams) -> AppResult<GatewayLink>;

    /// Read-only status passthrough; provider errors surface unchanged.
    async fn check_status(&self, link_id: &str) -> AppResult<Value>;

    /// Verify a webhook signature against this gateway's shared secret.
    fn verify_webhook_signature(
        &self,
        raw_payload: &str,
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> bool;
}

/// HTTP client for the external payment gateway
pub struct GatewayClient {
    config: Arc<AppConfig>,
    http: Client,
}

impl GatewayClient {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.gateway.timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", &self.config.gateway.client_id)
            .header("x-client-secret", &self.config.gateway.client_secret)
            .header("x-api-version", &self.config.gateway.api_version)
            .header("Content-Type", "application/json")
    }

    /// A 409 means the gateway already holds this link; fetch it instead of
    /// failing the creation.
    async fn resolve_existing_link(&self, link_id: &str) -> AppResult<GatewayLink> {
        debug!(link_id = %link_id, "Gateway reported duplicate creation; fetching existing link");
        let body = self.check_status(link_id).await?;
        let link_url = body
            .get("link_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::Gateway("duplicate link exists but gateway returned no link_url".to_string())
            })?;
        Ok(GatewayLink {
            link_id: link_id.to_string(),
            link_url: link_url.to_string(),
        })
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn create_link(&self, params: &CreateLinkParams) -> AppResult<GatewayLink> {
        let gateway = &self.config.gateway;

        // One id for the whole call: retries re-send the same link request.
        let link_id = format!("TG-{}", Uuid::new_v4());
        let expiry_time =
            Utc::now() + chrono::Duration::hours(gateway.link_expiry_hours as i64);
        let payload = json!({
            "link_id": link_id,
            "customer_details": {
                "customer_id": params.customer_id,
                "customer_phone": params.phone,
            },
            "link_notify": { "send_sms": true, "send_email": false },
            "link_meta": {
                "plan_id": params.plan_id.clone().unwrap_or_default(),
                "customer_id": params.customer_id,
                "plan_name": params.plan_name.clone().unwrap_or_else(|| "Plan Purchase".to_string()),
            },
            "link_amount": params.amount,
            "link_currency": "INR",
            "link_purpose": params.plan_name.clone().unwrap_or_else(|| "Subscription".to_string()),
            "link_expiry_time": expiry_time.to_rfc3339(),
            "link_minimum_partial_amount": params.amount,
        });
        let url = format!("{}/pg/links", gateway.base_url);

        let mut last_error: Option<String> = None;
        for attempt in 0..gateway.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(gateway.retry_base_delay_ms, attempt - 1);
                info!(
                    attempt = attempt + 1,
                    max_attempts = gateway.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying payment link creation"
                );
                tokio::time::sleep(delay).await;
            }

            match self.auth_headers(self.http.post(&url)).json(&payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: Value = match response.json().await {
                            Ok(body) => body,
                            Err(e) => {
                                last_error = Some(format!("failed to parse gateway response: {}", e));
                                continue;
                            }
                        };
                        let link_url = body.get("link_url").and_then(|v| v.as_str()).ok_or_else(|| {
                            AppError::Gateway(
                                "invalid response from payment gateway: missing link_url".to_string(),
                            )
                        })?;
                        return Ok(GatewayLink {
                            link_id,
                            link_url: link_url.to_string(),
                        });
                    } else if status == StatusCode::CONFLICT {
                        return self.resolve_existing_link(&link_id).await;
                    } else if status.is_client_error() {
                        // Validation failures will not improve on retry.
                        let body = response.text().await.unwrap_or_default();
                        return Err(AppError::Gateway(format!(
                            "gateway rejected link creation ({}): {}",
                            status, body
                        )));
                    } else {
                        last_error = Some(format!("gateway returned {}", status));
                    }
                }
                Err(e) => {
                    last_error = Some(format!("request failed: {}", e));
                }
            }
        }

        Err(AppError::Gateway(format!(
            "payment link creation failed after {} attempts: {}",
            gateway.max_retries,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    async fn check_status(&self, link_id: &str) -> AppResult<Value> {
        let url = format!("{}/pg/links/{}", self.config.gateway.base_url, link_id);
        let response = self
            .auth_headers(self.http.get(&url))
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("status check failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "status check returned {}: {}",
                status, body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("invalid status response: {}", e)))
    }

    fn verify_webhook_signature(
        &self,
        raw_payload: &str,
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> bool {
        verify_signature(
            raw_payload,
            signature,
            timestamp,
            &self.config.gateway.webhook_secret,
        )
    }
}

/// Exponential backoff: `base * 2^attempt`.
pub(crate) fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2u64.saturating_pow(attempt)))
}

/// Verify an HMAC-SHA256 webhook signature.
///
/// The signed payload is `"{timestamp}.{raw_payload}"`, keyed by the shared
/// secret and hex-encoded. Absent inputs, a timestamp outside the replay
/// window, or any verification error all yield `false`, never `true`.
pub fn verify_signature(
    raw_payload: &str,
    signature: Option<&str>,
    timestamp: Option<&str>,
    secret: &str,
) -> bool {
    let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
        return false;
    };
    if signature.is_empty() || timestamp.is_empty() || secret.is_empty() {
        return false;
    }

    let Ok(event_time) = timestamp.trim().parse::<i64>() else {
        warn!("Webhook timestamp is not a unix epoch value");
        return false;
    };
    let now = Utc::now().timestamp();
    if (now - event_time).abs() > REPLAY_WINDOW_SECS {
        warn!(
            age_seconds = (now - event_time).abs(),
            tolerance = REPLAY_WINDOW_SECS,
            "Webhook timestamp outside replay window"
        );
        return false;
    }

    let signed_payload = format!("{}.{}", timestamp.trim(), raw_payload);
    type HmacSha256 = Hmac<Sha256>;
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parse a raw webhook body into its envelope.
pub fn parse_webhook_envelope(raw_payload: &str) -> AppResult<WebhookEnvelope> {
    serde_json::from_str(raw_payload)
        .map_err(|e| AppError::Validation(format!("malformed webhook payload: {}", e)))
}

/// The gateway link id a webhook event refers to, from its known locations.
pub fn event_link_id(data: &Value) -> Option<String> {
    const PATHS: [&[&str]; 4] = [
        &["order", "link_id"],
        &["link_id"],
        &["order_id"],
        &["order", "order_id"],
    ];
    first_string_at(data, &PATHS, 1)
}

/// First plausible settlement reference from the prioritized provider
/// fields. Short values are noise (truncated ids, placeholders) and skipped.
pub fn settlement_reference(data: &Value) -> Option<String> {
    const PATHS: [&[&str]; 11] = [
        &["order", "utr"],
        &["order", "reference_id"],
        &["payment", "bank_reference"],
        &["payment", "rrn"],
        &["payment", "reference_id"],
        &["payment", "utr"],
        &["payment", "payment_id"],
        &["payment", "cf_payment_id"],
        &["reference_id"],
        &["utr"],
        &["rrn"],
    ];
    first_string_at(data, &PATHS, MIN_REFERENCE_LEN)
}

fn first_string_at(data: &Value, paths: &[&[&str]], min_len: usize) -> Option<String> {
    paths.iter().find_map(|path| {
        let mut value = data;
        for key in *path {
            value = value.get(key)?;
        }
        let text = value.as_str()?.trim();
        (text.len() >= min_len).then(|| text.to_string())
    })
}
