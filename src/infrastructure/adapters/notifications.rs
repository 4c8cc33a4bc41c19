//! Notification sink and hub
//!
//! The lifecycle only ever depends on the [`NotificationSink`] interface;
//! delivery is fire-and-forget and a failed or absent subscriber never
//! affects payment state. [`NotificationHub`] is the provided
//! implementation: it owns a tenant→channel registry behind a
//! message-passing API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::domain::payment::PaymentLink;

/// Who an event is addressed to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "kind", content = "tenant_id")]
pub enum NotificationTarget {
    All,
    Tenant(String),
}

/// A notification event emitted by the payment core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: String,
    pub title: String,
    pub message: String,
    pub target: NotificationTarget,
    pub payload: Value,
}

impl NotificationEvent {
    fn target_for(tenant_id: &Option<String>) -> NotificationTarget {
        match tenant_id {
            Some(id) => NotificationTarget::Tenant(id.clone()),
            None => NotificationTarget::All,
        }
    }

    pub fn link_created(payment: &PaymentLink) -> Self {
        NotificationEvent {
            event_type: "payment_link_created".to_string(),
            title: "New payment link".to_string(),
            message: format!(
                "Payment link created for {} (₹{})",
                payment.phone, payment.amount
            ),
            target: Self::target_for(&payment.tenant_id),
            payload: json!({
                "link_id": payment.link_id,
                "amount": payment.amount,
                "customer_id": payment.customer_id,
                "phone": payment.phone,
                "plan_name": payment.plan_name,
            }),
        }
    }

    pub fn payment_success(payment: &PaymentLink) -> Self {
        NotificationEvent {
            event_type: "payment_success".to_string(),
            title: "Payment received".to_string(),
            message: format!(
                "Payment of ₹{} received from {}",
                payment.amount, payment.phone
            ),
            target: Self::target_for(&payment.tenant_id),
            payload: json!({
                "link_id": payment.link_id,
                "amount": payment.amount,
                "customer_id": payment.customer_id,
                "phone": payment.phone,
                "plan_name": payment.plan_name,
                "utr": payment.utr,
                "duration": payment.duration,
            }),
        }
    }

    pub fn payment_failed(payment: &PaymentLink) -> Self {
        NotificationEvent {
            event_type: "payment_failed".to_string(),
            title: "Payment failed".to_string(),
            message: format!(
                "Payment of ₹{} from {} failed",
                payment.amount, payment.phone
            ),
            target: Self::target_for(&payment.tenant_id),
            payload: json!({
                "link_id": payment.link_id,
                "amount": payment.amount,
                "customer_id": payment.customer_id,
                "phone": payment.phone,
                "plan_name": payment.plan_name,
            }),
        }
    }

    pub fn cleanup_summary(expired: usize, affected_phones: usize, trigger: &str, duration_ms: u64) -> Self {
        NotificationEvent {
            event_type: "payment_cleanup".to_string(),
            title: "Large payment cleanup completed".to_string(),
            message: format!(
                "Cleanup expired {} stale payments affecting {} users ({} cleanup completed in {}ms)",
                expired, affected_phones, trigger, duration_ms
            ),
            target: NotificationTarget::All,
            payload: json!({
                "expired": expired,
                "affected_phones": affected_phones,
                "trigger": trigger,
                "duration_ms": duration_ms,
            }),
        }
    }
}

/// Fire-and-forget event sink
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver an event. Must never fail the caller; delivery problems are
    /// the implementation's to log and swallow.
    async fn notify(&self, event: NotificationEvent);
}

/// Concurrent tenant→channel registry with a publish API.
///
/// Subscribers register per tenant (or under the `"*"` broadcast key) and
/// receive events over unbounded channels. Closed channels are pruned on
/// the next publish.
pub struct NotificationHub {
    channels: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<NotificationEvent>>>>,
}

const BROADCAST_KEY: &str = "*";

impl NotificationHub {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    /// Register a subscriber for one tenant's events plus broadcasts.
    pub async fn subscribe(&self, tenant_id: &str) -> mpsc::UnboundedReceiver<NotificationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .write()
            .await
            .entry(tenant_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub async fn publish(&self, event: NotificationEvent) {
        let keys: Vec<String> = match &event.target {
            NotificationTarget::All => {
                self.channels.read().await.keys().cloned().collect()
            }
            NotificationTarget::Tenant(id) => vec![id.clone(), BROADCAST_KEY.to_string()],
        };
        let mut channels = self.channels.write().await;
        for key in keys {
            if let Some(senders) = channels.get_mut(&key) {
                senders.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for NotificationHub {
    async fn notify(&self, event: NotificationEvent) {
        self.publish(event).await;
    }
}

/// Sink that drops everything; useful for tests and headless deployments.
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify(&self, event: NotificationEvent) {
        debug!(event_type = %event.event_type, "Notification dropped (noop sink)");
    }
}
