//! Infrastructure adapters module
//!
//! This module contains adapters for external services and infrastructure concerns.

pub mod collaborators;
pub mod fee_config_store;
pub mod gateway;
pub mod notifications;
pub mod payment_store;

// Re-export all adapters
pub use collaborators::{
    Collaborators, EntitlementProvisioner, PlanAttribution, PlanDirectory, TenantFeeOverrides,
};
pub use fee_config_store::{FeeConfigStore, NewFeeConfig};
pub use gateway::{
    CreateLinkParams, GatewayClient, GatewayLink, PaymentGateway, WebhookEnvelope,
};
pub use notifications::{
    NoopNotificationSink, NotificationEvent, NotificationHub, NotificationSink,
    NotificationTarget,
};
pub use payment_store::{
    ExpiredBatch, PaymentLinkStore, SettledFilter, TransitionOutcome,
};
