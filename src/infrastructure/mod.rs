//! Infrastructure layer - External concerns and adapters
//!
//! This module contains infrastructure concerns: the gateway client,
//! persistence adapters, and the notification hub.

pub mod adapters;

// Re-export main adapters
pub use adapters::{
    Collaborators, FeeConfigStore, GatewayClient, NotificationHub, PaymentGateway,
    PaymentLinkStore,
};
