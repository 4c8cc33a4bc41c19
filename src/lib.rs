//! SubPay Core - Payment lifecycle and fee reconciliation for subscription platforms
//!
//! This library implements the settlement core of a subscription payment
//! system: the payment link state machine, webhook-driven asynchronous
//! settlement, multi-tier platform-fee calculation with a deterministic
//! fallback chain, and the scheduled reaper that expires abandoned links.
//! HTTP route wiring, authentication, and notification transport are
//! consumed through narrow injected interfaces.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;


pub use application::services::{
    CleanupService, FeeService, PaymentLifecycleService,
};
pub use config::AppConfig;
pub use shared::error::{AppError, AppResult};

/// Application result type
pub type Result<T> = std::result::Result<T, shared::error::AppError>;
