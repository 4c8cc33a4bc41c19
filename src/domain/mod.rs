//! Domain layer - Core business logic and domain models
//!
//! This module contains the core business logic, domain models, and business
//! rules that are independent of infrastructure concerns like HTTP or storage.

pub mod duration;
pub mod fees;
pub mod payment;

pub use duration::{DurationSpec, DurationUnit};
pub use fees::{
    ConfigRef, FeeBreakdown, FeeCalculation, FeeCalculationData, FeeConfiguration, FeeScope,
    FeeType,
};
pub use payment::{
    transition, PaymentLink, PaymentStatus, TransitionEvent, TransitionRejected,
};
