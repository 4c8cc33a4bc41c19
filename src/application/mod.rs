//! Application layer - Services orchestrating the payment domain
//!
//! This module contains application services that orchestrate domain logic
//! for the payment lifecycle core.

pub mod services;

pub use services::*;
