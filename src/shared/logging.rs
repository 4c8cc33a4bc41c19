//! Logging utilities module
//!
//! This module provides centralized logging functionality and utilities.

use tracing::{error, info, warn};

/// Logging utilities for the application
pub struct LoggingUtils;

impl LoggingUtils {
    /// Initialize logging with the specified configuration
    pub fn initialize(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level));

        let subscriber_builder = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let subscriber = subscriber_builder.finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| crate::shared::error::AppError::Internal(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }

    /// Log a payment lifecycle transition with structured data
    pub fn log_transition(link_id: &str, from: &str, to: &str, source: &str) {
        info!(
            link_id = %link_id,
            from = %from,
            to = %to,
            source = %source,
            "Payment transition applied"
        );
    }

    /// Log which level of the fee fallback chain produced a fee
    pub fn log_fee_level(link_id: &str, level: &str, platform_fee: f64, net_amount: f64) {
        info!(
            link_id = %link_id,
            level = %level,
            platform_fee = %platform_fee,
            net_amount = %net_amount,
            "Platform fee resolved"
        );
    }

    /// Log security events (webhook signature/timestamp failures)
    pub fn log_security_event(event_type: &str, details: &str) {
        warn!(
            event_type = %event_type,
            details = %details,
            "Security event detected"
        );
    }

    /// Log a failed side-channel delivery that was swallowed on purpose
    pub fn log_side_channel_failure(channel: &str, link_id: &str, error: &crate::shared::error::AppError) {
        error!(
            channel = %channel,
            link_id = %link_id,
            error = %error,
            "Side-channel delivery failed; payment state unaffected"
        );
    }
}
