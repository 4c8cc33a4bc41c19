//! Configuration validation module
//!
//! This module provides additional validation logic for configuration
//! beyond the basic validator crate validation.

use crate::config::AppConfig;
use crate::shared::error::AppError;

/// Configuration validator for additional validation logic
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the complete configuration
    pub fn validate_config(config: &AppConfig) -> crate::Result<()> {
        Self::validate_gateway_url(&config.gateway.base_url)?;
        Self::validate_webhook_secret(config)?;
        Self::validate_cleanup_windows(config)?;
        Ok(())
    }

    /// Validate the gateway base URL
    fn validate_gateway_url(url: &str) -> crate::Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Validation(
                "Gateway base URL must start with http:// or https://".to_string(),
            ));
        }

        if url.contains("localhost") || url.contains("127.0.0.1") {
            // Allow plain HTTP for local development
            Ok(())
        } else if !url.starts_with("https://") {
            Err(AppError::Validation(
                "Production gateway base URL must use HTTPS".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// An empty webhook secret disables verification entirely; refuse to
    /// run that way outside local development.
    fn validate_webhook_secret(config: &AppConfig) -> crate::Result<()> {
        if config.gateway.webhook_secret.is_empty() {
            if config.gateway.base_url.contains("sandbox")
                || config.gateway.base_url.contains("localhost")
                || config.gateway.base_url.contains("127.0.0.1")
            {
                tracing::warn!("Webhook secret is empty - all webhooks will be rejected");
                return Ok(());
            }
            return Err(AppError::Validation(
                "Webhook secret must be configured for a production gateway".to_string(),
            ));
        }
        Ok(())
    }

    /// The health window must cover at least one sweep interval, otherwise
    /// a perfectly healthy reaper reports unhealthy between runs.
    fn validate_cleanup_windows(config: &AppConfig) -> crate::Result<()> {
        if config.cleanup.health_window_minutes <= config.cleanup.interval_minutes {
            return Err(AppError::Validation(format!(
                "Cleanup health window ({}m) must exceed the sweep interval ({}m)",
                config.cleanup.health_window_minutes, config.cleanup.interval_minutes
            )));
        }
        Ok(())
    }
}
