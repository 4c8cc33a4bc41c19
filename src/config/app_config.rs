//! Application configuration structures
//!
//! This module contains the main configuration structures for the payment core.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Gateway API base URL
    #[validate(url)]
    pub base_url: String,

    /// API client id
    #[validate(length(min = 1))]
    pub client_id: String,

    /// API client secret
    #[validate(length(min = 1))]
    pub client_secret: String,

    /// Gateway API version header value
    #[validate(length(min = 1))]
    pub api_version: String,

    /// Shared secret for webhook signature verification
    pub webhook_secret: String,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,

    /// Maximum link-creation attempts
    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,

    /// Base delay for exponential backoff between attempts (milliseconds)
    #[validate(range(min = 1, max = 60000))]
    pub retry_base_delay_ms: u64,

    /// How long a created link stays payable at the gateway (hours)
    #[validate(range(min = 1, max = 168))]
    pub link_expiry_hours: u32,
}

/// Payment lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LifecycleConfig {
    /// How long a PENDING link blocks a same-bundle retry (minutes)
    #[validate(range(min = 1, max = 1440))]
    pub pending_timeout_minutes: u32,

    /// Subscription length assumed when a duration string is unparseable (days)
    #[validate(range(min = 1, max = 3650))]
    pub default_duration_days: u32,
}

/// Stale-link reaper configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CleanupConfig {
    /// Sweep interval (minutes)
    #[validate(range(min = 1, max = 1440))]
    pub interval_minutes: u32,

    /// PENDING records older than this are expired (minutes)
    #[validate(range(min = 1, max = 1440))]
    pub staleness_minutes: u32,

    /// Expired-per-run count above which admins are notified
    #[validate(range(min = 1, max = 10000))]
    pub notable_threshold: usize,

    /// A reaper whose last run is older than this is unhealthy (minutes)
    #[validate(range(min = 1, max = 1440))]
    pub health_window_minutes: u32,
}

/// Fee fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FeeFallbackConfig {
    /// Static percentage applied when no other fee source is available
    #[validate(range(min = 0.0, max = 100.0))]
    pub default_percentage: f64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    /// Optional Redis URL for the durable payment mirror
    pub redis_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1))]
    pub level: String,
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Payment gateway configuration
    pub gateway: GatewayConfig,

    /// Payment lifecycle configuration
    pub lifecycle: LifecycleConfig,

    /// Reaper configuration
    pub cleanup: CleanupConfig,

    /// Fee fallback configuration
    pub fees: FeeFallbackConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                base_url: "https://sandbox.cashfree.com".to_string(),
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                api_version: "2022-09-01".to_string(),
                webhook_secret: String::new(),
                timeout_seconds: 40,
                max_retries: 3,
                retry_base_delay_ms: 1000,
                link_expiry_hours: 24,
            },
            lifecycle: LifecycleConfig {
                pending_timeout_minutes: 30,
                default_duration_days: 30,
            },
            cleanup: CleanupConfig {
                interval_minutes: 15,
                staleness_minutes: 30,
                notable_threshold: 10,
                health_window_minutes: 20,
            },
            fees: FeeFallbackConfig { default_percentage: 2.9 },
            storage: StorageConfig { redis_url: None },
            logging: LoggingConfig { level: "info".to_string() },
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> crate::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("Conf").required(false))
            .add_source(config::Environment::with_prefix("SUBPAY").separator("__"))
            .build()
            .map_err(|e| crate::shared::error::AppError::Config(format!("Failed to build configuration: {}", e)))?;

        let config: AppConfig = config.try_deserialize()
            .map_err(|e| crate::shared::error::AppError::Config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate_config()
            .map_err(|e| crate::shared::error::AppError::Validation(format!("Configuration validation failed: {}", e)))?;

        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate_config(&self) -> Result<(), validator::ValidationErrors> {
        self.gateway.validate()?;
        self.lifecycle.validate()?;
        self.cleanup.validate()?;
        self.fees.validate()?;
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
