//! Versioned platform-fee configuration store
//!
//! Configurations are append-only: publishing a new configuration for a
//! scope closes the previous version's effective window instead of editing
//! it, so settled transactions always point at the exact numbers they were
//! charged under.

use crate::domain::fees::{FeeConfiguration, FeeScope, FeeType, UsageStats};
use crate::shared::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Parameters for publishing a new fee configuration version
#[derive(Debug, Clone)]
pub struct NewFeeConfig {
    pub scope: FeeScope,
    pub fee_type: FeeType,
    pub rate: f64,
    pub min_fee: Option<f64>,
    pub max_fee: Option<f64>,
    pub effective_from: DateTime<Utc>,
}

/// In-memory versioned configuration registry
pub struct FeeConfigStore {
    configs: RwLock<Vec<FeeConfiguration>>,
}

impl FeeConfigStore {
    pub fn new() -> Self {
        Self { configs: RwLock::new(Vec::new()) }
    }

    /// Publish a new configuration version for a scope. The previous open
    /// version of the same scope gets its window closed at the new
    /// configuration's effective start.
    pub async fn publish(&self, new: NewFeeConfig) -> AppResult<FeeConfiguration> {
        if new.rate < 0.0 {
            return Err(AppError::Validation("fee rate must not be negative".to_string()));
        }
        let mut configs = self.configs.write().await;
        let version = configs
            .iter()
            .filter(|c| c.scope == new.scope)
            .map(|c| c.version)
            .max()
            .unwrap_or(0)
            + 1;
        for existing in configs.iter_mut() {
            if existing.scope == new.scope && existing.effective_to.is_none() {
                existing.effective_to = Some(new.effective_from);
            }
        }
        let config = FeeConfiguration {
            config_id: format!("FEE-{}", Uuid::new_v4()),
            version,
            scope: new.scope,
            fee_type: new.fee_type,
            rate: new.rate,
            min_fee: new.min_fee,
            max_fee: new.max_fee,
            effective_from: new.effective_from,
            effective_to: None,
            currency: "INR".to_string(),
            usage: UsageStats::default(),
        };
        configs.push(config.clone());
        Ok(config)
    }

    /// Most specific configuration active at `at`:
    /// tenant+bundle scope, then tenant scope, then global.
    pub async fn active_config(
        &self,
        tenant_id: Option<&str>,
        channel_bundle_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Option<FeeConfiguration> {
        let configs = self.configs.read().await;
        let pick = |matches: &dyn Fn(&FeeConfiguration) -> bool| {
            configs
                .iter()
                .filter(|c| c.is_active_at(at) && matches(c))
                .max_by_key(|c| c.effective_from)
                .cloned()
        };

        if let (Some(tenant), Some(bundle)) = (tenant_id, channel_bundle_id) {
            let scoped = pick(&|c| {
                matches!(&c.scope, FeeScope::Tenant { tenant_id, channel_bundle_id: Some(b) }
                    if tenant_id == tenant && b == bundle)
            });
            if scoped.is_some() {
                return scoped;
            }
        }
        if let Some(tenant) = tenant_id {
            let scoped = pick(&|c| {
                matches!(&c.scope, FeeScope::Tenant { tenant_id, channel_bundle_id: None }
                    if tenant_id == tenant)
            });
            if scoped.is_some() {
                return scoped;
            }
        }
        pick(&|c| c.scope == FeeScope::Global)
    }

    /// Bump a configuration's usage counters. Best-effort bookkeeping that
    /// never affects the calculation itself.
    pub async fn record_usage(&self, config_id: &str, fee: f64) {
        let mut configs = self.configs.write().await;
        if let Some(config) = configs.iter_mut().find(|c| c.config_id == config_id) {
            config.usage.transactions_affected += 1;
            config.usage.total_fees_collected += fee;
            config.usage.last_used = Some(Utc::now());
        }
    }
}

impl Default for FeeConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
