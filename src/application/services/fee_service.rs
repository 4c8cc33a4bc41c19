//! Platform fee calculation service
//!
//! Pure calculation over the versioned configuration store. Lookup and
//! compute failures are returned to the caller; the settlement fallback
//! chain lives in the lifecycle service, never here.

use crate::domain::fees::{
    round2, AppliedLimits, ConfigRef, FeeBreakdown, FeeCalculation, FeeType,
};
use crate::infrastructure::adapters::FeeConfigStore;
use crate::shared::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// One fee calculation request
#[derive(Debug, Clone)]
pub struct FeeRequest {
    pub amount: f64,
    pub tenant_id: Option<String>,
    pub channel_bundle_id: Option<String>,
    /// Transaction date the configuration must be active at; now if None.
    pub as_of: Option<DateTime<Utc>>,
}

/// Seam between the lifecycle and the fee pipeline
#[async_trait]
pub trait FeeEngine: Send + Sync {
    async fn calculate_transaction_fee(&self, request: &FeeRequest) -> AppResult<FeeCalculation>;
}

/// Item of a bulk fee calculation
#[derive(Debug, Clone)]
pub struct BulkFeeItem {
    pub id: String,
    pub amount: f64,
    pub tenant_id: Option<String>,
    pub channel_bundle_id: Option<String>,
    pub as_of: Option<DateTime<Utc>>,
}

/// Per-item outcome of a bulk fee calculation
#[derive(Debug, Clone)]
pub struct BulkFeeOutcome {
    pub id: String,
    pub result: AppResult<FeeCalculation>,
}

/// Fee calculation over versioned, scoped configurations
pub struct FeeService {
    configs: Arc<FeeConfigStore>,
}

impl FeeService {
    pub fn new(configs: Arc<FeeConfigStore>) -> Self {
        Self { configs }
    }

    /// Calculate fees for many transactions; one item's failure never
    /// aborts the batch.
    pub async fn calculate_bulk_transaction_fees(
        &self,
        items: &[BulkFeeItem],
    ) -> Vec<BulkFeeOutcome> {
        let futures = items.iter().map(|item| {
            let request = FeeRequest {
                amount: item.amount,
                tenant_id: item.tenant_id.clone(),
                channel_bundle_id: item.channel_bundle_id.clone(),
                as_of: item.as_of,
            };
            async move {
                BulkFeeOutcome {
                    id: item.id.clone(),
                    result: self.calculate_transaction_fee(&request).await,
                }
            }
        });
        join_all(futures).await
    }
}

#[async_trait]
impl FeeEngine for FeeService {
    async fn calculate_transaction_fee(&self, request: &FeeRequest) -> AppResult<FeeCalculation> {
        if !(request.amount > 0.0) || !request.amount.is_finite() {
            return Err(AppError::Validation(
                "valid transaction amount is required".to_string(),
            ));
        }
        let as_of = request.as_of.unwrap_or_else(Utc::now);

        let Some(config) = self
            .configs
            .active_config(
                request.tenant_id.as_deref(),
                request.channel_bundle_id.as_deref(),
                as_of,
            )
            .await
        else {
            debug!(
                tenant_id = ?request.tenant_id,
                "No fee configuration applies; returning zero fee"
            );
            return Ok(FeeCalculation::zero(request.amount, as_of));
        };

        let platform_fee = config.calculate_fee(request.amount);
        let net_amount = round2(request.amount - platform_fee);

        let unclamped = match config.fee_type {
            FeeType::Percentage => request.amount * config.rate / 100.0,
            FeeType::Fixed => config.rate,
        };
        let limits = AppliedLimits {
            min_fee_applied: config.min_fee.is_some_and(|min| unclamped < min),
            max_fee_applied: config.max_fee.is_some_and(|max| unclamped > max),
        };
        let applied_limits =
            (limits.min_fee_applied || limits.max_fee_applied).then_some(limits);

        // Best-effort bookkeeping; never affects the returned numbers.
        self.configs.record_usage(&config.config_id, platform_fee).await;

        Ok(FeeCalculation {
            transaction_amount: request.amount,
            platform_fee,
            net_amount,
            fee_type: config.fee_type.as_str().to_string(),
            fee_rate: match config.fee_type {
                FeeType::Percentage => Some(config.rate),
                FeeType::Fixed => None,
            },
            currency: config.currency.clone(),
            config_used: Some(ConfigRef {
                config_id: config.config_id.clone(),
                version: config.version,
                scope: config.scope.label().to_string(),
                effective_from: config.effective_from,
            }),
            calculated_at: as_of,
            breakdown: FeeBreakdown {
                gross_amount: request.amount,
                platform_fee,
                net_amount,
                applied_limits,
            },
        })
    }
}
