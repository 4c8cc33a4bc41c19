//! Collaborator interfaces
//!
//! The lifecycle core consumes its neighbors (plan catalog, entitlement
//! provisioning, tenant fee overrides) through these narrow traits,
//! injected as a bundle at construction time. No collaborator is resolved
//! lazily inside handler bodies.

use crate::infrastructure::adapters::notifications::NotificationSink;
use crate::shared::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Ownership attribution resolved from a plan
#[derive(Debug, Clone, Default)]
pub struct PlanAttribution {
    pub tenant_id: Option<String>,
    pub channel_bundle_id: Option<String>,
}

/// Plan catalog lookup
#[async_trait]
pub trait PlanDirectory: Send + Sync {
    async fn plan_by_id(&self, plan_id: &str) -> AppResult<Option<PlanAttribution>>;
}

/// Grants subscription access after settlement.
///
/// The lifecycle calls this exactly once per settlement, on the
/// PENDING→SUCCESS edge; webhook replays never reach it.
#[async_trait]
pub trait EntitlementProvisioner: Send + Sync {
    async fn provision_access(&self, user_id: &str, duration_seconds: i64) -> AppResult<()>;
}

/// A tenant's directly-configured fee, used only in the fee fallback chain.
///
/// The returned number follows the legacy dual interpretation: a value ≥ 1
/// is a fixed absolute fee, a value < 1 is a fractional percentage rate.
#[async_trait]
pub trait TenantFeeOverrides: Send + Sync {
    async fn flat_or_percentage_fee(&self, tenant_id: &str) -> AppResult<Option<f64>>;
}

/// The injected collaborator bundle
#[derive(Clone)]
pub struct Collaborators {
    pub plans: Arc<dyn PlanDirectory>,
    pub entitlements: Arc<dyn EntitlementProvisioner>,
    pub fee_overrides: Arc<dyn TenantFeeOverrides>,
    pub notifications: Arc<dyn NotificationSink>,
}
