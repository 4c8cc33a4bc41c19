//! Payment lifecycle service
//!
//! Owns the payment state machine: link creation with conflict detection
//! and lazy expiry, webhook-driven settlement, the administrative manual
//! mark, fee recalculation, and the settlement fee fallback chain.

use crate::config::AppConfig;
use crate::domain::duration::DurationSpec;
use crate::domain::fees::{round2, FeeBreakdown, FeeCalculationData};
use crate::domain::payment::{PaymentLink, PaymentStatus, TransitionEvent};
use crate::infrastructure::adapters::collaborators::{Collaborators, PlanAttribution};
use crate::infrastructure::adapters::gateway::{
    self, CreateLinkParams, PaymentGateway,
};
use crate::infrastructure::adapters::notifications::NotificationEvent;
use crate::infrastructure::adapters::payment_store::{
    PaymentLinkStore, SettledFilter, TransitionOutcome,
};
use crate::application::services::fee_service::{FeeEngine, FeeRequest};
use crate::shared::error::{AppError, AppResult, PendingConflict};
use crate::shared::logging::LoggingUtils;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hard cap on bulk recalculation batch size.
const MAX_BULK_LIMIT: usize = 100;

/// Request to create a payment link
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLinkRequest {
    pub user_id: String,
    pub customer_id: String,
    pub phone: String,
    pub amount: f64,
    pub plan_id: Option<String>,
    pub plan_name: Option<String>,
    /// Free-form subscription duration ("30", "1 month", "1 year")
    pub duration: Option<String>,
}

/// Response to a successful link creation
#[derive(Debug, Clone, Serialize)]
pub struct CreateLinkResponse {
    pub payment_link: String,
    pub link_id: String,
    pub payment_id: String,
    pub expiry_date: DateTime<Utc>,
    pub is_extension: bool,
    /// Set when pending payments exist for other bundles
    pub warning: Option<String>,
}

/// Outcome of one webhook delivery
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The record transitioned to SUCCESS and settlement ran.
    Settled(PaymentLink),
    /// The record transitioned to FAILED.
    Failed(PaymentLink),
    /// The record was already terminal; the delivery was a replay no-op.
    ReplayNoOp,
    /// Unknown event type, logged and ignored.
    UnknownEvent,
    /// No tracked record matches the event's link id.
    UnknownLink,
}

/// Filter for bulk fee recalculation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkRecalculateFilter {
    pub link_ids: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub tenant_id: Option<String>,
    pub limit: Option<usize>,
    /// Replace existing fee data instead of skipping it
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemError {
    pub link_id: String,
    pub error: String,
}

/// Per-item report of a bulk recalculation
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkRecalculateReport {
    pub processed: usize,
    pub updated: usize,
    /// Records left untouched because their fee data is immutable
    pub skipped: usize,
    pub errors: Vec<BulkItemError>,
}

struct ResolvedFees {
    platform_fee: f64,
    net_amount: f64,
    data: FeeCalculationData,
}

/// The payment lifecycle state machine service
pub struct PaymentLifecycleService {
    config: Arc<AppConfig>,
    store: Arc<PaymentLinkStore>,
    gateway: Arc<dyn PaymentGateway>,
    fees: Arc<dyn FeeEngine>,
    collaborators: Collaborators,
    phone_pattern: Regex,
}

impl PaymentLifecycleService {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<PaymentLinkStore>,
        gateway: Arc<dyn PaymentGateway>,
        fees: Arc<dyn FeeEngine>,
        collaborators: Collaborators,
    ) -> AppResult<Self> {
        let phone_pattern = Regex::new(r"^\+?[0-9]{6,15}$")
            .map_err(|e| AppError::Config(format!("invalid phone pattern: {}", e)))?;
        Ok(Self {
            config,
            store,
            gateway,
            fees,
            collaborators,
            phone_pattern,
        })
    }

    fn auto_expiry_reason(&self) -> String {
        format!(
            "auto-expired after {} minutes of inactivity",
            self.config.lifecycle.pending_timeout_minutes
        )
    }

    fn validate_create(&self, request: &CreateLinkRequest) -> AppResult<()> {
        let mut missing = Vec::new();
        if request.user_id.trim().is_empty() {
            missing.push("user_id");
        }
        if request.customer_id.trim().is_empty() {
            missing.push("customer_id");
        }
        if request.phone.trim().is_empty() {
            missing.push("phone");
        }
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        if !(request.amount > 0.0) || !request.amount.is_finite() {
            return Err(AppError::Validation(
                "Amount must be greater than 0".to_string(),
            ));
        }
        if !self.phone_pattern.is_match(request.phone.trim()) {
            return Err(AppError::Validation(
                "Phone must be 6-15 digits with an optional leading +".to_string(),
            ));
        }
        Ok(())
    }

    async fn resolve_attribution(&self, plan_id: &Option<String>) -> PlanAttribution {
        let Some(plan_id) = plan_id else {
            return PlanAttribution::default();
        };
        match self.collaborators.plans.plan_by_id(plan_id).await {
            Ok(Some(attribution)) => attribution,
            Ok(None) => {
                warn!(plan_id = %plan_id, "Plan not found; payment will lack tenant attribution");
                PlanAttribution::default()
            }
            Err(e) => {
                warn!(plan_id = %plan_id, error = %e, "Plan lookup failed; continuing without attribution");
                PlanAttribution::default()
            }
        }
    }

    /// Create a payment link for a checkout request.
    ///
    /// Same-bundle active pending conflicts block creation with a 409-class
    /// error carrying resume/cancel details; pending links for other
    /// bundles only annotate the response with a warning.
    pub async fn create_link(&self, request: CreateLinkRequest) -> AppResult<CreateLinkResponse> {
        self.validate_create(&request)?;
        let now = Utc::now();

        let attribution = self.resolve_attribution(&request.plan_id).await;
        let bundle = attribution.channel_bundle_id.clone();

        // Lazy cleanup: expire this phone's stale PENDING links before the
        // conflict check, independent of the scheduled reaper.
        let cutoff =
            now - Duration::minutes(self.config.lifecycle.pending_timeout_minutes as i64);
        let swept = self
            .store
            .expire_stale(cutoff, &self.auto_expiry_reason(), Some(&request.phone))
            .await?;
        if swept.expired > 0 {
            info!(
                phone = %request.phone,
                expired = swept.expired,
                "Expired stale pending payments during creation"
            );
        }

        let pending = self.store.find_pending_by_phone(&request.phone).await?;
        let mut warning = None;
        if let Some(same) = pending.iter().find(|p| p.channel_bundle_id == bundle) {
            let age = same.age_minutes(now);
            let timeout = self.config.lifecycle.pending_timeout_minutes as i64;
            return Err(AppError::pending_conflict(PendingConflict {
                link_id: same.link_id.clone(),
                link_url: same.link_url.clone(),
                amount: same.amount,
                plan_name: same.plan_name.clone(),
                created_at: same.created_at,
                minutes_remaining: (timeout - age).max(0),
            }));
        } else if !pending.is_empty() {
            warn!(
                phone = %request.phone,
                count = pending.len(),
                "Pending payments exist for other bundles; allowing creation"
            );
            warning = Some(format!(
                "{} pending payment(s) exist for other bundles",
                pending.len()
            ));
        }

        // Extension handling: an active prior subscription extends from its
        // expiry, an expired one renews from now.
        let duration_text = request
            .duration
            .clone()
            .unwrap_or_else(|| self.config.lifecycle.default_duration_days.to_string());
        let duration_days = DurationSpec::parse(&duration_text).days();
        let prior = self
            .store
            .latest_success_for_bundle(&request.phone, bundle.as_deref())
            .await?;
        let (expiry_date, is_extension) = match prior {
            Some(previous) if previous.expiry_date > now => {
                info!(phone = %request.phone, "Extending active subscription");
                (previous.expiry_date + Duration::days(duration_days), true)
            }
            Some(_) => {
                info!(phone = %request.phone, "Renewing expired subscription");
                (now + Duration::days(duration_days), true)
            }
            None => (now + Duration::days(duration_days), false),
        };

        let link = self
            .gateway
            .create_link(&CreateLinkParams {
                customer_id: request.customer_id.clone(),
                phone: request.phone.clone(),
                amount: request.amount,
                plan_id: request.plan_id.clone(),
                plan_name: request.plan_name.clone(),
            })
            .await?;

        let record = PaymentLink {
            id: Uuid::new_v4().to_string(),
            link_id: link.link_id.clone(),
            link_url: link.link_url.clone(),
            user_id: request.user_id,
            customer_id: request.customer_id,
            phone: request.phone,
            tenant_id: attribution.tenant_id,
            channel_bundle_id: bundle,
            amount: request.amount,
            plan_id: request.plan_id,
            plan_name: request.plan_name,
            duration: duration_text,
            status: PaymentStatus::Pending,
            status_reason: None,
            created_at: now,
            updated_at: now,
            expired_at: None,
            canceled_at: None,
            utr: None,
            platform_fee: None,
            net_amount: None,
            fee_calculation_data: None,
            settlement_source: None,
            is_extension,
            expiry_date,
        };
        self.store.insert(&record).await?;

        info!(
            link_id = %record.link_id,
            phone = %record.phone,
            amount = %record.amount,
            is_extension = is_extension,
            "Payment link created"
        );
        self.collaborators
            .notifications
            .notify(NotificationEvent::link_created(&record))
            .await;

        Ok(CreateLinkResponse {
            payment_link: link.link_url,
            link_id: link.link_id,
            payment_id: record.id,
            expiry_date,
            is_extension,
            warning,
        })
    }

    /// Process a gateway webhook delivery.
    ///
    /// Signature verification happens before anything else; a failure is an
    /// authentication error and no state changes. Unknown event types and
    /// untracked link ids are idempotent no-ops.
    pub async fn handle_webhook(
        &self,
        raw_payload: &str,
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> AppResult<WebhookOutcome> {
        if !self
            .gateway
            .verify_webhook_signature(raw_payload, signature, timestamp)
        {
            LoggingUtils::log_security_event(
                "webhook_signature",
                "signature or timestamp verification failed",
            );
            return Err(AppError::Authentication(
                "invalid webhook signature".to_string(),
            ));
        }

        let envelope = gateway::parse_webhook_envelope(raw_payload)?;
        match envelope.event_type.as_str() {
            "PAYMENT_SUCCESS_WEBHOOK" | "PAYMENT_SUCCESS" => {
                self.handle_success_event(&envelope.data).await
            }
            "PAYMENT_FAILED_WEBHOOK" | "PAYMENT_FAILED" => {
                self.handle_failure_event(&envelope.data).await
            }
            other => {
                info!(event_type = %other, "Ignoring unknown webhook event type");
                Ok(WebhookOutcome::UnknownEvent)
            }
        }
    }

    async fn handle_success_event(&self, data: &Value) -> AppResult<WebhookOutcome> {
        let Some(link_id) = gateway::event_link_id(data) else {
            warn!("Success webhook carried no link id; ignoring");
            return Ok(WebhookOutcome::UnknownLink);
        };
        let utr = gateway::settlement_reference(data);

        match self
            .store
            .apply_transition(&link_id, &TransitionEvent::GatewaySuccess { utr })
            .await?
        {
            TransitionOutcome::NotFound => {
                info!(link_id = %link_id, "Webhook for untracked payment; ignoring");
                Ok(WebhookOutcome::UnknownLink)
            }
            TransitionOutcome::AlreadyTerminal(record) => {
                info!(
                    link_id = %link_id,
                    status = %record.status,
                    "Webhook replay observed terminal payment; no-op"
                );
                Ok(WebhookOutcome::ReplayNoOp)
            }
            TransitionOutcome::Applied(record) => {
                LoggingUtils::log_transition(&link_id, "PENDING", "SUCCESS", "webhook");
                let record = self.settle(record).await;
                Ok(WebhookOutcome::Settled(record))
            }
        }
    }

    async fn handle_failure_event(&self, data: &Value) -> AppResult<WebhookOutcome> {
        let Some(link_id) = gateway::event_link_id(data) else {
            warn!("Failure webhook carried no link id; ignoring");
            return Ok(WebhookOutcome::UnknownLink);
        };
        let reason = data
            .get("payment")
            .and_then(|p| p.get("payment_message"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        match self
            .store
            .apply_transition(&link_id, &TransitionEvent::GatewayFailure { reason })
            .await?
        {
            TransitionOutcome::NotFound => {
                info!(link_id = %link_id, "Failure webhook for untracked payment; ignoring");
                Ok(WebhookOutcome::UnknownLink)
            }
            TransitionOutcome::AlreadyTerminal(record) => {
                info!(
                    link_id = %link_id,
                    status = %record.status,
                    "Failure webhook observed terminal payment; no-op"
                );
                Ok(WebhookOutcome::ReplayNoOp)
            }
            TransitionOutcome::Applied(record) => {
                LoggingUtils::log_transition(&link_id, "PENDING", "FAILED", "webhook");
                self.collaborators
                    .notifications
                    .notify(NotificationEvent::payment_failed(&record))
                    .await;
                Ok(WebhookOutcome::Failed(record))
            }
        }
    }

    /// Administrative escape hatch for when a user reaches the success page
    /// before the webhook lands. Idempotent when already SUCCESS.
    pub async fn manual_mark_success(&self, order_id: &str) -> AppResult<PaymentLink> {
        info!(order_id = %order_id, "Manual success marking requested");
        match self
            .store
            .apply_transition(order_id, &TransitionEvent::ManualSuccess)
            .await?
        {
            TransitionOutcome::NotFound => {
                Err(AppError::NotFound(format!("payment {} not found", order_id)))
            }
            TransitionOutcome::AlreadyTerminal(record)
                if record.status == PaymentStatus::Success =>
            {
                info!(order_id = %order_id, "Payment already marked successful");
                Ok(record)
            }
            TransitionOutcome::AlreadyTerminal(record) => Err(AppError::Conflict {
                message: format!(
                    "payment is {} and cannot be marked successful",
                    record.status
                ),
                pending: None,
            }),
            TransitionOutcome::Applied(record) => {
                LoggingUtils::log_transition(order_id, "PENDING", "SUCCESS", "manual");
                Ok(self.settle(record).await)
            }
        }
    }

    /// Cancel a user's own pending link (the "cancel & start new" conflict
    /// action).
    pub async fn cancel_pending(&self, link_id: &str) -> AppResult<PaymentLink> {
        match self
            .store
            .apply_transition(link_id, &TransitionEvent::Cancel)
            .await?
        {
            TransitionOutcome::NotFound => {
                Err(AppError::NotFound(format!("payment {} not found", link_id)))
            }
            TransitionOutcome::AlreadyTerminal(record) => Err(AppError::Conflict {
                message: format!(
                    "only pending payments can be canceled (status: {})",
                    record.status
                ),
                pending: None,
            }),
            TransitionOutcome::Applied(record) => {
                info!(link_id = %link_id, "Pending payment canceled by user");
                Ok(record)
            }
        }
    }

    /// Recompute fee data for a settled payment.
    ///
    /// Existing fee data is immutable history unless `force` is set; the
    /// record is returned unchanged in that case.
    pub async fn recalculate_fees(&self, link_id: &str, force: bool) -> AppResult<PaymentLink> {
        let record = self
            .store
            .get(link_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", link_id)))?;
        if record.status != PaymentStatus::Success {
            return Err(AppError::Validation(
                "only settled payments can have fees recalculated".to_string(),
            ));
        }
        if record.fee_calculation_data.is_some() && !force {
            debug!(link_id = %link_id, "Fee data exists and force not set; leaving unchanged");
            return Ok(record);
        }

        let fees = self.resolve_fees(&record).await;
        let mut data = fees.data;
        data.recalculated = true;
        data.recalculated_at = Some(Utc::now());

        match self
            .store
            .set_fee_data(link_id, fees.platform_fee, fees.net_amount, data)
            .await?
        {
            Some(updated) => Ok(updated),
            None => Err(AppError::Conflict {
                message: "payment status changed during recalculation".to_string(),
                pending: None,
            }),
        }
    }

    /// Recalculate fees across a bounded, filtered set of settled records.
    /// One item's failure never aborts the batch.
    pub async fn bulk_recalculate(
        &self,
        filter: BulkRecalculateFilter,
    ) -> AppResult<BulkRecalculateReport> {
        let limit = filter.limit.unwrap_or(MAX_BULK_LIMIT).min(MAX_BULK_LIMIT);
        let settled = self
            .store
            .find_settled(&SettledFilter {
                link_ids: filter.link_ids.clone(),
                created_after: filter.created_after,
                created_before: filter.created_before,
                tenant_id: filter.tenant_id.clone(),
                limit,
            })
            .await?;

        let mut report = BulkRecalculateReport::default();
        for payment in settled {
            report.processed += 1;
            if payment.fee_calculation_data.is_some() && !filter.force {
                report.skipped += 1;
                continue;
            }
            match self.recalculate_fees(&payment.link_id, filter.force).await {
                Ok(_) => report.updated += 1,
                Err(e) => report.errors.push(BulkItemError {
                    link_id: payment.link_id.clone(),
                    error: e.to_string(),
                }),
            }
        }
        info!(
            processed = report.processed,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Bulk fee recalculation finished"
        );
        Ok(report)
    }

    /// Settlement steps after a record won its PENDING→SUCCESS transition:
    /// fee pipeline, entitlement provisioning, success notification.
    /// Side-channel failures are logged, never surfaced; the status
    /// transition has already committed.
    async fn settle(&self, record: PaymentLink) -> PaymentLink {
        let fees = self.resolve_fees(&record).await;
        let record = match self
            .store
            .set_fee_data(&record.link_id, fees.platform_fee, fees.net_amount, fees.data)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                warn!(link_id = %record.link_id, "Fee data not persisted: record no longer SUCCESS");
                record
            }
            Err(e) => {
                warn!(link_id = %record.link_id, error = %e, "Failed to persist fee data");
                record
            }
        };

        let duration_seconds = DurationSpec::parse(&record.duration).seconds();
        if let Err(e) = self
            .collaborators
            .entitlements
            .provision_access(&record.user_id, duration_seconds)
            .await
        {
            LoggingUtils::log_side_channel_failure("entitlement_provisioning", &record.link_id, &e);
        }

        self.collaborators
            .notifications
            .notify(NotificationEvent::payment_success(&record))
            .await;
        record
    }

    /// The fee fallback chain: primary fee service, then the tenant's
    /// directly-configured fee, then the static default percentage. Every
    /// level logs its use; non-primary levels persist fallback-flagged data.
    async fn resolve_fees(&self, record: &PaymentLink) -> ResolvedFees {
        let request = FeeRequest {
            amount: record.amount,
            tenant_id: record.tenant_id.clone(),
            channel_bundle_id: record.channel_bundle_id.clone(),
            as_of: Some(Utc::now()),
        };
        match self.fees.calculate_transaction_fee(&request).await {
            Ok(calc) => {
                LoggingUtils::log_fee_level(
                    &record.link_id,
                    "primary",
                    calc.platform_fee,
                    calc.net_amount,
                );
                ResolvedFees {
                    platform_fee: calc.platform_fee,
                    net_amount: calc.net_amount,
                    data: FeeCalculationData::from_calculation(&calc),
                }
            }
            Err(primary_error) => {
                warn!(
                    link_id = %record.link_id,
                    error = %primary_error,
                    "Fee service unavailable; trying tenant fee override"
                );
                if let Some(tenant_id) = &record.tenant_id {
                    match self
                        .collaborators
                        .fee_overrides
                        .flat_or_percentage_fee(tenant_id)
                        .await
                    {
                        Ok(Some(rate)) => return self.tenant_fallback_fees(record, rate),
                        Ok(None) => {
                            debug!(tenant_id = %tenant_id, "No tenant fee configured")
                        }
                        Err(e) => {
                            warn!(tenant_id = %tenant_id, error = %e, "Tenant fee lookup failed")
                        }
                    }
                }
                self.static_fallback_fees(record)
            }
        }
    }

    /// Dual interpretation of the tenant's configured rate: a value ≥ 1 is
    /// a fixed absolute fee, a value < 1 a fractional percentage rate.
    fn tenant_fallback_fees(&self, record: &PaymentLink, rate: f64) -> ResolvedFees {
        let fixed = rate >= 1.0;
        let platform_fee = round2(if fixed { rate } else { record.amount * rate }).max(0.0);
        let net_amount = round2(record.amount - platform_fee);
        LoggingUtils::log_fee_level(&record.link_id, "tenant_override", platform_fee, net_amount);
        ResolvedFees {
            platform_fee,
            net_amount,
            data: FeeCalculationData {
                config_id: Some("tenant-fallback".to_string()),
                version: Some(1),
                fee_type: if fixed { "fixed" } else { "percentage" }.to_string(),
                fee_rate: Some(rate),
                calculated_at: Utc::now(),
                breakdown: FeeBreakdown {
                    gross_amount: record.amount,
                    platform_fee,
                    net_amount,
                    applied_limits: None,
                },
                fallback: true,
                recalculated: false,
                recalculated_at: None,
            },
        }
    }

    fn static_fallback_fees(&self, record: &PaymentLink) -> ResolvedFees {
        let rate = self.config.fees.default_percentage;
        let platform_fee = round2(record.amount * rate / 100.0);
        let net_amount = round2(record.amount - platform_fee);
        LoggingUtils::log_fee_level(&record.link_id, "static_default", platform_fee, net_amount);
        ResolvedFees {
            platform_fee,
            net_amount,
            data: FeeCalculationData {
                config_id: Some("static-fallback".to_string()),
                version: Some(1),
                fee_type: "percentage".to_string(),
                fee_rate: Some(rate),
                calculated_at: Utc::now(),
                breakdown: FeeBreakdown {
                    gross_amount: record.amount,
                    platform_fee,
                    net_amount,
                    applied_limits: None,
                },
                fallback: true,
                recalculated: false,
                recalculated_at: None,
            },
        }
    }
}
