//! Common test utilities and mock implementations
//!
//! This module provides shared mocks and fixtures used across all test
//! modules: collaborator doubles, a controllable gateway, and payment
//! record builders.

use crate::{
    application::services::fee_service::{FeeEngine, FeeRequest, FeeService},
    application::services::lifecycle_service::PaymentLifecycleService,
    config::AppConfig,
    domain::fees::FeeCalculation,
    domain::payment::{PaymentLink, PaymentStatus},
    infrastructure::adapters::{
        collaborators::{
            Collaborators, EntitlementProvisioner, PlanAttribution, PlanDirectory,
            TenantFeeOverrides,
        },
        gateway::{CreateLinkParams, GatewayLink, PaymentGateway},
        notifications::{NotificationEvent, NotificationSink},
        FeeConfigStore, PaymentLinkStore,
    },
    shared::error::{AppError, AppResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Plan catalog backed by a fixed map
#[derive(Default)]
pub struct StaticPlanDirectory {
    plans: HashMap<String, PlanAttribution>,
}

impl StaticPlanDirectory {
    pub fn with_plan(mut self, plan_id: &str, tenant_id: &str, bundle_id: &str) -> Self {
        self.plans.insert(
            plan_id.to_string(),
            PlanAttribution {
                tenant_id: Some(tenant_id.to_string()),
                channel_bundle_id: Some(bundle_id.to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl PlanDirectory for StaticPlanDirectory {
    async fn plan_by_id(&self, plan_id: &str) -> AppResult<Option<PlanAttribution>> {
        Ok(self.plans.get(plan_id).cloned())
    }
}

/// Entitlement provisioner that records every call
#[derive(Default)]
pub struct RecordingEntitlements {
    pub calls: Mutex<Vec<(String, i64)>>,
    pub fail: bool,
}

#[async_trait]
impl EntitlementProvisioner for RecordingEntitlements {
    async fn provision_access(&self, user_id: &str, duration_seconds: i64) -> AppResult<()> {
        self.calls
            .lock()
            .await
            .push((user_id.to_string(), duration_seconds));
        if self.fail {
            return Err(AppError::Internal("provisioning unavailable".to_string()));
        }
        Ok(())
    }
}

/// Tenant fee override source returning one fixed answer
#[derive(Default)]
pub struct StaticFeeOverrides {
    pub fee: Option<f64>,
    pub fail: bool,
}

#[async_trait]
impl TenantFeeOverrides for StaticFeeOverrides {
    async fn flat_or_percentage_fee(&self, _tenant_id: &str) -> AppResult<Option<f64>> {
        if self.fail {
            return Err(AppError::Internal("override lookup failed".to_string()));
        }
        Ok(self.fee)
    }
}

/// Notification sink collecting every event
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub async fn events_of_type(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: NotificationEvent) {
        self.events.lock().await.push(event);
    }
}

/// Gateway double with controllable verification and failure behavior
pub struct MockGateway {
    pub verify: bool,
    pub fail_create: bool,
    pub create_calls: AtomicU32,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            verify: true,
            fail_create: false,
            create_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_link(&self, _params: &CreateLinkParams) -> AppResult<GatewayLink> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(AppError::Gateway("gateway unavailable".to_string()));
        }
        let link_id = format!("TG-mock-{}-{}", call, Uuid::new_v4());
        Ok(GatewayLink {
            link_url: format!("https://pay.test/{}", link_id),
            link_id,
        })
    }

    async fn check_status(&self, link_id: &str) -> AppResult<serde_json::Value> {
        Ok(json!({ "link_id": link_id, "link_status": "ACTIVE" }))
    }

    fn verify_webhook_signature(
        &self,
        _raw_payload: &str,
        _signature: Option<&str>,
        _timestamp: Option<&str>,
    ) -> bool {
        self.verify
    }
}

/// Fee engine that always errors, to exercise the fallback chain
pub struct FailingFeeEngine;

#[async_trait]
impl FeeEngine for FailingFeeEngine {
    async fn calculate_transaction_fee(&self, _request: &FeeRequest) -> AppResult<FeeCalculation> {
        Err(AppError::Internal("fee service unavailable".to_string()))
    }
}

/// Everything a lifecycle test needs, with the doubles kept inspectable
pub struct Harness {
    pub config: Arc<AppConfig>,
    pub store: Arc<PaymentLinkStore>,
    pub fee_store: Arc<FeeConfigStore>,
    pub gateway: Arc<MockGateway>,
    pub entitlements: Arc<RecordingEntitlements>,
    pub sink: Arc<RecordingSink>,
    pub service: PaymentLifecycleService,
}

/// Build a harness wired to the real fee service over `fee_store`.
pub fn harness() -> Harness {
    harness_with(None, false, MockGateway::default())
}

/// Build a harness whose fee engine always fails, so settlements run the
/// fallback chain against `tenant_fee`.
pub fn harness_with_failing_fees(tenant_fee: Option<f64>) -> Harness {
    harness_with(tenant_fee, true, MockGateway::default())
}

/// Build a harness whose gateway rejects link creation.
pub fn failing_gateway_harness() -> Harness {
    harness_with(
        None,
        false,
        MockGateway { fail_create: true, ..Default::default() },
    )
}

/// Build a harness whose gateway fails webhook signature verification.
pub fn unverified_gateway_harness() -> Harness {
    harness_with(
        None,
        false,
        MockGateway { verify: false, ..Default::default() },
    )
}

fn harness_with(tenant_fee: Option<f64>, failing_fees: bool, gateway: MockGateway) -> Harness {
    super::config::init();
    let config = Arc::new(super::config::test_config());
    let store = Arc::new(PaymentLinkStore::new(None));
    let fee_store = Arc::new(FeeConfigStore::new());
    let gateway = Arc::new(gateway);
    let entitlements = Arc::new(RecordingEntitlements::default());
    let sink = Arc::new(RecordingSink::default());
    let plans = Arc::new(
        StaticPlanDirectory::default()
            .with_plan("plan-basic", "tenant-1", "bundle-a")
            .with_plan("plan-pro", "tenant-1", "bundle-b"),
    );
    let overrides = Arc::new(StaticFeeOverrides { fee: tenant_fee, fail: false });

    let plans_dyn: Arc<dyn PlanDirectory> = plans;
    let entitlements_dyn: Arc<dyn EntitlementProvisioner> = entitlements.clone();
    let overrides_dyn: Arc<dyn TenantFeeOverrides> = overrides;
    let sink_dyn: Arc<dyn NotificationSink> = sink.clone();
    let gateway_dyn: Arc<dyn PaymentGateway> = gateway.clone();
    let fees_dyn: Arc<dyn FeeEngine> = if failing_fees {
        Arc::new(FailingFeeEngine)
    } else {
        Arc::new(FeeService::new(fee_store.clone()))
    };

    let service = PaymentLifecycleService::new(
        config.clone(),
        store.clone(),
        gateway_dyn,
        fees_dyn,
        Collaborators {
            plans: plans_dyn,
            entitlements: entitlements_dyn,
            fee_overrides: overrides_dyn,
            notifications: sink_dyn,
        },
    )
    .expect("lifecycle service builds");

    Harness {
        config,
        store,
        fee_store,
        gateway,
        entitlements,
        sink,
        service,
    }
}

/// Payment record fixtures
pub mod fixtures {
    use super::*;

    pub fn random_phone() -> String {
        format!("98{:08}", rand::random::<u32>() % 100_000_000)
    }

    /// A PENDING record created at `created_at`.
    pub fn pending_link(
        phone: &str,
        bundle: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> PaymentLink {
        let link_id = format!("TG-{}", Uuid::new_v4());
        PaymentLink {
            id: Uuid::new_v4().to_string(),
            link_url: format!("https://pay.test/{}", link_id),
            link_id,
            user_id: "user-1".to_string(),
            customer_id: "cust-1".to_string(),
            phone: phone.to_string(),
            tenant_id: Some("tenant-1".to_string()),
            channel_bundle_id: bundle.map(|b| b.to_string()),
            amount: 1000.0,
            plan_id: Some("plan-basic".to_string()),
            plan_name: Some("Basic".to_string()),
            duration: "1 month".to_string(),
            status: PaymentStatus::Pending,
            status_reason: None,
            created_at,
            updated_at: created_at,
            expired_at: None,
            canceled_at: None,
            utr: None,
            platform_fee: None,
            net_amount: None,
            fee_calculation_data: None,
            settlement_source: None,
            is_extension: false,
            expiry_date: created_at + Duration::days(30),
        }
    }

    /// A settled SUCCESS record whose subscription expires at `expiry_date`.
    pub fn success_link(
        phone: &str,
        bundle: Option<&str>,
        expiry_date: DateTime<Utc>,
    ) -> PaymentLink {
        let mut link = pending_link(phone, bundle, Utc::now() - Duration::days(1));
        link.status = PaymentStatus::Success;
        link.utr = Some("UTR0000001".to_string());
        link.settlement_source = Some("webhook".to_string());
        link.expiry_date = expiry_date;
        link
    }

    pub fn success_webhook_payload(link_id: &str, utr: &str) -> String {
        json!({
            "type": "PAYMENT_SUCCESS_WEBHOOK",
            "data": { "order": { "link_id": link_id, "utr": utr } }
        })
        .to_string()
    }

    pub fn failure_webhook_payload(link_id: &str) -> String {
        json!({
            "type": "PAYMENT_FAILED_WEBHOOK",
            "data": {
                "order": { "link_id": link_id },
                "payment": { "payment_message": "insufficient funds" }
            }
        })
        .to_string()
    }
}
