//! Payment link store
//!
//! In-memory authoritative map with an optional Redis write-through mirror
//! for durability. Every mutation is a single conditional update: the
//! predicate check and the write happen inside one write guard, so
//! concurrent webhook, manual-mark and reaper callers can never interleave
//! a read-modify-write cycle. Records are never deleted.

use crate::domain::fees::FeeCalculationData;
use crate::domain::payment::{transition, PaymentLink, PaymentStatus, TransitionEvent};
use crate::shared::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// Mirrored records are kept for 48h, enough for audits and restarts.
const MIRROR_TTL_SECS: u64 = 48 * 3600;

/// Result of a conditional transition attempt
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition won; the returned record carries the new status.
    Applied(PaymentLink),
    /// A competing caller already moved the record to a terminal status.
    AlreadyTerminal(PaymentLink),
    /// No record with that link id is tracked.
    NotFound,
}

/// Summary of one bulk expiry pass
#[derive(Debug, Clone, Default)]
pub struct ExpiredBatch {
    pub expired: usize,
    /// Distinct phones whose records were expired in this pass.
    pub phones: Vec<String>,
}

/// Filter for settled-record scans (fee recalculation)
#[derive(Debug, Clone, Default)]
pub struct SettledFilter {
    pub link_ids: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub tenant_id: Option<String>,
    pub limit: usize,
}

/// Abstraction for persisting payment links
#[derive(Clone)]
pub struct PaymentLinkStore {
    redis: Option<Arc<ConnectionManager>>, // optional; memory-only if None
    memory: Arc<tokio::sync::RwLock<HashMap<String, PaymentLink>>>,
}

impl PaymentLinkStore {
    pub fn new(redis: Option<Arc<ConnectionManager>>) -> Self {
        Self {
            redis,
            memory: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    fn key(link_id: &str) -> String {
        format!("payments:{}", link_id)
    }

    /// Write-through mirror; failures are logged, never surfaced, because
    /// the in-memory commit has already happened.
    async fn mirror(&self, record: &PaymentLink) {
        let Some(redis) = &self.redis else { return };
        let serialized = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(link_id = %record.link_id, error = %e, "Failed to serialize payment for mirror");
                return;
            }
        };
        let mut conn = (**redis).clone();
        let result: Result<(), redis::RedisError> = conn
            .set_ex(Self::key(&record.link_id), serialized, MIRROR_TTL_SECS)
            .await;
        if let Err(e) = result {
            warn!(link_id = %record.link_id, error = %e, "Redis mirror write failed");
        }
    }

    /// Insert a new record. The link id is unique for the record's life.
    pub async fn insert(&self, record: &PaymentLink) -> AppResult<()> {
        {
            let mut memory = self.memory.write().await;
            if memory.contains_key(&record.link_id) {
                return Err(AppError::Storage(format!(
                    "duplicate link id: {}",
                    record.link_id
                )));
            }
            memory.insert(record.link_id.clone(), record.clone());
        }
        self.mirror(record).await;
        Ok(())
    }

    pub async fn get(&self, link_id: &str) -> AppResult<Option<PaymentLink>> {
        if let Some(record) = self.memory.read().await.get(link_id).cloned() {
            return Ok(Some(record));
        }
        // Recover a mirrored record from a previous process, if any.
        if let Some(redis) = &self.redis {
            let mut conn = (**redis).clone();
            let data: Option<Vec<u8>> = conn.get(Self::key(link_id)).await?;
            if let Some(bytes) = data {
                let record: PaymentLink = serde_json::from_slice(&bytes)
                    .map_err(|e| AppError::Storage(format!("deserialize payment: {}", e)))?;
                self.memory
                    .write()
                    .await
                    .insert(link_id.to_string(), record.clone());
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// All PENDING records for a phone, newest first.
    pub async fn find_pending_by_phone(&self, phone: &str) -> AppResult<Vec<PaymentLink>> {
        let memory = self.memory.read().await;
        let mut records: Vec<PaymentLink> = memory
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.phone == phone)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// The SUCCESS record with the latest subscription expiry for a
    /// `(phone, channel bundle)` pair, if any.
    pub async fn latest_success_for_bundle(
        &self,
        phone: &str,
        channel_bundle_id: Option<&str>,
    ) -> AppResult<Option<PaymentLink>> {
        let memory = self.memory.read().await;
        Ok(memory
            .values()
            .filter(|p| {
                p.status == PaymentStatus::Success
                    && p.phone == phone
                    && p.channel_bundle_id.as_deref() == channel_bundle_id
            })
            .max_by_key(|p| p.expiry_date)
            .cloned())
    }

    /// Conditionally apply a lifecycle transition: match-then-set in one
    /// operation. Losers of a transition race observe `AlreadyTerminal`.
    pub async fn apply_transition(
        &self,
        link_id: &str,
        event: &TransitionEvent,
    ) -> AppResult<TransitionOutcome> {
        let outcome = {
            let mut memory = self.memory.write().await;
            let Some(record) = memory.get_mut(link_id) else {
                return Ok(TransitionOutcome::NotFound);
            };
            match transition(record.status, event) {
                Err(_) => TransitionOutcome::AlreadyTerminal(record.clone()),
                Ok(next) => {
                    let now = Utc::now();
                    record.status = next;
                    record.updated_at = now;
                    match event {
                        TransitionEvent::GatewaySuccess { utr } => {
                            if utr.is_some() {
                                record.utr = utr.clone();
                            }
                            record.settlement_source = Some(event.source().to_string());
                        }
                        TransitionEvent::ManualSuccess => {
                            record.settlement_source = Some(event.source().to_string());
                        }
                        TransitionEvent::GatewayFailure { reason } => {
                            record.status_reason = reason.clone();
                        }
                        TransitionEvent::Expire { reason } => {
                            record.status_reason = Some(reason.clone());
                            record.expired_at = Some(now);
                        }
                        TransitionEvent::Cancel => {
                            record.status_reason = Some("canceled by user".to_string());
                            record.canceled_at = Some(now);
                        }
                    }
                    TransitionOutcome::Applied(record.clone())
                }
            }
        };
        if let TransitionOutcome::Applied(record) = &outcome {
            self.mirror(record).await;
        }
        Ok(outcome)
    }

    /// Attach settlement fee data, conditional on the record still being
    /// SUCCESS. Returns the updated record, or None when the condition
    /// did not match.
    pub async fn set_fee_data(
        &self,
        link_id: &str,
        platform_fee: f64,
        net_amount: f64,
        data: FeeCalculationData,
    ) -> AppResult<Option<PaymentLink>> {
        let updated = {
            let mut memory = self.memory.write().await;
            match memory.get_mut(link_id) {
                Some(record) if record.status == PaymentStatus::Success => {
                    record.platform_fee = Some(platform_fee);
                    record.net_amount = Some(net_amount);
                    record.fee_calculation_data = Some(data);
                    record.updated_at = Utc::now();
                    Some(record.clone())
                }
                _ => None,
            }
        };
        if let Some(record) = &updated {
            self.mirror(record).await;
        }
        Ok(updated)
    }

    /// Bulk-expire stale PENDING records older than `cutoff` in a single
    /// conditional pass; optionally scoped to one phone. Records already
    /// expired by a competing sweep simply no longer match, so double
    /// expiry is a no-op, never an error.
    pub async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
        phone: Option<&str>,
    ) -> AppResult<ExpiredBatch> {
        let (expired_records, phones) = {
            let mut memory = self.memory.write().await;
            let now = Utc::now();
            let mut expired_records = Vec::new();
            let mut phones = HashSet::new();
            for record in memory.values_mut() {
                if record.status != PaymentStatus::Pending || record.created_at >= cutoff {
                    continue;
                }
                if let Some(phone) = phone {
                    if record.phone != phone {
                        continue;
                    }
                }
                record.status = PaymentStatus::Expired;
                record.status_reason = Some(reason.to_string());
                record.expired_at = Some(now);
                record.updated_at = now;
                phones.insert(record.phone.clone());
                expired_records.push(record.clone());
            }
            (expired_records, phones)
        };
        for record in &expired_records {
            self.mirror(record).await;
        }
        Ok(ExpiredBatch {
            expired: expired_records.len(),
            phones: phones.into_iter().collect(),
        })
    }

    /// `(total, stale)` counts of PENDING records relative to `cutoff`.
    pub async fn pending_counts(&self, cutoff: DateTime<Utc>) -> AppResult<(usize, usize)> {
        let memory = self.memory.read().await;
        let mut total = 0;
        let mut stale = 0;
        for record in memory.values() {
            if record.status == PaymentStatus::Pending {
                total += 1;
                if record.created_at < cutoff {
                    stale += 1;
                }
            }
        }
        Ok((total, stale))
    }

    /// Settled records matching a recalculation filter, oldest first,
    /// truncated to the filter's limit.
    pub async fn find_settled(&self, filter: &SettledFilter) -> AppResult<Vec<PaymentLink>> {
        let memory = self.memory.read().await;
        let mut records: Vec<PaymentLink> = memory
            .values()
            .filter(|p| p.status == PaymentStatus::Success)
            .filter(|p| match &filter.link_ids {
                Some(ids) => ids.iter().any(|id| *id == p.link_id),
                None => true,
            })
            .filter(|p| filter.created_after.map_or(true, |after| p.created_at >= after))
            .filter(|p| filter.created_before.map_or(true, |before| p.created_at <= before))
            .filter(|p| match &filter.tenant_id {
                Some(tenant) => p.tenant_id.as_deref() == Some(tenant.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        records.sort_by_key(|p| p.created_at);
        if filter.limit > 0 {
            records.truncate(filter.limit);
        }
        Ok(records)
    }
}
