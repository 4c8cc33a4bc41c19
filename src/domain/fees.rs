//! Platform fee domain models
//!
//! Fee configurations are versioned and time-windowed: once transactions
//! have settled against a configuration it is never edited, only superseded
//! by a new version with a later effective window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Round a currency amount to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// How a fee configuration computes its fee
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    Percentage,
    Fixed,
}

impl FeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeType::Percentage => "percentage",
            FeeType::Fixed => "fixed",
        }
    }
}

/// Scope a configuration applies to, from most to least specific
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum FeeScope {
    Global,
    Tenant {
        tenant_id: String,
        channel_bundle_id: Option<String>,
    },
}

impl FeeScope {
    pub fn label(&self) -> &'static str {
        match self {
            FeeScope::Global => "global",
            FeeScope::Tenant { channel_bundle_id: Some(_), .. } => "tenant_bundle",
            FeeScope::Tenant { .. } => "tenant",
        }
    }
}

/// Usage counters maintained per configuration, best-effort
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub transactions_affected: u64,
    pub total_fees_collected: f64,
    pub last_used: Option<DateTime<Utc>>,
}

/// A versioned platform-fee configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfiguration {
    pub config_id: String,
    pub version: u32,
    pub scope: FeeScope,
    pub fee_type: FeeType,
    /// Percentage rate (e.g. 2.9) or fixed amount, per `fee_type`
    pub rate: f64,
    pub min_fee: Option<f64>,
    pub max_fee: Option<f64>,
    pub effective_from: DateTime<Utc>,
    /// Open window when None
    pub effective_to: Option<DateTime<Utc>>,
    pub currency: String,
    #[serde(default)]
    pub usage: UsageStats,
}

impl FeeConfiguration {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.map_or(true, |to| to > at)
    }

    /// Compute the fee for a transaction amount, clamped into
    /// `[min_fee, max_fee]` where configured and rounded to 2 decimals.
    pub fn calculate_fee(&self, amount: f64) -> f64 {
        let mut fee = match self.fee_type {
            FeeType::Percentage => amount * self.rate / 100.0,
            FeeType::Fixed => self.rate,
        };
        if let Some(min) = self.min_fee {
            if fee < min {
                fee = min;
            }
        }
        if let Some(max) = self.max_fee {
            if fee > max {
                fee = max;
            }
        }
        round2(fee)
    }
}

/// Reference to the configuration a calculation used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRef {
    pub config_id: String,
    pub version: u32,
    pub scope: String,
    pub effective_from: DateTime<Utc>,
}

/// Which limits clamped a computed fee, if any
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppliedLimits {
    pub min_fee_applied: bool,
    pub max_fee_applied: bool,
}

/// Itemized result of one fee computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub gross_amount: f64,
    pub platform_fee: f64,
    pub net_amount: f64,
    pub applied_limits: Option<AppliedLimits>,
}

/// Full outcome of a fee calculation for one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeCalculation {
    pub transaction_amount: f64,
    pub platform_fee: f64,
    pub net_amount: f64,
    /// "percentage" | "fixed" | "none"
    pub fee_type: String,
    pub fee_rate: Option<f64>,
    pub currency: String,
    pub config_used: Option<ConfigRef>,
    pub calculated_at: DateTime<Utc>,
    pub breakdown: FeeBreakdown,
}

impl FeeCalculation {
    /// Zero-fee calculation used when no configuration applies.
    pub fn zero(amount: f64, at: DateTime<Utc>) -> Self {
        FeeCalculation {
            transaction_amount: amount,
            platform_fee: 0.0,
            net_amount: amount,
            fee_type: "none".to_string(),
            fee_rate: None,
            currency: "INR".to_string(),
            config_used: None,
            calculated_at: at,
            breakdown: FeeBreakdown {
                gross_amount: amount,
                platform_fee: 0.0,
                net_amount: amount,
                applied_limits: None,
            },
        }
    }
}

/// Fee data persisted on a settled payment record.
///
/// `fallback` marks non-authoritative data: the primary fee service was
/// unavailable and a fallback level produced the numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeCalculationData {
    pub config_id: Option<String>,
    pub version: Option<u32>,
    pub fee_type: String,
    pub fee_rate: Option<f64>,
    pub calculated_at: DateTime<Utc>,
    pub breakdown: FeeBreakdown,
    pub fallback: bool,
    #[serde(default)]
    pub recalculated: bool,
    pub recalculated_at: Option<DateTime<Utc>>,
}

impl FeeCalculationData {
    pub fn from_calculation(calc: &FeeCalculation) -> Self {
        FeeCalculationData {
            config_id: calc.config_used.as_ref().map(|c| c.config_id.clone()),
            version: calc.config_used.as_ref().map(|c| c.version),
            fee_type: calc.fee_type.clone(),
            fee_rate: calc.fee_rate,
            calculated_at: calc.calculated_at,
            breakdown: calc.breakdown.clone(),
            fallback: false,
            recalculated: false,
            recalculated_at: None,
        }
    }
}
