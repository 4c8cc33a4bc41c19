//! Application services - Orchestration of domain logic

pub mod cleanup_service;
pub mod fee_service;
pub mod lifecycle_service;

pub use cleanup_service::{
    CleanupOutcome, CleanupService, CleanupStats, PendingSummary, ReaperHealth,
};
pub use fee_service::{BulkFeeItem, BulkFeeOutcome, FeeEngine, FeeRequest, FeeService};
pub use lifecycle_service::{
    BulkItemError, BulkRecalculateFilter, BulkRecalculateReport, CreateLinkRequest,
    CreateLinkResponse, PaymentLifecycleService, WebhookOutcome,
};
