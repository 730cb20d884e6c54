//! Quota ledger: reservation/commit/rollback bookkeeping over per-lane
//! buckets, daily window rollover, per-tenant plus global enforcement,
//! and drift reconciliation against an external usage report.

pub mod bucket;
pub mod clock;
pub mod hourly;
pub mod ledger;
pub mod state;
pub mod store;
pub mod sync;
pub mod usage;

pub use bucket::Bucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{
    BucketStatus, CallDecision, ExhaustedBudget, QuotaLedger, RemainingBudget, RollbackMode,
    SyncOutcome,
};
pub use state::Scope;
pub use sync::{HttpUsageReporter, UsageReporter, UsageSync};
pub use usage::Usage;
