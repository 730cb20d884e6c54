//! Route decision engine: turns risk/complexity signals into a bounded,
//! auditable execution plan.

pub mod audit;
pub mod codes;
pub mod guard;
pub mod plan;
pub mod resolve;
pub mod route;
pub mod signals;

// Re-exports for convenience.
pub use audit::{RouteAuditLog, RouteAuditRecord};
pub use guard::{BudgetExceeded, BudgetGuard};
pub use plan::{plan_lane, LanePlan};
pub use resolve::resolve;
pub use route::{EffectiveRoute, ExecutionBudget, Mode, ReasonCodes, RiskLevel, RouteScores};
pub use signals::{BudgetHint, RouteHint, RouteSignals};
