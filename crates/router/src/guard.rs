//! Caller-side enforcement of a route's execution budget.
//!
//! The resolver only emits the budget.  A [`BudgetGuard`] is checked at
//! every step boundary (before a turn, before a sub-operation) and
//! reports the first limit that would be crossed.

use std::time::{Duration, Instant};

use crate::codes;
use crate::route::{EffectiveRoute, ExecutionBudget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BudgetExceeded {
    #[error("time budget of {limit_secs}s exceeded after {elapsed_secs}s")]
    Time { elapsed_secs: u64, limit_secs: u32 },
    #[error("turn budget of {limit} exhausted")]
    Turns { limit: u32 },
    #[error("sub-operation budget of {limit} exhausted")]
    SubOps { limit: u32 },
}

impl BudgetExceeded {
    pub fn reason_code(&self) -> &'static str {
        match self {
            BudgetExceeded::Time { .. } => codes::BUDGET_TIME_EXCEEDED,
            BudgetExceeded::Turns { .. } => codes::BUDGET_TURNS_EXCEEDED,
            BudgetExceeded::SubOps { .. } => codes::BUDGET_SUB_OPS_EXCEEDED,
        }
    }
}

#[derive(Debug)]
pub struct BudgetGuard {
    budget: ExecutionBudget,
    started: Instant,
    turns: u32,
    sub_ops: u32,
}

impl BudgetGuard {
    pub fn new(route: &EffectiveRoute) -> Self {
        Self::starting_at(*route.budget(), Instant::now())
    }

    pub fn starting_at(budget: ExecutionBudget, started: Instant) -> Self {
        Self {
            budget,
            started,
            turns: 0,
            sub_ops: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining_time(&self) -> Duration {
        Duration::from_secs(u64::from(self.budget.time_budget_seconds)).saturating_sub(self.elapsed())
    }

    pub fn turns_used(&self) -> u32 {
        self.turns
    }

    pub fn sub_ops_used(&self) -> u32 {
        self.sub_ops
    }

    /// Claim the next turn.
    pub fn begin_turn(&mut self) -> Result<(), BudgetExceeded> {
        self.check_time()?;
        if self.turns >= self.budget.max_turns {
            return Err(BudgetExceeded::Turns {
                limit: self.budget.max_turns,
            });
        }
        self.turns += 1;
        Ok(())
    }

    /// Claim the next sub-operation slot.
    pub fn begin_sub_op(&mut self) -> Result<(), BudgetExceeded> {
        self.check_time()?;
        if self.sub_ops >= self.budget.max_sub_ops {
            return Err(BudgetExceeded::SubOps {
                limit: self.budget.max_sub_ops,
            });
        }
        self.sub_ops += 1;
        Ok(())
    }

    pub fn check_time(&self) -> Result<(), BudgetExceeded> {
        let elapsed = self.elapsed();
        let limit = Duration::from_secs(u64::from(self.budget.time_budget_seconds));
        if elapsed > limit {
            return Err(BudgetExceeded::Time {
                elapsed_secs: elapsed.as_secs(),
                limit_secs: self.budget.time_budget_seconds,
            });
        }
        Ok(())
    }

    /// Record the breach on the route and log it.
    pub fn abort(route: &mut EffectiveRoute, breach: BudgetExceeded) {
        tracing::info!(mode = %route.mode(), error = %breach, "aborting work item");
        route.append_reason_code(breach.reason_code());
    }
}
