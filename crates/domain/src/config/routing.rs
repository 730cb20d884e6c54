use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::lane::LaneKey;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Route → lane assignment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which lane each execution mode prefers, plus route audit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "d_instant")]
    pub instant: LaneAssignment,
    #[serde(default = "d_task")]
    pub task: LaneAssignment,
    #[serde(default = "d_agent_loop")]
    pub agent_loop: LaneAssignment,
    /// Number of route audit records kept in memory.
    #[serde(default = "d_500")]
    pub audit_capacity: usize,
    /// Optional JSONL file every audit record is appended to.
    #[serde(default)]
    pub audit_path: Option<PathBuf>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            instant: d_instant(),
            task: d_task(),
            agent_loop: d_agent_loop(),
            audit_capacity: d_500(),
            audit_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneAssignment {
    pub lane: String,
    pub provider: String,
}

impl LaneAssignment {
    pub fn key(&self) -> LaneKey {
        LaneKey::new(self.lane.clone(), self.provider.clone())
    }
}

fn assign(lane: &str, provider: &str) -> LaneAssignment {
    LaneAssignment {
        lane: lane.into(),
        provider: provider.into(),
    }
}

fn d_instant() -> LaneAssignment {
    assign("local", "local")
}

fn d_task() -> LaneAssignment {
    assign("stable", "openai")
}

fn d_agent_loop() -> LaneAssignment {
    assign("high", "openai")
}

fn d_500() -> usize {
    500
}
