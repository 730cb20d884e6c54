//! The resolved route and the value types it is built from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How much autonomy a work item gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Single-shot answer, no tools.
    Instant,
    /// Bounded multi-turn work with a few tool calls.
    Task,
    /// Open-ended agent loop.
    AgentLoop,
}

impl Mode {
    /// Mode implied by a route score.  Boundaries belong to the cheaper
    /// mode: `0.30` is `Instant`, `0.60` is `Task`.
    pub fn for_score(score: f64) -> Self {
        if score <= 0.30 {
            Mode::Instant
        } else if score <= 0.60 {
            Mode::Task
        } else {
            Mode::AgentLoop
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Instant => "Instant",
            Mode::Task => "Task",
            Mode::AgentLoop => "AgentLoop",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Case-insensitive; `_`, `-` and spaces are ignored so `agent_loop`
    /// and `Agent Loop` both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "instant" => Ok(Mode::Instant),
            "task" => Ok(Mode::Task),
            "agentloop" | "agent" => Ok(Mode::AgentLoop),
            _ => Err(format!("unknown mode '{s}'")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Risk level
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn is_elevated(self) -> bool {
        self >= RiskLevel::High
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(format!("unknown risk level '{s}'")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Budget and scores
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionBudget {
    pub max_turns: u32,
    pub max_sub_ops: u32,
    pub time_budget_seconds: u32,
}

impl ExecutionBudget {
    pub const TURNS: (u32, u32) = (1, 20);
    pub const SUB_OPS: (u32, u32) = (0, 20);
    pub const TIME_SECONDS: (u32, u32) = (10, 1800);

    pub const fn new(max_turns: u32, max_sub_ops: u32, time_budget_seconds: u32) -> Self {
        Self {
            max_turns,
            max_sub_ops,
            time_budget_seconds,
        }
    }

    pub fn default_for(mode: Mode) -> Self {
        match mode {
            Mode::Instant => Self::new(2, 0, 25),
            Mode::Task => Self::new(5, 5, 120),
            Mode::AgentLoop => Self::new(8, 10, 300),
        }
    }
}

/// Normalised input scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteScores {
    pub difficulty: f64,
    pub complexity: f64,
    pub action: f64,
    pub security_risk: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reason codes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append-only, de-duplicated, insertion-ordered list of reason codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ReasonCodes(Vec<String>);

impl ReasonCodes {
    /// Returns `false` when the code was already present.
    pub fn push(&mut self, code: &str) -> bool {
        if self.contains(code) {
            return false;
        }
        self.0.push(code.to_owned());
        true
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for ReasonCodes {
    fn from(codes: Vec<String>) -> Self {
        let mut out = ReasonCodes::default();
        for code in &codes {
            out.push(code);
        }
        out
    }
}

impl From<ReasonCodes> for Vec<String> {
    fn from(codes: ReasonCodes) -> Self {
        codes.0
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Effective route
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The bounded execution plan for one work item.
///
/// Fields are read-only outside this crate.  The single mutation a
/// caller may make is [`append_reason_code`](Self::append_reason_code),
/// used when it aborts early.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveRoute {
    pub(crate) mode: Mode,
    pub(crate) function_category: String,
    pub(crate) route_score: f64,
    pub(crate) scores: RouteScores,
    pub(crate) security_risk_level: RiskLevel,
    pub(crate) budget: ExecutionBudget,
    pub(crate) reason_codes: ReasonCodes,
    pub(crate) source_hint_present: bool,
}

impl EffectiveRoute {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn function_category(&self) -> &str {
        &self.function_category
    }

    pub fn route_score(&self) -> f64 {
        self.route_score
    }

    pub fn scores(&self) -> &RouteScores {
        &self.scores
    }

    pub fn security_risk_level(&self) -> RiskLevel {
        self.security_risk_level
    }

    pub fn budget(&self) -> &ExecutionBudget {
        &self.budget
    }

    pub fn reason_codes(&self) -> &[String] {
        self.reason_codes.as_slice()
    }

    pub fn has_reason(&self, code: &str) -> bool {
        self.reason_codes.contains(code)
    }

    pub fn source_hint_present(&self) -> bool {
        self.source_hint_present
    }

    /// Record why the caller cut execution short.  Duplicates are ignored.
    pub fn append_reason_code(&mut self, code: &str) -> bool {
        self.reason_codes.push(code)
    }
}
