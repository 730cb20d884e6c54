//! Stable reason codes attached to routes.

pub const VISION_FLOOR_APPLIED: &str = "router_vision_floor_applied";
pub const MODE_FORCED_SAFE: &str = "router_mode_forced_safe";
pub const MODE_FORCED_TOOLS: &str = "router_mode_forced_tools";
pub const BUDGET_HINT_APPLIED: &str = "router_budget_hint_applied";
pub const BUDGET_CLAMPED: &str = "router_budget_clamped";
pub const TOOL_SLOTS_REMOVED: &str = "router_tool_slots_removed";

// Appended by callers that abort early.
pub const BUDGET_TIME_EXCEEDED: &str = "budget_time_exceeded";
pub const BUDGET_TURNS_EXCEEDED: &str = "budget_turns_exceeded";
pub const BUDGET_SUB_OPS_EXCEEDED: &str = "budget_sub_ops_exceeded";

// Lane planning.
pub const LANE_QUOTA_FALLBACK: &str = "lane_quota_fallback";
pub const LANE_QUOTA_EXHAUSTED: &str = "lane_quota_exhausted";
