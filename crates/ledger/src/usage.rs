use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// An accumulable usage measurement.
///
/// Subtraction saturates at zero in every field; usage never goes negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub cost_units: f64,
}

impl Usage {
    pub fn new(tokens_in: u64, tokens_out: u64, cost_units: f64) -> Self {
        Self {
            tokens_in,
            tokens_out,
            cost_units: sanitize_cost(cost_units),
        }
    }

    /// Token-only usage with zero cost.
    pub fn tokens(tokens_in: u64, tokens_out: u64) -> Self {
        Self::new(tokens_in, tokens_out, 0.0)
    }

    /// Cost-only usage with zero tokens.
    pub fn cost(cost_units: f64) -> Self {
        Self::new(0, 0, cost_units)
    }

    pub fn total_tokens(&self) -> u64 {
        self.tokens_in.saturating_add(self.tokens_out)
    }

    pub fn is_zero(&self) -> bool {
        self.tokens_in == 0 && self.tokens_out == 0 && self.cost_units <= 0.0
    }

    pub fn saturating_sub(&self, other: &Usage) -> Usage {
        Usage {
            tokens_in: self.tokens_in.saturating_sub(other.tokens_in),
            tokens_out: self.tokens_out.saturating_sub(other.tokens_out),
            cost_units: (self.cost_units - other.cost_units).max(0.0),
        }
    }

    pub fn sub_assign_saturating(&mut self, other: &Usage) {
        *self = self.saturating_sub(other);
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            tokens_in: self.tokens_in.saturating_add(rhs.tokens_in),
            tokens_out: self.tokens_out.saturating_add(rhs.tokens_out),
            cost_units: self.cost_units + sanitize_cost(rhs.cost_units),
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// Negative or non-finite costs count as zero.
fn sanitize_cost(cost: f64) -> f64 {
    if cost.is_finite() && cost > 0.0 {
        cost
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_every_field() {
        let mut u = Usage::new(10, 20, 0.5);
        u += Usage::new(1, 2, 0.25);
        assert_eq!(u, Usage::new(11, 22, 0.75));
        assert_eq!(u.total_tokens(), 33);
    }

    #[test]
    fn sub_saturates_at_zero() {
        let u = Usage::new(5, 5, 0.1);
        let r = u.saturating_sub(&Usage::new(10, 1, 1.0));
        assert_eq!(r, Usage::new(0, 4, 0.0));
    }

    #[test]
    fn invalid_costs_are_ignored() {
        assert_eq!(Usage::cost(-3.0).cost_units, 0.0);
        assert_eq!(Usage::cost(f64::NAN).cost_units, 0.0);
        let mut u = Usage::cost(1.0);
        u += Usage {
            cost_units: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(u.cost_units, 1.0);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(Usage::new(1, 2, 0.5)).unwrap();
        assert_eq!(json["tokensIn"], 1);
        assert_eq!(json["tokensOut"], 2);
        assert_eq!(json["costUnits"], 0.5);
    }
}
