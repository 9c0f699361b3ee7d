use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use workflow::Turn;

/// Per-round consumption limits. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimits {
    #[serde(default)]
    pub max_tokens_per_round: Option<u64>,
    #[serde(default)]
    pub max_cost_usd: Option<f64>,
    #[serde(default)]
    pub max_elapsed_minutes: Option<f64>,
}

impl BudgetLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, tokens: u64) -> Self {
        self.max_tokens_per_round = Some(tokens);
        self
    }

    pub fn with_max_cost(mut self, cost_usd: f64) -> Self {
        self.max_cost_usd = Some(cost_usd);
        self
    }

    pub fn with_max_elapsed_minutes(mut self, minutes: f64) -> Self {
        self.max_elapsed_minutes = Some(minutes);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BudgetViolation {
    Tokens { used: u64, limit: u64 },
    Cost { used: f64, limit: f64 },
    Time { elapsed_minutes: f64, limit: f64 },
}

impl BudgetViolation {
    pub fn limit_name(&self) -> &'static str {
        match self {
            BudgetViolation::Tokens { .. } => "tokens",
            BudgetViolation::Cost { .. } => "cost",
            BudgetViolation::Time { .. } => "time",
        }
    }
}

impl fmt::Display for BudgetViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetViolation::Tokens { used, limit } => {
                write!(f, "Token budget exceeded ({} > {})", used, limit)
            }
            BudgetViolation::Cost { used, limit } => {
                write!(f, "Cost budget exceeded (${:.4} > ${:.4})", used, limit)
            }
            BudgetViolation::Time { elapsed_minutes, limit } => {
                write!(f, "Time budget exceeded ({:.2}m > {:.2}m)", elapsed_minutes, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Healthy,
    Warning { usage: f64 },
    Critical { usage: f64 },
    Exceeded,
}

/// Running totals for one round.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    limits: BudgetLimits,
    total_tokens: u64,
    total_cost: f64,
    started: Instant,
    warning_threshold: f64,
    critical_threshold: f64,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        Self::started_at(limits, Instant::now())
    }

    pub fn started_at(limits: BudgetLimits, started: Instant) -> Self {
        Self {
            limits,
            total_tokens: 0,
            total_cost: 0.0,
            started,
            warning_threshold: 0.5,
            critical_threshold: 0.75,
        }
    }

    /// Pure accumulation; the turn itself is not validated.
    pub fn register(&mut self, turn: &Turn) {
        self.total_tokens = self.total_tokens.saturating_add(turn.tokens());
        self.total_cost += turn.cost_usd();
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn elapsed_minutes(&self) -> f64 {
        self.started.elapsed().as_secs_f64() / 60.0
    }

    /// First limit strictly exceeded, checked as tokens, cost, then time.
    pub fn check(&self) -> Option<BudgetViolation> {
        if let Some(limit) = self.limits.max_tokens_per_round {
            if self.total_tokens > limit {
                return Some(BudgetViolation::Tokens {
                    used: self.total_tokens,
                    limit,
                });
            }
        }

        if let Some(limit) = self.limits.max_cost_usd {
            if self.total_cost > limit {
                return Some(BudgetViolation::Cost {
                    used: self.total_cost,
                    limit,
                });
            }
        }

        if let Some(limit) = self.limits.max_elapsed_minutes {
            let elapsed_minutes = self.elapsed_minutes();
            if elapsed_minutes > limit {
                return Some(BudgetViolation::Time {
                    elapsed_minutes,
                    limit,
                });
            }
        }

        None
    }

    /// Highest used/limit ratio across the configured limits.
    pub fn usage_ratio(&self) -> Option<f64> {
        let ratios = [
            self.limits
                .max_tokens_per_round
                .map(|limit| ratio(self.total_tokens as f64, limit as f64)),
            self.limits
                .max_cost_usd
                .map(|limit| ratio(self.total_cost, limit)),
            self.limits
                .max_elapsed_minutes
                .map(|limit| ratio(self.elapsed_minutes(), limit)),
        ];

        ratios.into_iter().flatten().reduce(f64::max)
    }

    pub fn status(&self) -> BudgetStatus {
        let usage = match self.usage_ratio() {
            Some(usage) => usage,
            None => return BudgetStatus::Healthy,
        };

        if usage > 1.0 {
            BudgetStatus::Exceeded
        } else if usage >= self.critical_threshold {
            BudgetStatus::Critical { usage }
        } else if usage >= self.warning_threshold {
            BudgetStatus::Warning { usage }
        } else {
            BudgetStatus::Healthy
        }
    }
}

fn ratio(used: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        if used > 0.0 {
            return f64::INFINITY;
        }
        return 0.0;
    }
    used / limit
}
