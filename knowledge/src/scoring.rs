//! Contribution scoring policies for the reward ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of scoring one contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contribution {
    pub score: u64,
    pub dimensions: BTreeMap<String, u64>,
}

impl Contribution {
    pub fn new(score: u64) -> Self {
        Self {
            score,
            dimensions: BTreeMap::new(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: u64) -> Self {
        self.dimensions.insert(name.into(), value);
        self
    }
}

pub trait ScoringPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, content: &str) -> Contribution;
}

/// Rewards non-empty, multi-line output: one point per non-blank line,
/// at least one and at most `max_per_contribution`.
#[derive(Debug, Clone)]
pub struct LineHeuristic {
    max_per_contribution: u64,
}

impl LineHeuristic {
    pub fn new() -> Self {
        Self {
            max_per_contribution: 5,
        }
    }

    pub fn with_cap(mut self, cap: u64) -> Self {
        self.max_per_contribution = cap.max(1);
        self
    }
}

impl Default for LineHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoringPolicy for LineHeuristic {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn evaluate(&self, content: &str) -> Contribution {
        if content.is_empty() {
            return Contribution::new(0);
        }
        let lines = content.lines().filter(|l| !l.trim().is_empty()).count() as u64;
        Contribution::new(lines.clamp(1, self.max_per_contribution))
    }
}

/// Per-dimension rubric: efficiency, insight and collaboration are tracked
/// alongside the score.
#[derive(Debug, Clone)]
pub struct RubricPolicy {
    focus_keyword: String,
    concise_word_limit: usize,
}

impl RubricPolicy {
    pub fn new() -> Self {
        Self {
            focus_keyword: "workflow".to_string(),
            concise_word_limit: 140,
        }
    }

    pub fn with_focus_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.focus_keyword = keyword.into().to_lowercase();
        self
    }
}

impl Default for RubricPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoringPolicy for RubricPolicy {
    fn name(&self) -> &'static str {
        "rubric"
    }

    fn evaluate(&self, content: &str) -> Contribution {
        let words = content.split_whitespace().count();
        let efficiency = if words <= self.concise_word_limit { 5 } else { 3 };
        let on_focus = content.to_lowercase().contains(&self.focus_keyword);
        let insight = if on_focus { 5 } else { 3 };
        let score = if on_focus { 2 } else { 1 };

        Contribution::new(score)
            .with_dimension("efficiency", efficiency)
            .with_dimension("insight", insight)
            .with_dimension("collaboration", 4)
    }
}

/// Policy selector as it appears in the settings file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringKind {
    #[default]
    Lines,
    Rubric,
}

impl ScoringKind {
    /// `focus_keyword` only applies to the rubric.
    pub fn policy(&self, focus_keyword: Option<&str>) -> Box<dyn ScoringPolicy> {
        match self {
            ScoringKind::Lines => Box::new(LineHeuristic::new()),
            ScoringKind::Rubric => match focus_keyword {
                Some(keyword) => Box::new(RubricPolicy::new().with_focus_keyword(keyword)),
                None => Box::new(RubricPolicy::new()),
            },
        }
    }
}
