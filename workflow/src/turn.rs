use serde::{Deserialize, Serialize};

/// One unit of content produced by one participant.
///
/// Turns are never modified after creation; the coordinator routes them
/// through the bookkeeping components and then drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    participant_id: String,
    content: String,
    cost_usd: f64,
    tokens: u64,
}

impl Turn {
    /// Negative costs are clamped to zero.
    pub fn new(
        participant_id: impl Into<String>,
        content: impl Into<String>,
        cost_usd: f64,
        tokens: u64,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            content: content.into(),
            cost_usd: cost_usd.max(0.0),
            tokens,
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn cost_usd(&self) -> f64 {
        self.cost_usd
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }
}
