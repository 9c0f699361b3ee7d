use knowledge::{BudgetViolation, StoreError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::participant::GenerationError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Round {round} halted after {participant}'s turn: {violation}")]
    BudgetExceeded {
        round: u32,
        participant: String,
        violation: BudgetViolation,
    },

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Participant not found: {0}")]
    UnknownParticipant(String),
}
