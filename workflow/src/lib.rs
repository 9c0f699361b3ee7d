mod phase;
mod turn;
mod context;

pub use phase::{Phase, PromptKind, WorkflowError};
pub use turn::Turn;
pub use context::RoundContext;
