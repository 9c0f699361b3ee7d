mod archive;
mod budget;
mod error;
mod ledger;
mod scoring;
mod store;
mod tokens;

pub use archive::SummaryArchive;
pub use budget::{BudgetLimits, BudgetStatus, BudgetTracker, BudgetViolation};
pub use error::StoreError;
pub use ledger::{LedgerEntry, RewardLedger, Scores};
pub use scoring::{Contribution, LineHeuristic, RubricPolicy, ScoringKind, ScoringPolicy};
pub use store::{TurnRecord, TurnStore};
pub use tokens::{TokenCounter, TokenizerError};
