mod config;
mod coordinator;
mod error;
mod participant;
mod prompts;

pub use config::{
    ConfigError, Limits, ParticipantProfile, Roster, RunConfig, Settings, StoragePaths,
    AGENTS_FILE, CONFIG_DIR, LIMITS_FILE, SETTINGS_FILE,
};
pub use coordinator::{BudgetVerdict, RoundCoordinator, RoundReport, RunReport, TurnTrace};
pub use error::RunError;
pub use participant::{
    build_participants, Generation, GenerationError, GenerationRequest, Generator, Participant,
    StubGenerator,
};
pub use prompts::PromptLibrary;
