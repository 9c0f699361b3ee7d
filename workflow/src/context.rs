use crate::turn::Turn;

/// Mutable state of a single round. Only the coordinator writes to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundContext {
    pub round: u32,
    pub objective: String,
    pub project_memory: String,
    pub conversation_summary: String,
}

impl RoundContext {
    pub fn new(round: u32, objective: impl Into<String>) -> Self {
        Self {
            round,
            objective: objective.into(),
            project_memory: String::new(),
            conversation_summary: String::new(),
        }
    }

    pub fn with_project_memory(mut self, memory: impl Into<String>) -> Self {
        self.project_memory = memory.into();
        self
    }

    pub fn summary(&self) -> &str {
        &self.conversation_summary
    }

    /// Kickoff turns set the summary verbatim.
    pub fn replace_summary(&mut self, content: impl Into<String>) {
        self.conversation_summary = content.into();
    }

    /// Appends `"<participant>: <trimmed content>"` as a new line.
    pub fn append_turn(&mut self, turn: &Turn) {
        let updated = format!(
            "{}\n{}: {}",
            self.conversation_summary,
            turn.participant_id(),
            turn.content().trim()
        );
        self.conversation_summary = updated.trim().to_string();
    }
}
