use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Unknown prompt kind: {0}")]
    UnknownPromptKind(String),
}

/// The four steps of a round. Rounds always walk them in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Kickoff,
    Task,
    Review,
    Finalize,
}

impl Phase {
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Kickoff => Some(Phase::Task),
            Phase::Task => Some(Phase::Review),
            Phase::Review => Some(Phase::Finalize),
            Phase::Finalize => None,
        }
    }

    pub fn all() -> &'static [Phase] {
        &[Phase::Kickoff, Phase::Task, Phase::Review, Phase::Finalize]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Kickoff => "kickoff",
            Phase::Task => "task",
            Phase::Review => "review",
            Phase::Finalize => "finalize",
        }
    }

    /// Prompt a participant receives during this phase. Finalize has none.
    pub fn prompt_kind(&self) -> Option<PromptKind> {
        match self {
            Phase::Kickoff => Some(PromptKind::Kickoff),
            Phase::Task => Some(PromptKind::Task),
            Phase::Review => Some(PromptKind::Review),
            Phase::Finalize => None,
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Kickoff
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a participant is being asked to do on a given turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Kickoff,
    Task,
    SelfEval,
    Review,
}

impl PromptKind {
    pub fn all() -> &'static [PromptKind] {
        &[
            PromptKind::Kickoff,
            PromptKind::Task,
            PromptKind::SelfEval,
            PromptKind::Review,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Kickoff => "kickoff",
            PromptKind::Task => "task",
            PromptKind::SelfEval => "self_eval",
            PromptKind::Review => "review",
        }
    }

    /// Settings key naming the template file for this kind.
    pub fn template_key(&self) -> &'static str {
        match self {
            PromptKind::Kickoff => "kickoff_prompt",
            PromptKind::Task => "task_prompt",
            PromptKind::SelfEval => "self_eval_prompt",
            PromptKind::Review => "review_prompt",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kickoff" => Ok(PromptKind::Kickoff),
            "task" => Ok(PromptKind::Task),
            "self_eval" | "self-eval" => Ok(PromptKind::SelfEval),
            "review" => Ok(PromptKind::Review),
            other => Err(WorkflowError::UnknownPromptKind(other.to_string())),
        }
    }
}
