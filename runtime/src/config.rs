//! Startup configuration read from `<base_dir>/config/*.json`.
//!
//! Every file maps onto a typed struct with declared defaults. Keys that no
//! struct declares are ignored during deserialization and never reach the
//! coordinator.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use knowledge::{BudgetLimits, ScoringKind, TurnStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use workflow::PromptKind;

pub const CONFIG_DIR: &str = "config";
pub const AGENTS_FILE: &str = "agents.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const LIMITS_FILE: &str = "limits.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file: {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

impl ParticipantProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            role: None,
            cost_per_1k_tokens: 0.0,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_cost_per_1k_tokens(mut self, rate: f64) -> Self {
        self.cost_per_1k_tokens = rate;
        self
    }

    /// Falls back to the id.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}

/// Contents of `agents.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub agents: Vec<ParticipantProfile>,
    #[serde(default)]
    pub default_order: Option<Vec<String>>,
}

impl Roster {
    pub fn new(agents: Vec<ParticipantProfile>) -> Self {
        Self {
            agents,
            default_order: None,
        }
    }

    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.default_order = Some(order);
        self
    }

    /// Declared turn order, or roster order when none is declared.
    pub fn order(&self) -> Vec<String> {
        match &self.default_order {
            Some(order) => order.clone(),
            None => self.agents.iter().map(|a| a.id.clone()).collect(),
        }
    }

    pub fn profile(&self, id: &str) -> Option<&ParticipantProfile> {
        self.agents.iter().find(|a| a.id == id)
    }
}

/// Contents of `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rounds: u32,
    pub talk_back_cycles: u32,
    pub round_objective: String,
    pub log_level: String,
    pub conversation_log_dir: PathBuf,
    pub project_memory_file: PathBuf,
    pub output_file: PathBuf,
    pub ledger_file: PathBuf,
    pub scoring: ScoringKind,
    /// Rubric focus keyword; the rubric's own default when unset.
    pub focus_keyword: Option<String>,
    pub kickoff_prompt: Option<PathBuf>,
    pub task_prompt: Option<PathBuf>,
    pub self_eval_prompt: Option<PathBuf>,
    pub review_prompt: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rounds: 1,
            talk_back_cycles: 0,
            round_objective: String::new(),
            log_level: "info".to_string(),
            conversation_log_dir: PathBuf::from("memory/logs"),
            project_memory_file: PathBuf::from("memory/project_memory.md"),
            output_file: PathBuf::from("output/saved_outputs.md"),
            ledger_file: PathBuf::from("rewards/agent_scores.json"),
            scoring: ScoringKind::Lines,
            focus_keyword: None,
            kickoff_prompt: None,
            task_prompt: None,
            self_eval_prompt: None,
            review_prompt: None,
        }
    }
}

impl Settings {
    pub fn prompt_path(&self, kind: PromptKind) -> Option<&Path> {
        match kind {
            PromptKind::Kickoff => self.kickoff_prompt.as_deref(),
            PromptKind::Task => self.task_prompt.as_deref(),
            PromptKind::SelfEval => self.self_eval_prompt.as_deref(),
            PromptKind::Review => self.review_prompt.as_deref(),
        }
    }
}

/// Contents of `limits.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(flatten)]
    pub budget: BudgetLimits,
    #[serde(default = "default_auto_pause")]
    pub auto_pause: bool,
}

fn default_auto_pause() -> bool {
    true
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            budget: BudgetLimits::unbounded(),
            auto_pause: true,
        }
    }
}

/// Storage locations resolved against the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub log_dir: PathBuf,
    pub project_memory_file: PathBuf,
    pub output_file: PathBuf,
    pub ledger_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub base_dir: PathBuf,
    pub roster: Roster,
    pub settings: Settings,
    pub limits: Limits,
}

impl RunConfig {
    pub fn new(base_dir: impl Into<PathBuf>, roster: Roster) -> Self {
        Self {
            base_dir: base_dir.into(),
            roster,
            settings: Settings::default(),
            limits: Limits::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Reads and validates all three configuration files.
    pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
        let config_dir = base_dir.join(CONFIG_DIR);
        let config = Self {
            base_dir: base_dir.to_path_buf(),
            roster: read_json(&config_dir.join(AGENTS_FILE))?,
            settings: read_json(&config_dir.join(SETTINGS_FILE))?,
            limits: read_json(&config_dir.join(LIMITS_FILE))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roster.agents.is_empty() {
            return Err(ConfigError::Invalid("no participants configured".to_string()));
        }

        let mut seen = HashSet::new();
        let mut log_files = HashMap::new();
        for agent in &self.roster.agents {
            if agent.id.trim().is_empty() {
                return Err(ConfigError::Invalid("participant with empty id".to_string()));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate participant id: {}",
                    agent.id
                )));
            }
            let log_file = TurnStore::log_file_name(&agent.id);
            if let Some(other) = log_files.insert(log_file, agent.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "participant ids {} and {} share a turn log",
                    other, agent.id
                )));
            }
        }

        let order = self.roster.order();
        if order.is_empty() {
            return Err(ConfigError::Invalid("turn order is empty".to_string()));
        }
        if let Some(unknown) = order.iter().find(|id| !seen.contains(id.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "turn order names unknown participant: {}",
                unknown
            )));
        }

        Ok(())
    }

    pub fn paths(&self) -> StoragePaths {
        StoragePaths {
            log_dir: self.resolve(&self.settings.conversation_log_dir),
            project_memory_file: self.resolve(&self.settings.project_memory_file),
            output_file: self.resolve(&self.settings.output_file),
            ledger_file: self.resolve(&self.settings.ledger_file),
        }
    }

    /// Relative paths are taken from the base directory; absolute ones are kept.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
