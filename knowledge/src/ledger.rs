//! Persisted participant → cumulative score mapping.
//!
//! The whole mapping is read once when the ledger is opened and rewritten in
//! full after every update. A missing file starts an empty ledger; an
//! unparsable one is logged and replaced by an empty ledger on the next write.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::error::{ensure_parent, StoreError};
use crate::scoring::{Contribution, LineHeuristic, ScoringPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub contributions: u64,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: BTreeMap<String, u64>,
}

pub type Scores = BTreeMap<String, LedgerEntry>;

pub struct RewardLedger {
    path: PathBuf,
    entries: Scores,
    policy: Box<dyn ScoringPolicy>,
    span: Span,
}

impl RewardLedger {
    /// Opens the ledger with the default line heuristic.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(path, Box::new(LineHeuristic::new()), Span::current())
    }

    pub fn open(
        path: impl Into<PathBuf>,
        policy: Box<dyn ScoringPolicy>,
        span: Span,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = Self::read_entries(&path, &span)?;
        tracing::debug!(
            parent: &span,
            path = %path.display(),
            participants = entries.len(),
            policy = policy.name(),
            "Loaded reward ledger"
        );

        Ok(Self {
            path,
            entries,
            policy,
            span,
        })
    }

    fn read_entries(path: &Path, span: &Span) -> Result<Scores, StoreError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Scores::new()),
            Err(e) => return Err(StoreError::read(path, e)),
        };

        match serde_json::from_slice(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(
                    parent: span,
                    path = %path.display(),
                    error = %e,
                    "Failed to parse rewards file; starting from an empty ledger"
                );
                Ok(Scores::new())
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scores `content` and adds the result to the participant's entry, then
    /// rewrites the ledger file.
    pub fn record(
        &mut self,
        participant_id: &str,
        content: &str,
    ) -> Result<Contribution, StoreError> {
        let contribution = self.policy.evaluate(content);

        let entry = self.entries.entry(participant_id.to_string()).or_default();
        entry.score = entry.score.saturating_add(contribution.score);
        entry.contributions = entry.contributions.saturating_add(1);
        entry.last_updated = Some(Utc::now().to_rfc3339());
        for (dimension, value) in &contribution.dimensions {
            let total = entry.dimensions.entry(dimension.clone()).or_insert(0);
            *total = total.saturating_add(*value);
        }

        self.persist()?;
        tracing::debug!(
            parent: &self.span,
            participant = participant_id,
            delta = contribution.score,
            "Recorded contribution"
        );
        Ok(contribution)
    }

    /// Live view of the mapping; later `record` calls are visible through it.
    pub fn snapshot(&self) -> &Scores {
        &self.entries
    }

    pub fn score(&self, participant_id: &str) -> Option<u64> {
        self.entries.get(participant_id).map(|e| e.score)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        ensure_parent(&self.path)?;
        fs::write(&self.path, json).map_err(|e| StoreError::write(&self.path, e))
    }
}
