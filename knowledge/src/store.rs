//! Append-only turn log, one JSON Lines file per participant.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Span;
use workflow::{Phase, RoundContext, Turn};

use crate::error::{ensure_parent, StoreError};

/// One persisted line of a participant log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub participant_id: String,
    pub timestamp: DateTime<Utc>,
    pub round: u32,
    pub phase: Phase,
    pub tokens: u64,
    pub cost: f64,
    pub summary_snapshot: String,
    pub content: String,
}

impl TurnRecord {
    pub fn new(turn: &Turn, phase: Phase, context: &RoundContext) -> Self {
        Self {
            participant_id: turn.participant_id().to_string(),
            timestamp: Utc::now(),
            round: context.round,
            phase,
            tokens: turn.tokens(),
            cost: turn.cost_usd(),
            summary_snapshot: context.summary().to_string(),
            content: turn.content().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnStore {
    log_dir: PathBuf,
    span: Span,
}

impl TurnStore {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// File name of a participant's log. Characters outside `[A-Za-z0-9_-]`
    /// become `_`, so distinct ids can share a name.
    pub fn log_file_name(participant_id: &str) -> String {
        let file_stem: String = participant_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}_log.jsonl", file_stem)
    }

    pub fn log_path(&self, participant_id: &str) -> PathBuf {
        self.log_dir.join(Self::log_file_name(participant_id))
    }

    /// Appends the turn together with the summary as it stood before the turn.
    pub fn append(
        &self,
        turn: &Turn,
        phase: Phase,
        context: &RoundContext,
    ) -> Result<(), StoreError> {
        let path = self.log_path(turn.participant_id());
        let record = TurnRecord::new(turn, phase, context);
        let line = serde_json::to_string(&record)?;

        ensure_parent(&path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::write(&path, e))?;
        writeln!(file, "{}", line).map_err(|e| StoreError::write(&path, e))?;

        tracing::debug!(
            parent: &self.span,
            participant = turn.participant_id(),
            round = context.round,
            phase = %phase,
            "Logged turn"
        );
        Ok(())
    }

    /// Reads back every record for a participant, oldest first. Records of
    /// other ids sharing the same file are skipped.
    pub fn records(&self, participant_id: &str) -> Result<Vec<TurnRecord>, StoreError> {
        let path = self.log_path(participant_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::read(&path, e)),
        };

        let records: Vec<TurnRecord> = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect::<Result<_, _>>()?;
        Ok(records
            .into_iter()
            .filter(|record| record.participant_id == participant_id)
            .collect())
    }
}
