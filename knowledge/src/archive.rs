use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::Span;
use workflow::RoundContext;

use crate::error::{ensure_parent, StoreError};

/// Append-only markdown record of each finalized round.
#[derive(Debug, Clone)]
pub struct SummaryArchive {
    path: PathBuf,
    span: Span,
}

impl SummaryArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_round(&self, context: &RoundContext) -> Result<(), StoreError> {
        ensure_parent(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::write(&self.path, e))?;

        write!(
            file,
            "\n## Round {} Summary\n\n{}\n",
            context.round,
            context.summary().trim()
        )
        .map_err(|e| StoreError::write(&self.path, e))?;

        tracing::info!(parent: &self.span, round = context.round, "Archived round summary");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sections_accumulate() {
        let dir = TempDir::new().unwrap();
        let archive = SummaryArchive::new(dir.path().join("output/saved_outputs.md"));

        let mut first = RoundContext::new(1, "");
        first.replace_summary("  alpha  ");
        archive.append_round(&first).unwrap();

        let mut second = RoundContext::new(2, "");
        second.replace_summary("beta");
        archive.append_round(&second).unwrap();

        let written = std::fs::read_to_string(archive.path()).unwrap();
        assert_eq!(
            written,
            "\n## Round 1 Summary\n\nalpha\n\n## Round 2 Summary\n\nbeta\n"
        );
    }
}
