use std::collections::HashMap;
use std::fs;

use tracing::Span;
use workflow::{PromptKind, RoundContext};

use crate::config::{ParticipantProfile, RunConfig};

/// Prompt templates keyed by kind. Missing templates are empty strings.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<PromptKind, String>,
    span: Span,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_template(mut self, kind: PromptKind, template: impl Into<String>) -> Self {
        self.templates.insert(kind, template.into());
        self
    }

    /// Loads every template named in the settings. Unreadable files degrade
    /// to empty templates.
    pub fn load(config: &RunConfig, span: Span) -> Self {
        let mut library = Self::new().with_span(span);

        for kind in PromptKind::all() {
            let path = match config.settings.prompt_path(*kind) {
                Some(path) => config.resolve(path),
                None => continue,
            };

            let template = match fs::read_to_string(&path) {
                Ok(template) => template,
                Err(e) => {
                    tracing::warn!(
                        parent: &library.span,
                        prompt = kind.template_key(),
                        path = %path.display(),
                        error = %e,
                        "Prompt template unreadable; using an empty prompt"
                    );
                    String::new()
                }
            };
            library.templates.insert(*kind, template);
        }

        library
    }

    pub fn template(&self, kind: PromptKind) -> &str {
        self.templates.get(&kind).map(String::as_str).unwrap_or("")
    }

    pub fn format(
        &self,
        kind: PromptKind,
        profile: &ParticipantProfile,
        context: &RoundContext,
    ) -> String {
        let template = self.template(kind);
        if template.is_empty() {
            tracing::warn!(
                parent: &self.span,
                prompt = kind.template_key(),
                participant = %profile.id,
                "Prompt missing"
            );
            return String::new();
        }

        let round = context.round.to_string();
        substitute(template, |name| match name {
            "agent_name" => Some(profile.display_name()),
            "agent_role" => Some(profile.role().unwrap_or("")),
            "project_objective" => Some(context.objective.as_str()),
            "project_memory" => Some(context.project_memory.as_str()),
            "round" => Some(round.as_str()),
            _ => None,
        })
    }
}

/// Single pass over `{name}` placeholders. Inserted values are never
/// rescanned; unknown names are kept as written.
fn substitute<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| lookup(&after[..close]).map(|value| (value, close)));
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
