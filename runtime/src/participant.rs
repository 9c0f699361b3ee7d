//! Participants and the generation capability they are built with.
//!
//! There is a single `Participant` type. What differs between participants is
//! their profile and the `Generator` injected at construction.

use std::sync::Arc;

use knowledge::TokenCounter;
use thiserror::Error;
use tracing::Span;
use workflow::{PromptKind, RoundContext, Turn};

use crate::config::{ParticipantProfile, Roster};
use crate::prompts::PromptLibrary;

/// Everything a generator may look at when producing a turn.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub profile: &'a ParticipantProfile,
    pub kind: PromptKind,
    pub prompt: &'a str,
    pub context: &'a RoundContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub cost_usd: f64,
    pub tokens: u64,
}

#[derive(Debug, Error)]
#[error("{participant} failed to produce a {kind} turn: {message}")]
pub struct GenerationError {
    pub participant: String,
    pub kind: PromptKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(request: &GenerationRequest<'_>, message: impl Into<String>) -> Self {
        Self {
            participant: request.profile.id.clone(),
            kind: request.kind,
            message: message.into(),
        }
    }
}

/// Produces the content of one turn. Called synchronously; never retried.
pub trait Generator {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError>;
}

impl<F> Generator for F
where
    F: FnMut(&GenerationRequest<'_>) -> Result<Generation, GenerationError>,
{
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        self(request)
    }
}

/// Offline generator returning a structured placeholder.
pub struct StubGenerator {
    counter: Arc<TokenCounter>,
}

impl StubGenerator {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self { counter }
    }
}

impl Generator for StubGenerator {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        let profile = request.profile;
        let summary = match request.context.summary() {
            "" => "(no summary yet)",
            summary => summary,
        };
        let content = [
            format!(
                "[{} | {}]",
                profile.display_name(),
                profile.role().unwrap_or("team member")
            ),
            "Prompt summary:".to_string(),
            request.prompt.trim().to_string(),
            format!("Latest summary: {}", summary),
        ]
        .join("\n");

        let tokens = self.counter.count(request.prompt) + self.counter.count(&content);
        let cost_usd = tokens as f64 / 1000.0 * profile.cost_per_1k_tokens;

        Ok(Generation {
            content,
            cost_usd,
            tokens,
        })
    }
}

pub struct Participant {
    profile: ParticipantProfile,
    prompts: Arc<PromptLibrary>,
    generator: Box<dyn Generator>,
    span: Span,
}

impl Participant {
    pub fn new(
        profile: ParticipantProfile,
        prompts: Arc<PromptLibrary>,
        generator: Box<dyn Generator>,
    ) -> Self {
        Self {
            profile,
            prompts,
            generator,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    /// Produces exactly one turn attributed to this participant.
    pub fn take_turn(
        &mut self,
        kind: PromptKind,
        context: &RoundContext,
    ) -> Result<Turn, GenerationError> {
        let prompt = self.prompts.format(kind, &self.profile, context);
        let request = GenerationRequest {
            profile: &self.profile,
            kind,
            prompt: &prompt,
            context,
        };
        let generation = self.generator.generate(&request)?;

        tracing::debug!(
            parent: &self.span,
            participant = %self.profile.id,
            kind = %kind,
            tokens = generation.tokens,
            "Turn generated"
        );
        Ok(Turn::new(
            self.profile.id.clone(),
            generation.content,
            generation.cost_usd,
            generation.tokens,
        ))
    }

    pub fn kickoff_round(&mut self, context: &RoundContext) -> Result<Turn, GenerationError> {
        self.take_turn(PromptKind::Kickoff, context)
    }

    pub fn perform_task(&mut self, context: &RoundContext) -> Result<Turn, GenerationError> {
        self.take_turn(PromptKind::Task, context)
    }

    pub fn self_evaluate(&mut self, context: &RoundContext) -> Result<Turn, GenerationError> {
        self.take_turn(PromptKind::SelfEval, context)
    }

    pub fn review_round(&mut self, context: &RoundContext) -> Result<Turn, GenerationError> {
        self.take_turn(PromptKind::Review, context)
    }
}

/// Builds one participant per roster entry, asking `generator_for` for each
/// participant's generation capability.
pub fn build_participants<F>(
    roster: &Roster,
    prompts: Arc<PromptLibrary>,
    mut generator_for: F,
) -> Vec<Participant>
where
    F: FnMut(&ParticipantProfile) -> Box<dyn Generator>,
{
    roster
        .agents
        .iter()
        .map(|profile| {
            let span = tracing::debug_span!("participant", id = %profile.id);
            Participant::new(profile.clone(), Arc::clone(&prompts), generator_for(profile))
                .with_span(span)
        })
        .collect()
}
