//! Drives rounds through kickoff, task cycles, review and finalize.
//!
//! Every turn goes through the same pipeline: register with the round's
//! budget, append to the turn store, then check the budget. A fatal
//! violation stops the run before the next turn is requested, so the
//! offending turn is always on disk.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use knowledge::{
    BudgetLimits, BudgetStatus, BudgetTracker, BudgetViolation, RewardLedger, StoreError,
    SummaryArchive, TurnStore,
};
use serde::Serialize;
use tracing::Span;
use workflow::{Phase, PromptKind, RoundContext, Turn};

use crate::config::RunConfig;
use crate::error::RunError;
use crate::participant::Participant;

/// What the coordinator does after checking the budget.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetVerdict {
    Continue,
    Advisory(BudgetViolation),
    Fatal(BudgetViolation),
}

impl BudgetVerdict {
    pub fn from_check(violation: Option<BudgetViolation>, auto_pause: bool) -> Self {
        match violation {
            None => BudgetVerdict::Continue,
            Some(violation) if auto_pause => BudgetVerdict::Fatal(violation),
            Some(violation) => BudgetVerdict::Advisory(violation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnTrace {
    pub phase: Phase,
    pub participant_id: String,
    pub tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub round: u32,
    pub turns: Vec<TurnTrace>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub advisories: Vec<BudgetViolation>,
}

impl RoundReport {
    fn new(round: u32) -> Self {
        Self {
            round,
            turns: Vec::new(),
            total_tokens: 0,
            total_cost: 0.0,
            advisories: Vec::new(),
        }
    }

    pub fn turns_in(&self, phase: Phase) -> impl Iterator<Item = &TurnTrace> {
        self.turns.iter().filter(move |t| t.phase == phase)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub rounds: Vec<RoundReport>,
}

impl RunReport {
    pub fn turn_count(&self) -> usize {
        self.rounds.iter().map(|r| r.turns.len()).sum()
    }
}

/// Per-round state, created at round start and dropped at round end.
struct RoundState {
    context: RoundContext,
    budget: BudgetTracker,
    report: RoundReport,
    near_limit_logged: bool,
}

pub struct RoundCoordinator {
    participants: HashMap<String, Participant>,
    order: Vec<String>,
    talk_back_cycles: u32,
    objective: String,
    project_memory_file: PathBuf,
    limits: BudgetLimits,
    auto_pause: bool,
    turn_store: TurnStore,
    ledger: RewardLedger,
    archive: SummaryArchive,
    span: Span,
}

impl RoundCoordinator {
    /// Validates the configuration against the supplied participants and
    /// opens the persistent stores.
    pub fn new(config: &RunConfig, participants: Vec<Participant>) -> Result<Self, RunError> {
        config.validate()?;
        let order = config.roster.order();

        let span = tracing::info_span!("coordinator");
        let participants: HashMap<String, Participant> = participants
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();

        if let Some(missing) = order.iter().find(|id| !participants.contains_key(*id)) {
            return Err(RunError::UnknownParticipant(missing.clone()));
        }
        for id in participants.keys().filter(|id| !order.contains(*id)) {
            tracing::warn!(parent: &span, participant = %id, "Participant is not in the turn order");
        }

        let paths = config.paths();
        let turn_store = TurnStore::new(paths.log_dir)
            .with_span(tracing::debug_span!(parent: &span, "turn_store"));
        let archive = SummaryArchive::new(paths.output_file)
            .with_span(tracing::debug_span!(parent: &span, "archive"));
        let ledger = RewardLedger::open(
            paths.ledger_file,
            config
                .settings
                .scoring
                .policy(config.settings.focus_keyword.as_deref()),
            tracing::debug_span!(parent: &span, "ledger"),
        )?;

        Ok(Self {
            participants,
            order,
            talk_back_cycles: config.settings.talk_back_cycles,
            objective: config.settings.round_objective.clone(),
            project_memory_file: paths.project_memory_file,
            limits: config.limits.budget.clone(),
            auto_pause: config.limits.auto_pause,
            turn_store,
            ledger,
            archive,
            span,
        })
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// `order[0]`; the order is non-empty once `new` succeeds.
    pub fn lead(&self) -> &str {
        &self.order[0]
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn turn_store(&self) -> &TurnStore {
        &self.turn_store
    }

    pub fn archive(&self) -> &SummaryArchive {
        &self.archive
    }

    /// Runs rounds `1..=total_rounds`. The first error stops the run; rounds
    /// already finished stay persisted.
    pub fn run(&mut self, total_rounds: u32) -> Result<RunReport, RunError> {
        let mut report = RunReport::default();
        for round in 1..=total_rounds {
            tracing::info!(parent: &self.span, round, "Starting round");
            let round_report = self.run_round(round)?;
            tracing::info!(
                parent: &self.span,
                round,
                turns = round_report.turns.len(),
                tokens = round_report.total_tokens,
                "Completed round"
            );
            report.rounds.push(round_report);
        }
        Ok(report)
    }

    pub fn run_round(&mut self, round: u32) -> Result<RoundReport, RunError> {
        let mut state = RoundState {
            context: self.initial_context(round)?,
            budget: BudgetTracker::new(self.limits.clone()),
            report: RoundReport::new(round),
            near_limit_logged: false,
        };

        for phase in Phase::all() {
            tracing::debug!(parent: &self.span, round, phase = %phase, "Entering phase");
            match phase {
                Phase::Kickoff => self.kickoff(&mut state)?,
                Phase::Task => self.task_phase(&mut state)?,
                Phase::Review => self.review(&mut state)?,
                Phase::Finalize => self.archive.append_round(&state.context)?,
            }
        }

        let mut report = state.report;
        report.total_tokens = state.budget.total_tokens();
        report.total_cost = state.budget.total_cost();
        Ok(report)
    }

    /// The lead's kickoff turn becomes the summary verbatim.
    fn kickoff(&mut self, state: &mut RoundState) -> Result<(), RunError> {
        let lead = self.lead().to_string();
        let turn = self.produce(&lead, Phase::Kickoff, PromptKind::Kickoff, state)?;
        state.context.replace_summary(turn.content());
        Ok(())
    }

    fn task_phase(&mut self, state: &mut RoundState) -> Result<(), RunError> {
        let task_order = self.task_order();
        for cycle in 1..=self.talk_back_cycles {
            tracing::debug!(parent: &self.span, cycle, "Talk-back cycle");
            for id in &task_order {
                let turn = self.produce(id, Phase::Task, PromptKind::Task, state)?;
                state.context.append_turn(&turn);
                self.ledger.record(id, turn.content())?;
            }
        }
        Ok(())
    }

    fn review(&mut self, state: &mut RoundState) -> Result<(), RunError> {
        let lead = self.lead().to_string();
        let turn = self.produce(&lead, Phase::Review, PromptKind::Review, state)?;
        state.context.append_turn(&turn);
        Ok(())
    }

    /// Single-participant rosters skip the task phase entirely.
    fn task_order(&self) -> Vec<String> {
        if self.order.len() <= 1 {
            return Vec::new();
        }
        self.order.clone()
    }

    fn produce(
        &mut self,
        participant_id: &str,
        phase: Phase,
        kind: PromptKind,
        state: &mut RoundState,
    ) -> Result<Turn, RunError> {
        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| RunError::UnknownParticipant(participant_id.to_string()))?;
        let turn = participant.take_turn(kind, &state.context)?;

        state.budget.register(&turn);
        self.turn_store.append(&turn, phase, &state.context)?;
        state.report.turns.push(TurnTrace {
            phase,
            participant_id: participant_id.to_string(),
            tokens: turn.tokens(),
        });

        let round = state.context.round;
        match BudgetVerdict::from_check(state.budget.check(), self.auto_pause) {
            BudgetVerdict::Continue => {
                if let BudgetStatus::Critical { usage } = state.budget.status() {
                    if !state.near_limit_logged {
                        state.near_limit_logged = true;
                        tracing::warn!(
                            parent: &self.span,
                            round,
                            usage_pct = (usage * 100.0).round() as u64,
                            "Round budget nearly exhausted"
                        );
                    }
                }
            }
            BudgetVerdict::Advisory(violation) => {
                tracing::error!(
                    parent: &self.span,
                    round,
                    participant = participant_id,
                    "{} -- auto pause disabled, continuing",
                    violation
                );
                state.report.advisories.push(violation);
            }
            BudgetVerdict::Fatal(violation) => {
                tracing::error!(
                    parent: &self.span,
                    round,
                    participant = participant_id,
                    "{} -- initiating auto pause",
                    violation
                );
                return Err(RunError::BudgetExceeded {
                    round,
                    participant: participant_id.to_string(),
                    violation,
                });
            }
        }

        Ok(turn)
    }

    fn initial_context(&self, round: u32) -> Result<RoundContext, RunError> {
        let project_memory = match fs::read_to_string(&self.project_memory_file) {
            Ok(memory) => memory,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(StoreError::read(&self.project_memory_file, e).into()),
        };
        Ok(RoundContext::new(round, self.objective.clone()).with_project_memory(project_memory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::config::{Limits, ParticipantProfile, Roster};
    use crate::participant::{
        build_participants, Generation, GenerationError, GenerationRequest, Generator,
    };
    use crate::prompts::PromptLibrary;

    #[derive(Debug, Clone)]
    struct Call {
        participant: String,
        kind: PromptKind,
        round: u32,
        summary: String,
        project_memory: String,
    }

    type CallLog = Rc<RefCell<Vec<Call>>>;

    struct Scripted {
        log: CallLog,
        tokens: u64,
        fail_on: Option<PromptKind>,
    }

    impl Generator for Scripted {
        fn generate(
            &mut self,
            request: &GenerationRequest<'_>,
        ) -> Result<Generation, GenerationError> {
            let id = request.profile.id.clone();
            self.log.borrow_mut().push(Call {
                participant: id.clone(),
                kind: request.kind,
                round: request.context.round,
                summary: request.context.summary().to_string(),
                project_memory: request.context.project_memory.clone(),
            });
            if self.fail_on == Some(request.kind) {
                return Err(GenerationError::new(request, "scripted failure"));
            }
            Ok(Generation {
                content: format!("{} {} r{}", id, request.kind, request.context.round),
                cost_usd: 0.0,
                tokens: self.tokens,
            })
        }
    }

    fn config(dir: &TempDir, ids: &[&str], cycles: u32) -> RunConfig {
        let roster = Roster::new(ids.iter().map(|id| ParticipantProfile::new(*id)).collect());
        let mut config = RunConfig::new(dir.path(), roster);
        config.settings.talk_back_cycles = cycles;
        config
    }

    fn scripted(config: &RunConfig, log: &CallLog, tokens: u64) -> Vec<Participant> {
        build_participants(&config.roster, Arc::new(PromptLibrary::new()), |_| {
            Box::new(Scripted {
                log: Rc::clone(log),
                tokens,
                fail_on: None,
            }) as Box<dyn Generator>
        })
    }

    fn sequence(log: &CallLog) -> Vec<String> {
        log.borrow()
            .iter()
            .map(|c| format!("{}:{}", c.kind, c.participant))
            .collect()
    }

    #[test]
    fn test_budget_verdict() {
        let violation = BudgetViolation::Tokens { used: 2, limit: 1 };
        assert_eq!(BudgetVerdict::from_check(None, true), BudgetVerdict::Continue);
        assert_eq!(
            BudgetVerdict::from_check(Some(violation.clone()), true),
            BudgetVerdict::Fatal(violation.clone())
        );
        assert_eq!(
            BudgetVerdict::from_check(Some(violation.clone()), false),
            BudgetVerdict::Advisory(violation)
        );
    }

    #[test]
    fn test_single_round_turn_sequence_and_summary() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["lead", "helper"], 1);
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();

        let report = coordinator.run(1).unwrap();

        assert_eq!(
            sequence(&log),
            vec!["kickoff:lead", "task:lead", "task:helper", "review:lead"]
        );
        assert_eq!(report.turn_count(), 4);

        let calls = log.borrow();
        assert_eq!(calls[0].summary, "");
        assert_eq!(calls[1].summary, "lead kickoff r1");
        assert_eq!(calls[2].summary, "lead kickoff r1\nlead: lead task r1");

        let archived = fs::read_to_string(coordinator.archive().path()).unwrap();
        assert_eq!(
            archived,
            "\n## Round 1 Summary\n\n\
             lead kickoff r1\nlead: lead task r1\nhelper: helper task r1\nlead: lead review r1\n"
        );
    }

    #[test]
    fn test_every_turn_is_persisted_verbatim() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["lead", "helper"], 2);
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();

        let report = coordinator.run(1).unwrap();

        let lead = coordinator.turn_store().records("lead").unwrap();
        let helper = coordinator.turn_store().records("helper").unwrap();
        assert_eq!(lead.len() + helper.len(), report.turn_count());

        let phases: Vec<Phase> = lead.iter().map(|r| r.phase).collect();
        assert_eq!(phases, vec![Phase::Kickoff, Phase::Task, Phase::Task, Phase::Review]);
        assert_eq!(lead[0].content, "lead kickoff r1");
        assert_eq!(lead[0].summary_snapshot, "");
        assert_eq!(helper[0].content, "helper task r1");
        assert_eq!(helper[0].summary_snapshot, "lead kickoff r1\nlead: lead task r1");
    }

    #[test]
    fn test_task_phase_produces_cycles_times_participants() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["a", "b", "c"], 2);
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();

        let report = coordinator.run(2).unwrap();

        assert_eq!(report.rounds.len(), 2);
        for (index, round) in report.rounds.iter().enumerate() {
            assert_eq!(round.round, index as u32 + 1);
            assert_eq!(round.turns_in(Phase::Task).count(), 6);

            let kickoffs: Vec<_> = round.turns_in(Phase::Kickoff).collect();
            let reviews: Vec<_> = round.turns_in(Phase::Review).collect();
            assert_eq!(kickoffs.len(), 1);
            assert_eq!(reviews.len(), 1);
            assert_eq!(kickoffs[0].participant_id, "a");
            assert_eq!(reviews[0].participant_id, "a");
        }
        assert_eq!(report.turn_count(), 16);
        assert!(log.borrow().iter().skip(8).all(|c| c.round == 2));
    }

    #[test]
    fn test_single_participant_skips_task_phase() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["solo"], 5);
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();

        let report = coordinator.run(2).unwrap();

        assert_eq!(
            sequence(&log),
            vec!["kickoff:solo", "review:solo", "kickoff:solo", "review:solo"]
        );
        assert!(report.rounds.iter().all(|r| r.turns_in(Phase::Task).count() == 0));
        assert!(coordinator.ledger().snapshot().is_empty());
    }

    #[test]
    fn test_declared_order_sets_lead() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["a", "b", "c"], 1);
        config.roster = config
            .roster
            .clone()
            .with_order(vec!["c".to_string(), "a".to_string()]);
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();

        coordinator.run(1).unwrap();

        assert_eq!(coordinator.lead(), "c");
        assert_eq!(
            sequence(&log),
            vec!["kickoff:c", "task:c", "task:a", "review:c"]
        );
    }

    #[test]
    fn test_fatal_budget_violation_halts_after_kickoff() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["lead", "helper"], 2);
        config.limits = Limits {
            budget: BudgetLimits::unbounded().with_max_tokens(10),
            auto_pause: true,
        };
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 15)).unwrap();

        match coordinator.run(3) {
            Err(RunError::BudgetExceeded {
                round,
                participant,
                violation,
            }) => {
                assert_eq!(round, 1);
                assert_eq!(participant, "lead");
                assert_eq!(violation, BudgetViolation::Tokens { used: 15, limit: 10 });
            }
            other => panic!("Expected BudgetExceeded, got {:?}", other),
        }

        assert_eq!(sequence(&log), vec!["kickoff:lead"]);
        let lead = coordinator.turn_store().records("lead").unwrap();
        assert_eq!(lead.len(), 1);
        assert_eq!(lead[0].phase, Phase::Kickoff);
        assert!(coordinator.turn_store().records("helper").unwrap().is_empty());
        assert!(!coordinator.archive().path().exists());
        assert!(coordinator.ledger().snapshot().is_empty());
    }

    #[test]
    fn test_advisory_budget_violation_continues() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["lead", "helper"], 1);
        config.limits = Limits {
            budget: BudgetLimits::unbounded().with_max_tokens(10),
            auto_pause: false,
        };
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 15)).unwrap();

        let report = coordinator.run(1).unwrap();

        assert_eq!(report.turn_count(), 4);
        assert_eq!(report.rounds[0].advisories.len(), 4);
        assert_eq!(report.rounds[0].total_tokens, 60);
        assert!(coordinator.archive().path().exists());
    }

    #[test]
    fn test_budget_resets_each_round() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["lead", "helper"], 1);
        config.limits = Limits {
            budget: BudgetLimits::unbounded().with_max_tokens(10),
            auto_pause: true,
        };
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 2)).unwrap();

        let report = coordinator.run(3).unwrap();

        assert_eq!(report.rounds.len(), 3);
        assert!(report.rounds.iter().all(|r| r.total_tokens == 8));
    }

    #[test]
    fn test_task_turns_are_scored() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["lead", "helper"], 2);
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();

        coordinator.run(1).unwrap();

        let scores = coordinator.ledger().snapshot();
        assert_eq!(scores["lead"].contributions, 2);
        assert_eq!(scores["lead"].score, 2);
        assert_eq!(scores["helper"].contributions, 2);

        let reloaded = RewardLedger::load(coordinator.ledger().path()).unwrap();
        assert_eq!(reloaded.snapshot(), scores);
    }

    #[test]
    fn test_rubric_scoring_uses_configured_focus_keyword() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["lead", "helper"], 1);
        config.settings.scoring = knowledge::ScoringKind::Rubric;
        config.settings.focus_keyword = Some("helper".to_string());
        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();

        coordinator.run(1).unwrap();

        assert_eq!(coordinator.ledger().score("helper"), Some(2));
        assert_eq!(coordinator.ledger().score("lead"), Some(1));
        assert_eq!(coordinator.ledger().snapshot()["helper"].dimensions["insight"], 5);
    }

    #[test]
    fn test_corrupt_ledger_does_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["lead", "helper"], 1);
        let ledger_file = config.paths().ledger_file;
        fs::create_dir_all(ledger_file.parent().unwrap()).unwrap();
        fs::write(&ledger_file, "{\"lead\": {\"score\": ").unwrap();

        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();
        assert!(coordinator.ledger().snapshot().is_empty());

        coordinator.run(1).unwrap();
        assert_eq!(coordinator.ledger().score("helper"), Some(1));
    }

    #[test]
    fn test_generation_failure_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["lead", "helper"], 1);
        let log = CallLog::default();
        let participants = build_participants(&config.roster, Arc::new(PromptLibrary::new()), |p| {
            let fail_on = (p.id == "helper").then_some(PromptKind::Task);
            Box::new(Scripted {
                log: Rc::clone(&log),
                tokens: 1,
                fail_on,
            }) as Box<dyn Generator>
        });
        let mut coordinator = RoundCoordinator::new(&config, participants).unwrap();

        assert!(matches!(coordinator.run(2), Err(RunError::Generation(_))));
        assert_eq!(coordinator.turn_store().records("lead").unwrap().len(), 2);
        assert!(coordinator.turn_store().records("helper").unwrap().is_empty());
        assert!(!coordinator.archive().path().exists());
    }

    #[test]
    fn test_round_context_carries_objective_and_memory() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["lead", "helper"], 0);
        config.settings.round_objective = "Ship the beta".to_string();
        let memory = config.paths().project_memory_file;
        fs::create_dir_all(memory.parent().unwrap()).unwrap();
        fs::write(&memory, "Remember the API freeze").unwrap();

        let log = CallLog::default();
        let mut coordinator = RoundCoordinator::new(&config, scripted(&config, &log, 1)).unwrap();
        coordinator.run(1).unwrap();

        assert_eq!(sequence(&log), vec!["kickoff:lead", "review:lead"]);
        assert!(log
            .borrow()
            .iter()
            .all(|c| c.project_memory == "Remember the API freeze"));
    }

    #[test]
    fn test_missing_participant_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["lead", "helper"], 1);
        let log = CallLog::default();
        let mut participants = scripted(&config, &log, 1);
        participants.retain(|p| p.id() == "lead");

        assert!(matches!(
            RoundCoordinator::new(&config, participants),
            Err(RunError::UnknownParticipant(id)) if id == "helper"
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_any_round() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig::new(dir.path(), Roster::default());

        assert!(matches!(
            RoundCoordinator::new(&config, Vec::new()),
            Err(RunError::Config(_))
        ));
    }
}
