//! Workflow orchestration: driving the state machine against real services.
//!
//! The orchestrator owns one [`WorkflowState`] per run, executes the effects
//! requested by [`super::machine::transition`], and feeds the resulting
//! events back into the machine until a terminal phase is reached. Context is
//! retrieved once per run; an empty or failed retrieval degrades to an empty
//! context block rather than failing the run. Retries are bounded and
//! quality-gated; exhaustion finalizes with whatever passed, surfaced as a
//! reported shortfall rather than an error — the run fails outright only when
//! there was no context *and* nothing passed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use super::generator::QuestionGenerator;
use super::machine::{Decision, DecisionInputs, Effect, Phase, WorkflowEvent, transition};
use super::report::ValidationReport;
use super::state::{ScoredQuestion, WorkflowState};
use super::validator::{QuestionValidator, validate_all};
use crate::config::WorkflowPolicy;
use crate::question::GenerationRequest;
use crate::retrieve::{ContextBlock, ContextRetriever, RetrievalError};

/// Cooperative cancellation handle for a generation run.
///
/// Cancellation is observed at the top of each generate phase: an in-flight
/// attempt always completes (and its passing questions are kept) before the
/// run halts and finalizes.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Final product of a run: the selected questions plus the full report.
#[derive(Clone, Debug)]
pub struct GenerationOutcome {
    /// At most `request.count` questions, best-scoring first.
    pub questions: Vec<ScoredQuestion>,
    pub report: ValidationReport,
}

/// Terminal run failures.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    /// No syllabus context was available and no candidate ever passed.
    #[error(
        "generation exhausted after {attempts} attempt(s): no syllabus context and no passing questions{}",
        .last_feedback.as_deref().map(|f| format!("; last feedback: {f}")).unwrap_or_default()
    )]
    #[diagnostic(
        code(papersmith::workflow::exhausted),
        help("Ingest syllabus material for this class/subject/chapter, or widen the request.")
    )]
    Exhausted {
        attempts: u32,
        last_feedback: Option<String>,
    },
}

/// Source of the per-run context block.
///
/// [`ContextRetriever`] is the production implementation; tests substitute
/// fixed blocks.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn retrieve(&self, request: &GenerationRequest) -> Result<ContextBlock, RetrievalError>;
}

#[async_trait]
impl ContextSource for ContextRetriever {
    async fn retrieve(&self, request: &GenerationRequest) -> Result<ContextBlock, RetrievalError> {
        ContextRetriever::retrieve(self, request).await
    }
}

/// Drives one generation request through the workflow state machine.
pub struct Orchestrator {
    context: Arc<dyn ContextSource>,
    generator: Arc<dyn QuestionGenerator>,
    validator: Arc<dyn QuestionValidator>,
    policy: WorkflowPolicy,
}

impl Orchestrator {
    pub fn new(
        context: Arc<dyn ContextSource>,
        generator: Arc<dyn QuestionGenerator>,
        validator: Arc<dyn QuestionValidator>,
        policy: WorkflowPolicy,
    ) -> Self {
        Self {
            context,
            generator,
            validator,
            policy,
        }
    }

    /// Runs a request to completion without external cancellation.
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationOutcome, WorkflowError> {
        self.run_cancellable(request, CancelToken::new()).await
    }

    /// Runs a request, honouring `cancel` between attempts.
    #[instrument(skip_all, fields(run_id, requested = request.count))]
    pub async fn run_cancellable(
        &self,
        request: GenerationRequest,
        cancel: CancelToken,
    ) -> Result<GenerationOutcome, WorkflowError> {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let mut state = WorkflowState::new(request);
        let mut run = RunSlots::default();
        let mut phase = Phase::Retrieve;
        let mut pending = Some(Effect::RetrieveContext);

        while let Some(effect) = pending.take() {
            let event = self.perform(effect, &run_id, &mut state, &cancel, &mut run).await;
            let next = transition(phase, &event);
            tracing::debug!(?phase, ?event, next = ?next.next, "workflow transition");
            phase = next.next;
            pending = next.effect;
        }

        match (phase, run.outcome) {
            (Phase::Done, Some(outcome)) => Ok(outcome),
            _ => Err(run.failure.unwrap_or_else(|| WorkflowError::Exhausted {
                attempts: state.attempt_count,
                last_feedback: state.last_feedback.as_ref().map(|d| d.render()),
            })),
        }
    }

    async fn perform(
        &self,
        effect: Effect,
        run_id: &str,
        state: &mut WorkflowState,
        cancel: &CancelToken,
        run: &mut RunSlots,
    ) -> WorkflowEvent {
        match effect {
            Effect::RetrieveContext => match self.context.retrieve(&state.request).await {
                Ok(context) if !context.is_empty() => {
                    let chunks = context.chunk_count;
                    state.context = context;
                    WorkflowEvent::ContextRetrieved { chunks }
                }
                Ok(_) => {
                    tracing::warn!("no matching syllabus chunks; proceeding with empty context");
                    WorkflowEvent::ContextUnavailable
                }
                Err(err) => {
                    // Degraded generation beats blocking on missing material.
                    tracing::warn!(error = %err, "context retrieval failed; proceeding with empty context");
                    WorkflowEvent::ContextUnavailable
                }
            },

            Effect::GenerateCandidates => {
                if cancel.is_cancelled() {
                    tracing::info!(attempts = state.attempt_count, "run cancelled before next attempt");
                    return WorkflowEvent::Cancelled;
                }
                let remaining = state.remaining();
                state.attempt_count += 1;
                tracing::info!(attempt = state.attempt_count, remaining, "generating candidates");
                match self
                    .generator
                    .generate(
                        &state.request,
                        &state.context,
                        state.last_feedback.as_ref(),
                        remaining,
                    )
                    .await
                {
                    Ok(candidates) => {
                        let generated = candidates.len();
                        state.candidates = candidates;
                        WorkflowEvent::CandidatesGenerated { generated }
                    }
                    Err(err) => {
                        tracing::warn!(attempt = state.attempt_count, error = %err, "generation attempt failed");
                        state.record_failed_generation();
                        WorkflowEvent::GenerationFailed
                    }
                }
            }

            Effect::ValidateCandidates => {
                let outcomes = validate_all(
                    self.validator.as_ref(),
                    &state.request,
                    &state.context,
                    &state.candidates,
                    self.policy.validation_concurrency,
                )
                .await;
                let totals = state.record_attempt(outcomes);
                tracing::info!(
                    attempt = state.attempt_count,
                    validated = totals.validated,
                    passed = totals.passed,
                    discarded = totals.discarded,
                    "attempt validated"
                );
                WorkflowEvent::VerdictsCollected {
                    validated: totals.validated,
                    passed: totals.passed,
                    discarded: totals.discarded,
                }
            }

            Effect::EvaluateDecision => {
                let pass_rate = state.last_attempt().map(|a| a.pass_rate).unwrap_or(0.0);
                let inputs = DecisionInputs {
                    pass_rate,
                    attempt_count: state.attempt_count,
                    accumulated: state.accumulated_passed.len(),
                    requested: state.request.count,
                    max_attempts: self.policy.max_attempts,
                };
                match Decision::evaluate(&inputs, self.policy.retry_pass_rate) {
                    Decision::Retry => {
                        tracing::info!(pass_rate, "pass rate below threshold, retrying");
                        WorkflowEvent::RetryDecided
                    }
                    Decision::Finalize => WorkflowEvent::FinalizeDecided,
                }
            }

            Effect::EmitResult => {
                if state.context.is_empty() && state.accumulated_passed.is_empty() {
                    run.failure = Some(WorkflowError::Exhausted {
                        attempts: state.attempt_count,
                        last_feedback: state.last_feedback.as_ref().map(|d| d.render()),
                    });
                    return WorkflowEvent::RunFailed;
                }
                let questions = finalize_selection(state);
                let report = ValidationReport::from_state(
                    run_id,
                    state,
                    questions.len(),
                    cancel.is_cancelled(),
                );
                tracing::info!(
                    delivered = report.delivered,
                    shortfall = report.shortfall,
                    attempts = report.attempts.len(),
                    "run finalized"
                );
                run.outcome = Some(GenerationOutcome { questions, report });
                WorkflowEvent::ResultEmitted
            }
        }
    }
}

#[derive(Default)]
struct RunSlots {
    outcome: Option<GenerationOutcome>,
    failure: Option<WorkflowError>,
}

/// Truncates the accumulated passed set to the requested count, preferring
/// the highest average score, then the earliest attempt, then generation
/// order. The sort is stable so ties cannot reorder.
fn finalize_selection(state: &WorkflowState) -> Vec<ScoredQuestion> {
    let mut ranked = state.accumulated_passed.clone();
    ranked.sort_by(|a, b| {
        b.average_score()
            .total_cmp(&a.average_score())
            .then_with(|| a.attempt.cmp(&b.attempt))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    ranked.truncate(state.request.count);
    ranked
}
