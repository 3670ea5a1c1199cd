//! The generation workflow as an explicit finite-state machine.
//!
//! The retry loop is expressed as a pure transition function over
//! `(Phase, WorkflowEvent)` pairs plus a pure retry decision, so the control
//! logic is unit-testable without invoking any external service. The
//! [`crate::workflow::orchestrator::Orchestrator`] executes the effects and
//! feeds the resulting events back through [`transition`].
//!
//! ```text
//! RETRIEVE ──► GENERATE ──► VALIDATE ──► DECIDE ──► FINALIZE ──► DONE
//!                 ▲                        │            │
//!                 └──────── retry ─────────┘            └──► FAILED
//! ```

/// Workflow phases. `Done` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Retrieve,
    Generate,
    Validate,
    Decide,
    Finalize,
    Done,
    Failed,
}

/// Events produced by executing a phase's side effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowEvent {
    ContextRetrieved { chunks: usize },
    /// Retrieval failed or matched nothing; the run degrades to an empty
    /// context block instead of failing.
    ContextUnavailable,
    CandidatesGenerated { generated: usize },
    GenerationFailed,
    VerdictsCollected {
        validated: usize,
        passed: usize,
        discarded: usize,
    },
    RetryDecided,
    FinalizeDecided,
    /// Cancellation observed at the top of a generate phase.
    Cancelled,
    ResultEmitted,
    RunFailed,
}

/// Side effects requested by a transition, executed by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    RetrieveContext,
    GenerateCandidates,
    ValidateCandidates,
    EvaluateDecision,
    EmitResult,
}

/// Result of one transition: the next phase and the effect to run in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub effect: Option<Effect>,
}

impl Transition {
    fn to(next: Phase, effect: Effect) -> Self {
        Self {
            next,
            effect: Some(effect),
        }
    }

    fn terminal(next: Phase) -> Self {
        Self { next, effect: None }
    }
}

/// Pure transition function. Any `(phase, event)` pair outside the table is
/// a protocol violation and lands in `Failed`.
pub fn transition(phase: Phase, event: &WorkflowEvent) -> Transition {
    use Effect::*;
    use Phase::*;
    use WorkflowEvent as E;

    match (phase, event) {
        (Retrieve, E::ContextRetrieved { .. } | E::ContextUnavailable) => {
            Transition::to(Generate, GenerateCandidates)
        }
        (Generate, E::CandidatesGenerated { .. }) => Transition::to(Validate, ValidateCandidates),
        (Generate, E::GenerationFailed) => Transition::to(Decide, EvaluateDecision),
        (Generate, E::Cancelled) => Transition::to(Finalize, EmitResult),
        (Validate, E::VerdictsCollected { .. }) => Transition::to(Decide, EvaluateDecision),
        (Decide, E::RetryDecided) => Transition::to(Generate, GenerateCandidates),
        (Decide, E::FinalizeDecided) => Transition::to(Finalize, EmitResult),
        (Finalize, E::ResultEmitted) => Transition::terminal(Done),
        (Finalize, E::RunFailed) => Transition::terminal(Failed),
        _ => Transition::terminal(Failed),
    }
}

/// Inputs to the retry decision, snapshotted after a validate phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionInputs {
    /// Pass rate of the most recent attempt.
    pub pass_rate: f32,
    pub attempt_count: u32,
    /// Questions accumulated across all attempts so far.
    pub accumulated: usize,
    pub requested: usize,
    pub max_attempts: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Retry,
    Finalize,
}

impl Decision {
    /// Retry is a quality gate, not a quantity one: a low pass rate triggers
    /// it, a plain shortfall does not. Attempts and accumulation bound it.
    pub fn evaluate(inputs: &DecisionInputs, retry_pass_rate: f32) -> Decision {
        let retry = inputs.pass_rate < retry_pass_rate
            && inputs.attempt_count < inputs.max_attempts
            && inputs.accumulated < inputs.requested;
        if retry { Decision::Retry } else { Decision::Finalize }
    }
}
