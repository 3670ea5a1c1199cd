//! The question-generation workflow.
//!
//! ```text
//! RETRIEVE ──► GENERATE ──► VALIDATE ──► DECIDE ──► FINALIZE ──► DONE
//!                 ▲                        │            │
//!                 └──── low pass rate ─────┘            └──► FAILED
//! ```
//!
//! [`machine`] holds the pure transition function and retry decision;
//! [`orchestrator`] executes effects against the retriever, [`generator`],
//! and [`validator`]; [`state`] is the run-exclusive mutable state and
//! [`report`] the caller-facing summary.

pub mod generator;
pub mod machine;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod validator;

pub use generator::{GenerationError, LlmGenerator, QuestionGenerator};
pub use machine::{Decision, DecisionInputs, Effect, Phase, Transition, WorkflowEvent, transition};
pub use orchestrator::{CancelToken, ContextSource, GenerationOutcome, Orchestrator, WorkflowError};
pub use report::ValidationReport;
pub use state::{AttemptRecord, FeedbackDigest, ScoredQuestion, WorkflowState};
pub use validator::{
    LlmValidator, PASS_THRESHOLD, QuestionValidator, ValidationError, validate_all,
};
