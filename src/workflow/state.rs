//! Mutable per-run workflow state.
//!
//! One [`WorkflowState`] is owned exclusively by a single orchestrator run
//! for its whole lifetime and discarded on completion; nothing here is shared
//! across concurrent requests.

use serde::{Deserialize, Serialize};

use super::validator::ValidationError;
use crate::question::{CandidateQuestion, GenerationRequest, ValidationVerdict};
use crate::retrieve::ContextBlock;

/// Validator feedback carried into the next generation attempt.
///
/// Only the most recent validate phase contributes, keeping the generator's
/// guidance window bounded and current.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackDigest {
    pub attempt: u32,
    pub notes: Vec<String>,
}

impl FeedbackDigest {
    pub fn render(&self) -> String {
        self.notes
            .iter()
            .map(|note| format!("- {note}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A candidate that passed validation, with its provenance inside the run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredQuestion {
    pub question: CandidateQuestion,
    pub verdict: ValidationVerdict,
    /// 1-based attempt that produced this question.
    pub attempt: u32,
    /// Generation order within that attempt.
    pub ordinal: usize,
}

impl ScoredQuestion {
    pub fn average_score(&self) -> f32 {
        self.verdict.scores.mean()
    }
}

/// Per-attempt accounting, kept verbatim in the final report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub generated: usize,
    /// Candidates that received a verdict (generated minus discarded).
    pub validated: usize,
    pub passed: usize,
    /// Structurally malformed candidates dropped without a verdict; they
    /// count in neither side of the pass rate.
    pub discarded: usize,
    pub pass_rate: f32,
    /// Verdicts in generation order.
    pub verdicts: Vec<ValidationVerdict>,
}

/// Totals returned when an attempt is folded into the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptTotals {
    pub validated: usize,
    pub passed: usize,
    pub discarded: usize,
}

/// State of one generation run, exclusively owned by its orchestrator.
#[derive(Clone, Debug)]
pub struct WorkflowState {
    pub request: GenerationRequest,
    /// Retrieved once per run; retries reuse it.
    pub context: ContextBlock,
    /// Monotonically non-decreasing, bounded by the policy's `max_attempts`.
    pub attempt_count: u32,
    /// Freshly generated candidates awaiting validation.
    pub candidates: Vec<CandidateQuestion>,
    pub attempts: Vec<AttemptRecord>,
    /// Never shrinks across attempts within one run.
    pub accumulated_passed: Vec<ScoredQuestion>,
    pub last_feedback: Option<FeedbackDigest>,
}

impl WorkflowState {
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            request,
            context: ContextBlock::empty(),
            attempt_count: 0,
            candidates: Vec::new(),
            attempts: Vec::new(),
            accumulated_passed: Vec::new(),
            last_feedback: None,
        }
    }

    /// Questions still needed to fulfil the request.
    pub fn remaining(&self) -> usize {
        self.request.count.saturating_sub(self.accumulated_passed.len())
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    /// Folds validation outcomes for the pending candidates into the state:
    /// passing candidates join `accumulated_passed`, failing feedback becomes
    /// the next attempt's digest, malformed candidates are discarded.
    pub fn record_attempt(
        &mut self,
        outcomes: Vec<Result<ValidationVerdict, ValidationError>>,
    ) -> AttemptTotals {
        let candidates = std::mem::take(&mut self.candidates);
        let generated = candidates.len();
        let mut verdicts = Vec::with_capacity(generated);
        let mut passed = 0usize;
        let mut discarded = 0usize;
        let mut notes = Vec::new();

        for (ordinal, (candidate, outcome)) in candidates.into_iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(verdict) => {
                    if verdict.passed {
                        passed += 1;
                        self.accumulated_passed.push(ScoredQuestion {
                            question: candidate,
                            verdict: verdict.clone(),
                            attempt: self.attempt_count,
                            ordinal,
                        });
                    } else if !verdict.feedback.is_empty() {
                        notes.push(verdict.feedback.clone());
                    }
                    verdicts.push(verdict);
                }
                Err(err) => {
                    tracing::warn!(ordinal, error = %err, "discarding candidate without a verdict");
                    discarded += 1;
                }
            }
        }

        let validated = verdicts.len();
        let pass_rate = if validated == 0 {
            0.0
        } else {
            passed as f32 / validated as f32
        };
        self.attempts.push(AttemptRecord {
            attempt: self.attempt_count,
            generated,
            validated,
            passed,
            discarded,
            pass_rate,
            verdicts,
        });
        self.last_feedback = if notes.is_empty() {
            None
        } else {
            Some(FeedbackDigest {
                attempt: self.attempt_count,
                notes,
            })
        };

        AttemptTotals {
            validated,
            passed,
            discarded,
        }
    }

    /// Records an attempt whose generation call failed outright. The empty
    /// attempt scores a 0.0 pass rate, so the normal retry decision governs
    /// what happens next.
    pub fn record_failed_generation(&mut self) {
        self.candidates.clear();
        self.attempts.push(AttemptRecord {
            attempt: self.attempt_count,
            generated: 0,
            validated: 0,
            passed: 0,
            discarded: 0,
            pass_rate: 0.0,
            verdicts: Vec::new(),
        });
    }
}
