//! Shared fixtures and scripted fakes for integration tests.
//!
//! The scripted generator/validator pair encodes the validator's outcome in
//! the candidate text: `pass…` passes, `fail…` fails with feedback, `bad…`
//! is structurally unusable and gets discarded. A text may carry an explicit
//! score as `pass@0.95 …`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use papersmith::question::{
    CandidateQuestion, GenerationRequest, QuestionType, ValidationScores, ValidationVerdict,
};
use papersmith::retrieve::{ContextBlock, RetrievalError};
use papersmith::workflow::generator::{GenerationError, QuestionGenerator};
use papersmith::workflow::orchestrator::{CancelToken, ContextSource};
use papersmith::workflow::state::FeedbackDigest;
use papersmith::workflow::validator::{QuestionValidator, ValidationError};

pub fn request(count: usize) -> GenerationRequest {
    GenerationRequest::builder()
        .class_level("Class 10")
        .subject("Math")
        .chapter("Algebra")
        .topic("Quadratic Equations")
        .count(count)
        .difficulty(3)
        .build()
        .unwrap()
}

pub fn context_block(text: &str, chunks: usize) -> ContextBlock {
    ContextBlock {
        text: text.to_string(),
        chunk_count: chunks,
        token_count: text.split_whitespace().count(),
    }
}

pub fn candidate(text: &str) -> CandidateQuestion {
    CandidateQuestion {
        text: text.to_string(),
        question_type: QuestionType::Objective,
        options: vec!["A) 1".into(), "B) 2".into(), "C) 3".into(), "D) 4".into()],
        correct_answers: vec!["B) 2".into()],
        difficulty_estimate: 3,
    }
}

/// `passing` candidates marked `pass-i`, then `failing` marked `fail-i`.
pub fn marked_candidates(passing: usize, failing: usize) -> Vec<CandidateQuestion> {
    let mut out = Vec::new();
    for i in 0..passing {
        out.push(candidate(&format!("pass-{i}")));
    }
    for i in 0..failing {
        out.push(candidate(&format!("fail-{i}")));
    }
    out
}

/// Context source returning a fixed block.
pub struct FixedContext(pub ContextBlock);

#[async_trait]
impl ContextSource for FixedContext {
    async fn retrieve(&self, _request: &GenerationRequest) -> Result<ContextBlock, RetrievalError> {
        Ok(self.0.clone())
    }
}

/// Context source that always fails, exercising the degraded-run policy.
pub struct FailingContext;

#[async_trait]
impl ContextSource for FailingContext {
    async fn retrieve(&self, _request: &GenerationRequest) -> Result<ContextBlock, RetrievalError> {
        Err(RetrievalError::Embed(
            papersmith::providers::ProviderError::Decode("simulated outage".to_string()),
        ))
    }
}

/// Generator that replays a script of per-attempt outcomes and records what
/// the orchestrator asked for.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Vec<CandidateQuestion>, GenerationError>>>,
    pub requested: Mutex<Vec<usize>>,
    pub feedback_seen: Mutex<Vec<Option<Vec<String>>>>,
    cancel_on_call: Option<CancelToken>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<Vec<CandidateQuestion>, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requested: Mutex::new(Vec::new()),
            feedback_seen: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    /// Cancels `token` as a side effect of every generate call, so the run
    /// halts before the *next* attempt while the current one completes.
    pub fn cancelling(
        script: Vec<Result<Vec<CandidateQuestion>, GenerationError>>,
        token: CancelToken,
    ) -> Self {
        Self {
            cancel_on_call: Some(token),
            ..Self::new(script)
        }
    }

    pub fn requested_counts(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }

    pub fn feedback_notes(&self) -> Vec<Option<Vec<String>>> {
        self.feedback_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
        _context: &ContextBlock,
        feedback: Option<&FeedbackDigest>,
        count: usize,
    ) -> Result<Vec<CandidateQuestion>, GenerationError> {
        self.requested.lock().unwrap().push(count);
        self.feedback_seen
            .lock()
            .unwrap()
            .push(feedback.map(|d| d.notes.clone()));
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::Empty))
    }
}

/// Validator driven by candidate-text markers.
pub struct MarkerValidator;

#[async_trait]
impl QuestionValidator for MarkerValidator {
    async fn validate(
        &self,
        candidate: &CandidateQuestion,
        _request: &GenerationRequest,
        _context: &ContextBlock,
    ) -> Result<ValidationVerdict, ValidationError> {
        if candidate.text.starts_with("bad") {
            return Err(ValidationError::Judgement {
                reason: "unusable candidate marker".to_string(),
            });
        }
        let passed = candidate.text.starts_with("pass");
        let score = candidate
            .text
            .split('@')
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|raw| raw.parse::<f32>().ok())
            .unwrap_or(if passed { 0.85 } else { 0.4 });
        Ok(ValidationVerdict {
            question_ref: 0,
            passed,
            scores: ValidationScores::new(score, score, score),
            feedback: if passed {
                String::new()
            } else {
                format!("rework '{}': options are ambiguous", candidate.text)
            },
        })
    }
}
