//! Candidate question validation.
//!
//! Each candidate is scored on three independent dimensions — relevance,
//! difficulty fit, clarity — and passes only when every dimension clears
//! [`PASS_THRESHOLD`]. All three are always computed so feedback is complete
//! rather than short-circuited. A low score is a valid negative verdict;
//! [`ValidationError`] is reserved for candidates (or judgements) that are
//! structurally unusable, and such candidates are discarded.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::providers::retry::{RetryPolicy, with_retry};
use crate::providers::{CompletionProvider, ProviderError};
use crate::question::{
    CandidateQuestion, GenerationRequest, QuestionType, ValidationScores, ValidationVerdict,
};
use crate::retrieve::ContextBlock;

/// Minimum score every dimension must reach for a pass. A crate-level
/// constant, not a per-call parameter.
pub const PASS_THRESHOLD: f32 = 0.6;

/// Non-retryable validation failures. The candidate is logged and discarded;
/// it never counts as a failed-but-valid verdict.
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("candidate question text is empty")]
    #[diagnostic(code(papersmith::validate::empty_text))]
    EmptyText,

    #[error("objective question needs at least two options")]
    #[diagnostic(code(papersmith::validate::missing_options))]
    MissingOptions,

    #[error("question is missing a correct answer")]
    #[diagnostic(code(papersmith::validate::missing_answer))]
    MissingAnswer,

    #[error("unusable validator judgement: {reason}")]
    #[diagnostic(code(papersmith::validate::judgement))]
    Judgement { reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),
}

/// Structural pre-check for a candidate of the stated type.
pub fn check_candidate(candidate: &CandidateQuestion) -> Result<(), ValidationError> {
    if candidate.text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }
    if candidate.question_type == QuestionType::Objective && candidate.options.len() < 2 {
        return Err(ValidationError::MissingOptions);
    }
    if candidate.correct_answers.is_empty() {
        return Err(ValidationError::MissingAnswer);
    }
    Ok(())
}

/// Scores one candidate against its originating request and context.
///
/// No side effects; verdicts for distinct candidates are independent and may
/// be computed concurrently.
#[async_trait]
pub trait QuestionValidator: Send + Sync {
    async fn validate(
        &self,
        candidate: &CandidateQuestion,
        request: &GenerationRequest,
        context: &ContextBlock,
    ) -> Result<ValidationVerdict, ValidationError>;
}

/// Validates every candidate of an attempt on a bounded concurrent pool.
///
/// Results are re-ordered to match generation order, so the report stays
/// deterministic regardless of scheduling, and `question_ref` is assigned
/// from that order.
pub async fn validate_all(
    validator: &dyn QuestionValidator,
    request: &GenerationRequest,
    context: &ContextBlock,
    candidates: &[CandidateQuestion],
    concurrency: usize,
) -> Vec<Result<ValidationVerdict, ValidationError>> {
    let mut outcomes: Vec<Result<ValidationVerdict, ValidationError>> = stream::iter(candidates)
        .map(|candidate| validator.validate(candidate, request, context))
        .buffered(concurrency.max(1))
        .collect()
        .await;
    for (ordinal, outcome) in outcomes.iter_mut().enumerate() {
        if let Ok(verdict) = outcome {
            verdict.question_ref = ordinal;
        }
    }
    outcomes
}

/// Validator backed by a chat-completion provider.
pub struct LlmValidator {
    completions: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
}

impl LlmValidator {
    pub fn new(completions: Arc<dyn CompletionProvider>, retry: RetryPolicy) -> Self {
        Self { completions, retry }
    }
}

#[async_trait]
impl QuestionValidator for LlmValidator {
    async fn validate(
        &self,
        candidate: &CandidateQuestion,
        request: &GenerationRequest,
        context: &ContextBlock,
    ) -> Result<ValidationVerdict, ValidationError> {
        check_candidate(candidate)?;
        let system = system_prompt(request, context);
        let user = candidate_prompt(candidate);
        let content = with_retry(&self.retry, || self.completions.complete(&system, &user)).await?;
        let judgement = parse_judgement(&content)?;
        let scores = ValidationScores::new(
            judgement.relevance,
            judgement.difficulty_fit,
            judgement.clarity,
        );
        Ok(ValidationVerdict {
            question_ref: 0,
            passed: scores.minimum() >= PASS_THRESHOLD,
            scores,
            feedback: judgement.feedback.unwrap_or_default(),
        })
    }
}

fn system_prompt(request: &GenerationRequest, context: &ContextBlock) -> String {
    let context_text = if context.is_empty() {
        "(no syllabus context available)"
    } else {
        context.text.as_str()
    };
    format!(
        "You are validating exam questions for {class} {subject}, chapter \
         \"{chapter}\", topic \"{topic}\", target difficulty {difficulty}/5.\n\
         Score the question on three independent dimensions in [0, 1]:\n\
         - relevance: does it match topic, chapter, and subject?\n\
         - difficulty_fit: does it match the target difficulty?\n\
         - clarity: is it unambiguous and well-structured?\n\
         Score every dimension even when one is clearly failing.\n\n\
         Syllabus context:\n{context_text}\n\n\
         Answer with a JSON object only: {{\"relevance\": number, \
         \"difficulty_fit\": number, \"clarity\": number, \"feedback\": string}}.",
        class = request.class_level,
        subject = request.subject,
        chapter = request.chapter,
        topic = request.topic,
        difficulty = request.difficulty,
    )
}

fn candidate_prompt(candidate: &CandidateQuestion) -> String {
    let mut prompt = format!("Question: {}\n", candidate.text);
    if !candidate.options.is_empty() {
        prompt.push_str(&format!("Options: {}\n", candidate.options.join(" | ")));
    }
    prompt.push_str(&format!(
        "Stated answer(s): {}\nClaimed difficulty: {}/5",
        candidate.correct_answers.join(" | "),
        candidate.difficulty_estimate
    ));
    prompt
}

#[derive(Deserialize)]
struct JudgementPayload {
    relevance: f32,
    difficulty_fit: f32,
    clarity: f32,
    #[serde(default)]
    feedback: Option<String>,
}

fn parse_judgement(raw: &str) -> Result<JudgementPayload, ValidationError> {
    let trimmed = raw.trim();
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e >= s => &trimmed[s..=e],
        _ => {
            return Err(ValidationError::Judgement {
                reason: "no JSON object found in output".to_string(),
            });
        }
    };
    serde_json::from_str(slice).map_err(|err| ValidationError::Judgement {
        reason: err.to_string(),
    })
}
