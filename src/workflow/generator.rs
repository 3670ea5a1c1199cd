//! Candidate question generation.
//!
//! [`LlmGenerator`] prompts the completion provider for a JSON array of
//! questions grounded in the supplied context block. Model output is parsed
//! with local repair (markdown fence stripping, bracket slicing) before a
//! [`GenerationError`] is raised. On a retry attempt the orchestrator passes
//! the previous attempt's validator feedback, which the prompt states as a
//! hard constraint rather than a hint.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use super::state::FeedbackDigest;
use crate::providers::retry::{RetryPolicy, with_retry};
use crate::providers::{CompletionProvider, ProviderError};
use crate::question::{CandidateQuestion, GenerationRequest, QuestionType};
use crate::retrieve::ContextBlock;

/// Generation failures. These are retryable through the workflow's normal
/// retry loop, not by re-calling the generator in place.
#[derive(Debug, Error, Diagnostic)]
pub enum GenerationError {
    #[error("model returned no usable candidates")]
    #[diagnostic(code(papersmith::generate::empty))]
    Empty,

    #[error("unable to parse model output as a question array: {reason}")]
    #[diagnostic(
        code(papersmith::generate::malformed),
        help("The model must answer with a JSON array of question objects.")
    )]
    Malformed { reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),
}

/// Produces candidate questions for one attempt.
///
/// Implementations must be side-effect free beyond the returned candidates.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        context: &ContextBlock,
        feedback: Option<&FeedbackDigest>,
        count: usize,
    ) -> Result<Vec<CandidateQuestion>, GenerationError>;
}

/// Generator backed by a chat-completion provider.
pub struct LlmGenerator {
    completions: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
}

impl LlmGenerator {
    pub fn new(completions: Arc<dyn CompletionProvider>, retry: RetryPolicy) -> Self {
        Self { completions, retry }
    }
}

#[async_trait]
impl QuestionGenerator for LlmGenerator {
    #[instrument(skip_all, fields(requested = count, retry = feedback.is_some()))]
    async fn generate(
        &self,
        request: &GenerationRequest,
        context: &ContextBlock,
        feedback: Option<&FeedbackDigest>,
        count: usize,
    ) -> Result<Vec<CandidateQuestion>, GenerationError> {
        let system = system_prompt(request, context);
        let user = user_prompt(request, feedback, count);
        let content = with_retry(&self.retry, || self.completions.complete(&system, &user)).await?;
        let mut candidates = parse_candidates(&content, request)?;
        if candidates.is_empty() {
            return Err(GenerationError::Empty);
        }
        candidates.truncate(count);
        tracing::info!(generated = candidates.len(), requested = count, "candidates generated");
        Ok(candidates)
    }
}

fn system_prompt(request: &GenerationRequest, context: &ContextBlock) -> String {
    let context_text = if context.is_empty() {
        "No syllabus context is available; stay strictly within the named chapter and topic."
    } else {
        context.text.as_str()
    };
    format!(
        "You are an examiner writing assessment questions for {class} {subject}.\n\
         Questions must be answerable from, or clearly related to, the syllabus \
         context below; do not invent material beyond it.\n\n\
         Difficulty scale: 1 recall, 2 comprehension, 3 multi-step problems, \
         4 complex application, 5 synthesis of several concepts.\n\n\
         Syllabus context:\n{context_text}\n\n\
         Answer with a JSON array only. Each element: {{\"question\": string, \
         \"options\": [four strings] or null for descriptive questions, \
         \"correct_answers\": [string], \"difficulty\": integer}}.",
        class = request.class_level,
        subject = request.subject,
    )
}

fn user_prompt(request: &GenerationRequest, feedback: Option<&FeedbackDigest>, count: usize) -> String {
    let mut prompt = format!(
        "Generate {count} {qtype} question(s) on the topic \"{topic}\" from chapter \
         \"{chapter}\" at difficulty {difficulty}/5.",
        qtype = request.question_type,
        topic = request.topic,
        chapter = request.chapter,
        difficulty = request.difficulty,
    );
    if request.question_type == QuestionType::Objective {
        prompt.push_str(&format!(
            " Each question has exactly four options; {} of them are correct.",
            match request.choice_type {
                crate::question::ChoiceType::Single => "exactly one",
                crate::question::ChoiceType::Multiple => "one or more",
            }
        ));
    }
    if let Some(digest) = feedback {
        prompt.push_str(
            "\n\nA previous attempt was rejected for the reasons below. Treat each \
             point as a constraint the new questions must satisfy:\n",
        );
        prompt.push_str(&digest.render());
    }
    prompt
}

/// Parses model output into candidates, repairing common formatting wrappers
/// (markdown fences, prose around the array) before giving up.
fn parse_candidates(
    raw: &str,
    request: &GenerationRequest,
) -> Result<Vec<CandidateQuestion>, GenerationError> {
    let unfenced = strip_code_fence(raw);
    let slice = slice_json_array(unfenced).ok_or_else(|| GenerationError::Malformed {
        reason: "no JSON array found in output".to_string(),
    })?;
    let payloads: Vec<CandidatePayload> =
        serde_json::from_str(slice).map_err(|err| GenerationError::Malformed {
            reason: err.to_string(),
        })?;
    Ok(payloads
        .into_iter()
        .filter_map(|payload| payload.into_candidate(request))
        .collect())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start();
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}

fn slice_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end >= start).then(|| &raw[start..=end])
}

#[derive(Deserialize)]
struct CandidatePayload {
    question: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    correct_answers: Option<Vec<String>>,
    /// Singular form some models emit despite the schema.
    #[serde(default)]
    correct_answer: Option<serde_json::Value>,
    #[serde(default)]
    difficulty: Option<u8>,
}

impl CandidatePayload {
    fn into_candidate(self, request: &GenerationRequest) -> Option<CandidateQuestion> {
        let text = self.question.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let mut answers = self.correct_answers.unwrap_or_default();
        if answers.is_empty() {
            if let Some(value) = self.correct_answer {
                match value {
                    serde_json::Value::String(s) => answers.push(s),
                    serde_json::Value::Array(items) => {
                        answers.extend(items.into_iter().filter_map(|item| match item {
                            serde_json::Value::String(s) => Some(s),
                            other => Some(other.to_string()),
                        }));
                    }
                    serde_json::Value::Null => {}
                    other => answers.push(other.to_string()),
                }
            }
        }
        Some(CandidateQuestion {
            text,
            question_type: request.question_type,
            options: self.options.unwrap_or_default(),
            correct_answers: answers,
            difficulty_estimate: self.difficulty.unwrap_or(request.difficulty),
        })
    }
}
