//! Question domain primitives shared by the generation workflow.
//!
//! [`GenerationRequest`] is the immutable per-request input, built through a
//! validating builder so range constraints hold by construction.
//! [`CandidateQuestion`] is produced by the generator and annotated by the
//! validator through a [`ValidationVerdict`].
//!
//! # Examples
//!
//! ```
//! use papersmith::question::{GenerationRequest, QuestionType};
//!
//! let request = GenerationRequest::builder()
//!     .class_level("Class 10")
//!     .subject("Math")
//!     .chapter("Algebra")
//!     .topic("Quadratic Equations")
//!     .count(5)
//!     .difficulty(3)
//!     .question_type(QuestionType::Objective)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.count, 5);
//! ```

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The kind of question a request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Multiple-choice questions with a fixed option list.
    #[default]
    Objective,
    /// Free-form questions answered with a model answer.
    Descriptive,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Objective => write!(f, "objective"),
            Self::Descriptive => write!(f, "descriptive"),
        }
    }
}

/// How many options of an objective question may be correct.
///
/// Only meaningful when the request's [`QuestionType`] is `Objective`;
/// ignored for descriptive requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceType {
    #[default]
    Single,
    Multiple,
}

/// Immutable parameters for one generation run.
///
/// Created once per user action via [`GenerationRequest::builder`] and never
/// mutated afterwards; the workflow reads it, nothing writes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub class_level: String,
    pub subject: String,
    pub chapter: String,
    pub topic: String,
    /// Number of questions requested, `1..=50`.
    pub count: usize,
    /// Target difficulty, `1..=5`.
    pub difficulty: u8,
    pub question_type: QuestionType,
    pub choice_type: ChoiceType,
}

impl GenerationRequest {
    pub const MAX_COUNT: usize = 50;
    pub const MAX_DIFFICULTY: u8 = 5;

    /// Creates a builder that validates range constraints on `build()`.
    pub fn builder() -> GenerationRequestBuilder {
        GenerationRequestBuilder::default()
    }
}

/// Builder for [`GenerationRequest`] with range validation.
#[derive(Debug, Default)]
pub struct GenerationRequestBuilder {
    class_level: Option<String>,
    subject: Option<String>,
    chapter: Option<String>,
    topic: Option<String>,
    count: Option<usize>,
    difficulty: Option<u8>,
    question_type: QuestionType,
    choice_type: ChoiceType,
}

impl GenerationRequestBuilder {
    #[must_use]
    pub fn class_level(mut self, value: impl Into<String>) -> Self {
        self.class_level = Some(value.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, value: impl Into<String>) -> Self {
        self.subject = Some(value.into());
        self
    }

    #[must_use]
    pub fn chapter(mut self, value: impl Into<String>) -> Self {
        self.chapter = Some(value.into());
        self
    }

    #[must_use]
    pub fn topic(mut self, value: impl Into<String>) -> Self {
        self.topic = Some(value.into());
        self
    }

    #[must_use]
    pub fn count(mut self, value: usize) -> Self {
        self.count = Some(value);
        self
    }

    #[must_use]
    pub fn difficulty(mut self, value: u8) -> Self {
        self.difficulty = Some(value);
        self
    }

    #[must_use]
    pub fn question_type(mut self, value: QuestionType) -> Self {
        self.question_type = value;
        self
    }

    #[must_use]
    pub fn choice_type(mut self, value: ChoiceType) -> Self {
        self.choice_type = value;
        self
    }

    pub fn build(self) -> Result<GenerationRequest, RequestError> {
        let count = self.count.ok_or(RequestError::MissingField { field: "count" })?;
        if count == 0 || count > GenerationRequest::MAX_COUNT {
            return Err(RequestError::CountOutOfRange {
                count,
                max: GenerationRequest::MAX_COUNT,
            });
        }
        let difficulty = self
            .difficulty
            .ok_or(RequestError::MissingField { field: "difficulty" })?;
        if difficulty == 0 || difficulty > GenerationRequest::MAX_DIFFICULTY {
            return Err(RequestError::DifficultyOutOfRange {
                difficulty,
                max: GenerationRequest::MAX_DIFFICULTY,
            });
        }
        Ok(GenerationRequest {
            class_level: self
                .class_level
                .ok_or(RequestError::MissingField { field: "class_level" })?,
            subject: self
                .subject
                .ok_or(RequestError::MissingField { field: "subject" })?,
            chapter: self
                .chapter
                .ok_or(RequestError::MissingField { field: "chapter" })?,
            topic: self.topic.ok_or(RequestError::MissingField { field: "topic" })?,
            count,
            difficulty,
            question_type: self.question_type,
            choice_type: self.choice_type,
        })
    }
}

/// Errors raised while building a [`GenerationRequest`].
#[derive(Debug, Error, Diagnostic)]
pub enum RequestError {
    #[error("missing required field: {field}")]
    #[diagnostic(code(papersmith::request::missing_field))]
    MissingField { field: &'static str },

    #[error("requested count {count} is outside 1..={max}")]
    #[diagnostic(code(papersmith::request::count_out_of_range))]
    CountOutOfRange { count: usize, max: usize },

    #[error("difficulty {difficulty} is outside 1..={max}")]
    #[diagnostic(code(papersmith::request::difficulty_out_of_range))]
    DifficultyOutOfRange { difficulty: u8, max: u8 },
}

/// A question produced by the generator, not yet judged.
///
/// Objective candidates carry an ordered option list and one or more correct
/// answers; descriptive candidates carry an empty option list and a model
/// answer in `correct_answers`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateQuestion {
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answers: Vec<String>,
    pub difficulty_estimate: u8,
}

/// The three independent validation dimensions, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationScores {
    pub relevance: f32,
    pub difficulty_fit: f32,
    pub clarity: f32,
}

impl ValidationScores {
    pub fn new(relevance: f32, difficulty_fit: f32, clarity: f32) -> Self {
        Self {
            relevance: relevance.clamp(0.0, 1.0),
            difficulty_fit: difficulty_fit.clamp(0.0, 1.0),
            clarity: clarity.clamp(0.0, 1.0),
        }
    }

    /// Lowest of the three dimensions; the pass check compares this against
    /// the threshold so a single weak dimension fails the candidate.
    pub fn minimum(&self) -> f32 {
        self.relevance.min(self.difficulty_fit).min(self.clarity)
    }

    /// Mean of the three dimensions, used to rank over-fulfilled results.
    pub fn mean(&self) -> f32 {
        (self.relevance + self.difficulty_fit + self.clarity) / 3.0
    }
}

/// One validator judgement for one candidate within one attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Index of the judged candidate within its attempt, in generation order.
    pub question_ref: usize,
    pub passed: bool,
    pub scores: ValidationScores,
    pub feedback: String,
}
