//! # Papersmith: Retrieval-Augmented Question Paper Generation
//!
//! Papersmith turns a syllabus knowledge base into validated question papers.
//! It has two halves that run independently of one another:
//!
//! ```text
//! Ingestion (per document, asynchronous):
//!
//!   RawDocument ──► ingest::extract ──► ingest::chunker ──► ingest::embedder
//!                                                                  │
//!                                             batched vectors ─────┤
//!                                                                  ▼
//!                                                     stores::VectorStore (upsert)
//!
//! Generation (per request, one workflow run):
//!
//!   GenerationRequest ──► retrieve::ContextRetriever ──► workflow::Orchestrator
//!                                    ▲                       │        ▲
//!                        stores::VectorStore (query)         ▼        │ retry on
//!                                                 workflow::generator │ low pass rate
//!                                                         │           │
//!                                                         ▼           │
//!                                                 workflow::validator ┘
//!                                                         │
//!                                                         ▼
//!                                          GenerationOutcome + ValidationReport
//! ```
//!
//! The orchestrator is an explicit finite-state machine
//! (`RETRIEVE → GENERATE → VALIDATE → DECIDE → {GENERATE | FINALIZE}`) whose
//! transition function is pure and unit-testable without any external service;
//! see [`workflow::machine`].
//!
//! External capabilities — embeddings, chat completions, the vector store,
//! and document text extraction — are trait seams under [`providers`],
//! [`stores`], and [`ingest::extract`]. Deterministic mocks and an in-memory
//! cosine store back the test suite and local runs.
//!
//! Construct a [`engine::PaperEngine`] once at process start and share it
//! across requests; each generation run owns its own workflow state.

pub mod config;
pub mod engine;
pub mod ingest;
pub mod providers;
pub mod question;
pub mod retrieve;
pub mod stores;
pub mod telemetry;
pub mod workflow;

pub use config::EngineConfig;
pub use engine::PaperEngine;
pub use question::{CandidateQuestion, GenerationRequest, ValidationVerdict};
pub use workflow::orchestrator::{CancelToken, GenerationOutcome, WorkflowError};
pub use workflow::report::ValidationReport;
