//! Run reporting.
//!
//! Every finished run — fulfilled, short, or cancelled — carries a
//! [`ValidationReport`] with per-attempt totals, individual verdicts in
//! generation order, and the shortfall against the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{AttemptRecord, WorkflowState};

/// Summary of one generation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: String,
    pub requested: usize,
    pub delivered: usize,
    /// `requested - delivered`; zero for fulfilled runs.
    pub shortfall: usize,
    pub total_generated: usize,
    pub total_passed: usize,
    /// Passed over validated, across every attempt.
    pub overall_pass_rate: f32,
    /// Per-attempt totals and verdicts, in attempt order.
    pub attempts: Vec<AttemptRecord>,
    /// Chunks that made up the (fixed) context block for this run.
    pub context_chunks: usize,
    pub cancelled: bool,
    pub finished_at: DateTime<Utc>,
}

impl ValidationReport {
    pub(crate) fn from_state(
        run_id: &str,
        state: &WorkflowState,
        delivered: usize,
        cancelled: bool,
    ) -> Self {
        let total_generated: usize = state.attempts.iter().map(|a| a.generated).sum();
        let total_validated: usize = state.attempts.iter().map(|a| a.validated).sum();
        let total_passed: usize = state.attempts.iter().map(|a| a.passed).sum();
        let overall_pass_rate = if total_validated == 0 {
            0.0
        } else {
            total_passed as f32 / total_validated as f32
        };
        Self {
            run_id: run_id.to_string(),
            requested: state.request.count,
            delivered,
            shortfall: state.request.count.saturating_sub(delivered),
            total_generated,
            total_passed,
            overall_pass_rate,
            attempts: state.attempts.clone(),
            context_chunks: state.context.chunk_count,
            cancelled,
            finished_at: Utc::now(),
        }
    }
}
