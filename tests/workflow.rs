//! End-to-end workflow scenarios against scripted collaborators.

mod common;

use std::sync::Arc;

use common::*;
use papersmith::config::WorkflowPolicy;
use papersmith::workflow::generator::GenerationError;
use papersmith::workflow::orchestrator::{
    CancelToken, ContextSource, Orchestrator, WorkflowError,
};

fn orchestrator(
    context: impl ContextSource + 'static,
    generator: Arc<ScriptedGenerator>,
    policy: WorkflowPolicy,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(context),
        generator,
        Arc::new(MarkerValidator),
        policy,
    )
}

fn syllabus_context() -> FixedContext {
    FixedContext(context_block("Quadratic equations ax^2 + bx + c = 0.", 3))
}

#[tokio::test]
async fn low_pass_rate_retries_and_accumulates() {
    // count=10; attempt 1: 3/10 pass (0.3 < 0.5) → retry asking for the
    // remaining 7; attempt 2: 5/7 pass (≈0.71) → finalize with 8, shortfall 2.
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(marked_candidates(3, 7)),
        Ok(marked_candidates(5, 2)),
    ]));
    let orchestrator = orchestrator(syllabus_context(), generator.clone(), WorkflowPolicy::default());

    let outcome = orchestrator.run(request(10)).await.unwrap();

    assert_eq!(generator.requested_counts(), vec![10, 7]);
    assert_eq!(outcome.questions.len(), 8);
    assert_eq!(outcome.report.delivered, 8);
    assert_eq!(outcome.report.shortfall, 2);
    assert_eq!(outcome.report.attempts.len(), 2);
    assert_eq!(outcome.report.total_generated, 17);
    assert!((outcome.report.attempts[0].pass_rate - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn decent_pass_rate_finalizes_despite_shortfall() {
    // 6/10 pass: 0.6 ≥ 0.5, so no retry — shortfall is reported, not retried.
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(marked_candidates(6, 4))]));
    let orchestrator = orchestrator(syllabus_context(), generator.clone(), WorkflowPolicy::default());

    let outcome = orchestrator.run(request(10)).await.unwrap();

    assert_eq!(generator.requested_counts(), vec![10]);
    assert_eq!(outcome.report.attempts.len(), 1);
    assert_eq!(outcome.questions.len(), 6);
    assert_eq!(outcome.report.shortfall, 4);
}

#[tokio::test]
async fn output_is_bounded_and_selected_by_score() {
    // Generator over-delivers: 4 passing candidates for a count of 2. The
    // two best average scores win.
    let candidates = vec![
        candidate("pass@0.70 first"),
        candidate("pass@0.95 second"),
        candidate("pass@0.65 third"),
        candidate("pass@0.90 fourth"),
    ];
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(candidates)]));
    let orchestrator = orchestrator(syllabus_context(), generator, WorkflowPolicy::default());

    let outcome = orchestrator.run(request(2)).await.unwrap();

    assert_eq!(outcome.questions.len(), 2);
    assert!(outcome.questions[0].question.text.contains("second"));
    assert!(outcome.questions[1].question.text.contains("fourth"));
    // The report still accounts for everything that passed.
    assert_eq!(outcome.report.total_passed, 4);
    assert_eq!(outcome.report.shortfall, 0);
}

#[tokio::test]
async fn attempts_never_exceed_the_budget() {
    let policy = WorkflowPolicy {
        max_attempts: 3,
        ..WorkflowPolicy::default()
    };
    // Every attempt passes 1 of 10 (rate 0.1): retry until the budget is spent.
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(marked_candidates(1, 9)),
        Ok(marked_candidates(1, 8)),
        Ok(marked_candidates(1, 7)),
        Ok(marked_candidates(1, 6)), // never reached
    ]));
    let orchestrator = orchestrator(syllabus_context(), generator.clone(), policy);

    let outcome = orchestrator.run(request(10)).await.unwrap();

    assert_eq!(outcome.report.attempts.len(), 3);
    assert_eq!(generator.requested_counts(), vec![10, 9, 8]);
    assert_eq!(outcome.questions.len(), 3);
    assert_eq!(outcome.report.shortfall, 7);
}

#[tokio::test]
async fn empty_context_degrades_instead_of_failing() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(marked_candidates(3, 0))]));
    let orchestrator = orchestrator(
        FixedContext(papersmith::retrieve::ContextBlock::empty()),
        generator.clone(),
        WorkflowPolicy::default(),
    );

    let outcome = orchestrator.run(request(3)).await.unwrap();

    assert_eq!(generator.requested_counts(), vec![3]);
    assert_eq!(outcome.questions.len(), 3);
    assert_eq!(outcome.report.context_chunks, 0);
}

#[tokio::test]
async fn retrieval_failure_also_degrades() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(marked_candidates(2, 0))]));
    let orchestrator = orchestrator(FailingContext, generator, WorkflowPolicy::default());

    let outcome = orchestrator.run(request(2)).await.unwrap();
    assert_eq!(outcome.questions.len(), 2);
    assert_eq!(outcome.report.context_chunks, 0);
}

#[tokio::test]
async fn no_context_and_nothing_passed_is_a_hard_failure() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(marked_candidates(0, 5)),
        Ok(marked_candidates(0, 5)),
        Ok(marked_candidates(0, 5)),
    ]));
    let orchestrator = orchestrator(
        FixedContext(papersmith::retrieve::ContextBlock::empty()),
        generator,
        WorkflowPolicy::default(),
    );

    let err = orchestrator.run(request(5)).await.unwrap_err();
    match err {
        WorkflowError::Exhausted {
            attempts,
            last_feedback,
        } => {
            assert_eq!(attempts, 3);
            let feedback = last_feedback.expect("terminal failure must carry the last feedback");
            assert!(feedback.contains("ambiguous"));
        }
    }
}

#[tokio::test]
async fn generation_failure_consumes_an_attempt_and_retries() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerationError::Empty),
        Ok(marked_candidates(4, 0)),
    ]));
    let orchestrator = orchestrator(syllabus_context(), generator.clone(), WorkflowPolicy::default());

    let outcome = orchestrator.run(request(4)).await.unwrap();

    assert_eq!(outcome.report.attempts.len(), 2);
    assert_eq!(outcome.report.attempts[0].generated, 0);
    assert_eq!(outcome.questions.len(), 4);
}

#[tokio::test]
async fn retry_carries_only_the_latest_feedback() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(marked_candidates(1, 3)),
        Ok(marked_candidates(1, 2)),
        Ok(marked_candidates(4, 0)),
    ]));
    let orchestrator = orchestrator(syllabus_context(), generator.clone(), WorkflowPolicy::default());

    let outcome = orchestrator.run(request(6)).await.unwrap();
    assert_eq!(outcome.report.attempts.len(), 3);

    let feedback = generator.feedback_notes();
    assert_eq!(feedback[0], None);
    // Attempt 2 sees attempt 1's three failures; attempt 3 only attempt 2's two.
    assert_eq!(feedback[1].as_ref().unwrap().len(), 3);
    assert_eq!(feedback[2].as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_candidates_are_discarded_not_failed() {
    // 2 pass, 1 fail, 1 discarded: pass rate is 2/3, not 2/4.
    let mut candidates = marked_candidates(2, 1);
    candidates.push(candidate("bad-structure"));
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(candidates)]));
    let orchestrator = orchestrator(syllabus_context(), generator, WorkflowPolicy::default());

    let outcome = orchestrator.run(request(4)).await.unwrap();

    let attempt = &outcome.report.attempts[0];
    assert_eq!(attempt.generated, 4);
    assert_eq!(attempt.validated, 3);
    assert_eq!(attempt.discarded, 1);
    assert!((attempt.pass_rate - 2.0 / 3.0).abs() < 1e-6);
    // 2/3 ≥ 0.5: the discard did not force a retry.
    assert_eq!(outcome.report.attempts.len(), 1);
}

#[tokio::test]
async fn cancellation_between_attempts_keeps_completed_work() {
    let token = CancelToken::new();
    // Attempt 1 would normally retry (1/4 pass) but the token is cancelled
    // while it runs; the attempt completes and the run halts before attempt 2.
    let generator = Arc::new(ScriptedGenerator::cancelling(
        vec![Ok(marked_candidates(1, 3)), Ok(marked_candidates(3, 0))],
        token.clone(),
    ));
    let orchestrator = orchestrator(syllabus_context(), generator.clone(), WorkflowPolicy::default());

    let outcome = orchestrator
        .run_cancellable(request(4), token)
        .await
        .unwrap();

    assert_eq!(generator.requested_counts(), vec![4]);
    assert_eq!(outcome.report.attempts.len(), 1);
    assert!(outcome.report.cancelled);
    assert_eq!(outcome.questions.len(), 1);
}

#[tokio::test]
async fn pre_cancelled_run_finalizes_empty() {
    let token = CancelToken::new();
    token.cancel();
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(marked_candidates(3, 0))]));
    let orchestrator = orchestrator(syllabus_context(), generator.clone(), WorkflowPolicy::default());

    let outcome = orchestrator
        .run_cancellable(request(3), token)
        .await
        .unwrap();

    assert!(generator.requested_counts().is_empty());
    assert!(outcome.report.cancelled);
    assert_eq!(outcome.questions.len(), 0);
    assert_eq!(outcome.report.shortfall, 3);
}

#[tokio::test]
async fn verdicts_are_reported_in_generation_order() {
    let candidates = vec![
        candidate("fail-first"),
        candidate("pass-second"),
        candidate("fail-third"),
    ];
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(candidates)]));
    let orchestrator = orchestrator(syllabus_context(), generator, WorkflowPolicy::default());

    let outcome = orchestrator.run(request(3)).await.unwrap();
    let verdicts = &outcome.report.attempts[0].verdicts;
    assert_eq!(verdicts.len(), 3);
    for (idx, verdict) in verdicts.iter().enumerate() {
        assert_eq!(verdict.question_ref, idx);
    }
    assert!(!verdicts[0].passed);
    assert!(verdicts[1].passed);
    assert!(!verdicts[2].passed);
}
