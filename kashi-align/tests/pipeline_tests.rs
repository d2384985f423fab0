//! Integration tests for the alignment pipeline
//!
//! Tests cover:
//! - End-to-end success with direct and nested fragment shapes
//! - Failure injected at each stage, with error attribution
//! - Scratch cleanup after every terminal state
//! - Concurrent requests never sharing artifacts

mod helpers;

use helpers::{
    direct_fragments, pipeline, scratch_is_empty, FakeFetcher, FakeInvoker, ToolBehavior,
};
use kashi_align::models::{AlignmentRequest, AlignmentResult};
use kashi_align::pipeline::{PipelineError, Stage};
use kashi_align::reconcile::ReconciliationError;
use reqwest::Url;
use std::sync::Arc;

fn request(lines: &[&str]) -> AlignmentRequest {
    AlignmentRequest {
        audio_url: Url::parse("https://x/a.mp3").unwrap(),
        lines: lines.iter().map(|s| s.to_string()).collect(),
    }
}

// =============================================================================
// Success paths
// =============================================================================

#[tokio::test]
async fn test_two_lines_with_direct_spans() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Succeed,
        ToolBehavior::Emit(direct_fragments(&[(0.0, 2.5), (2.5, 5.0)])),
    ));
    let fetcher = Arc::new(FakeFetcher::ok());
    let pipeline = pipeline(scratch.path(), invoker.clone(), fetcher.clone());

    let results = pipeline.run(&request(&["春の歌", "遠い夢"])).await.unwrap();

    assert_eq!(
        results,
        vec![
            AlignmentResult { line_index: 1, text: "春の歌".into(), start: 0.0, end: 2.5 },
            AlignmentResult { line_index: 2, text: "遠い夢".into(), start: 2.5, end: 5.0 },
        ]
    );
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(invoker.calls().len(), 2);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_nested_fragment_envelope() {
    let scratch = tempfile::tempdir().unwrap();
    let output = serde_json::json!({
        "fragments": [{
            "lines": [
                { "begin": 1.0, "end": 1.2 },
                { "begin": 1.3, "end": 2.0 }
            ]
        }]
    })
    .to_string();
    let invoker = Arc::new(FakeInvoker::new(ToolBehavior::Succeed, ToolBehavior::Emit(output)));
    let pipeline = pipeline(scratch.path(), invoker, Arc::new(FakeFetcher::ok()));

    let results = pipeline.run(&request(&["遠い夢"])).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!((results[0].start, results[0].end), (1.0, 2.0));
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_stages_thread_the_same_artifacts() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Succeed,
        ToolBehavior::Emit(direct_fragments(&[(0.0, 1.0)])),
    ));
    let pipeline = pipeline(scratch.path(), invoker.clone(), Arc::new(FakeFetcher::ok()));

    pipeline.run(&request(&["歌"])).await.unwrap();

    let calls = invoker.calls();
    let normalize = &calls[0];
    let align = &calls[1];
    assert_eq!(normalize.program, "ffmpeg");
    assert_eq!(align.program, "python3");

    // ffmpeg's output is the aligner's audio input
    let normalized = normalize.args.last().unwrap();
    assert_eq!(&align.args[2], normalized);
    assert!(align.args[3].to_string_lossy().ends_with(".txt"));
    assert_eq!(
        align.args[4].to_string_lossy(),
        "task_language=jpn|os_task_file_format=json|is_text_type=plain"
    );
}

#[tokio::test]
async fn test_results_cover_every_line_in_order() {
    let scratch = tempfile::tempdir().unwrap();
    let lines: Vec<String> = (0..12).map(|i| format!("行 {}", i)).collect();
    let spans: Vec<(f64, f64)> = (0..12).map(|i| (i as f64, i as f64 + 0.75)).collect();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Succeed,
        ToolBehavior::Emit(direct_fragments(&spans)),
    ));
    let pipeline = pipeline(scratch.path(), invoker, Arc::new(FakeFetcher::ok()));
    let req = AlignmentRequest {
        audio_url: Url::parse("https://x/a.mp3").unwrap(),
        lines: lines.clone(),
    };

    let results = pipeline.run(&req).await.unwrap();

    assert_eq!(results.len(), lines.len());
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.line_index, i + 1);
        assert_eq!(result.text, lines[i]);
        assert!(result.start >= 0.0);
        assert!(result.end >= result.start);
    }
}

// =============================================================================
// Failure injection, one per stage, each followed by a cleanup check
// =============================================================================

#[tokio::test]
async fn test_fetch_failure_is_caller_fault_and_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(ToolBehavior::Succeed, ToolBehavior::Succeed));
    let pipeline = pipeline(scratch.path(), invoker.clone(), Arc::new(FakeFetcher::failing(404)));

    let err = pipeline.run(&request(&["a"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
    assert_eq!(err.stage(), Stage::Fetching);
    assert!(invoker.calls().is_empty());
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_normalizer_failure_surfaces_stderr_and_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Fail("audio_x: Invalid data found when processing input".into()),
        ToolBehavior::Succeed,
    ));
    let pipeline = pipeline(scratch.path(), invoker.clone(), Arc::new(FakeFetcher::ok()));

    let err = pipeline.run(&request(&["a"])).await.unwrap_err();

    match &err {
        PipelineError::ToolExecution { stage, detail } => {
            assert_eq!(*stage, Stage::Normalizing);
            assert_eq!(detail, "audio_x: Invalid data found when processing input");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(invoker.calls().len(), 1);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_missing_normalizer_is_configuration_fault() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(ToolBehavior::Missing, ToolBehavior::Succeed));
    let pipeline = pipeline(scratch.path(), invoker, Arc::new(FakeFetcher::ok()));

    let err = pipeline.run(&request(&["a"])).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ToolMissing { stage: Stage::Normalizing, ref program } if program == "ffmpeg"
    ));
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_lyrics_write_failure_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(ToolBehavior::WipeScratch, ToolBehavior::Succeed));
    let pipeline = pipeline(scratch.path(), invoker.clone(), Arc::new(FakeFetcher::ok()));

    let err = pipeline.run(&request(&["a"])).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Unexpected { stage: Stage::WritingLyrics, .. }
    ));
    // Aligner never ran
    assert_eq!(invoker.calls().len(), 1);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_aligner_failure_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Succeed,
        ToolBehavior::Fail("RuntimeError: Unable to synthesize text".into()),
    ));
    let pipeline = pipeline(scratch.path(), invoker, Arc::new(FakeFetcher::ok()));

    let err = pipeline.run(&request(&["a"])).await.unwrap_err();

    assert_eq!(err.stage(), Stage::Aligning);
    assert!(err.to_string().contains("RuntimeError: Unable to synthesize text"));
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_aligner_timeout_is_tool_execution_error() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(ToolBehavior::Succeed, ToolBehavior::TimeOut));
    let pipeline = pipeline(scratch.path(), invoker, Arc::new(FakeFetcher::ok()));

    let err = pipeline.run(&request(&["a"])).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ToolExecution { stage: Stage::Aligning, .. }
    ));
    assert!(err.to_string().contains("timed out"));
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_fragment_count_mismatch_yields_no_results() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Succeed,
        ToolBehavior::Emit(direct_fragments(&[(0.0, 1.0)])),
    ));
    let pipeline = pipeline(scratch.path(), invoker, Arc::new(FakeFetcher::ok()));

    let err = pipeline.run(&request(&["a", "b", "c"])).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Reconciliation(ReconciliationError::CountMismatch {
            fragments: 1,
            lines: 3
        })
    ));
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_malformed_aligner_output_is_reconciliation_fault() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Succeed,
        ToolBehavior::Emit("not json at all".into()),
    ));
    let pipeline = pipeline(scratch.path(), invoker, Arc::new(FakeFetcher::ok()));

    let err = pipeline.run(&request(&["a"])).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Reconciliation(ReconciliationError::Parse(_))
    ));
    assert!(scratch_is_empty(scratch.path()));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_isolated() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = Arc::new(FakeInvoker::new(
        ToolBehavior::Succeed,
        ToolBehavior::Emit(direct_fragments(&[(0.0, 1.0), (1.0, 2.0)])),
    ));
    let pipeline = Arc::new(pipeline(scratch.path(), invoker.clone(), Arc::new(FakeFetcher::ok())));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let lines = vec![format!("req {} a", i), format!("req {} b", i)];
                let req = AlignmentRequest {
                    audio_url: Url::parse("https://x/a.mp3").unwrap(),
                    lines: lines.clone(),
                };
                let results = pipeline.run(&req).await.unwrap();
                assert_eq!(results[0].text, lines[0]);
                assert_eq!(results[1].text, lines[1]);
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    // Every request used its own output paths
    let mut outputs: Vec<_> = invoker
        .calls()
        .iter()
        .map(|c| c.args.last().unwrap().clone())
        .collect();
    let total = outputs.len();
    outputs.sort();
    outputs.dedup();
    assert_eq!(outputs.len(), total);
    assert!(scratch_is_empty(scratch.path()));
}
