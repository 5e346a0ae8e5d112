//! End-to-end runs through the pipeline with scripted backends.

use std::sync::Arc;
use std::time::Duration;
use veritas_foundation::config::{BackendConfig, ConsistencyConfig, ProviderKind, RefinerConfig};
use veritas_foundation::feedback::{EventFilter, FeedbackRouter, HandlerError, handler_fn};
use veritas_foundation::{
    InferencePipeline, ModelRegistry, PipelineBuilder, RefinementStatus, RegisterMode,
};
use veritas_kernel::{
    BackendAdapter, BackendError, FeedbackKind, FeedbackPayload, InferenceError, OutputFormat,
};
use veritas_testing::{RecordingHandler, ScriptedBackend, assert_backend_called};

struct Harness {
    pipeline: InferencePipeline,
    recorder: RecordingHandler,
}

impl Harness {
    fn new(backend: &ScriptedBackend) -> Self {
        Self::with(backend, |b| b)
    }

    fn with(
        backend: &ScriptedBackend,
        configure: impl FnOnce(PipelineBuilder) -> PipelineBuilder,
    ) -> Self {
        let registry = Arc::new(ModelRegistry::new());
        registry
            .register(
                Arc::new(backend.clone()),
                BackendConfig::new("granite", ProviderKind::Local)
                    .with_capability("summarize", 1.0)
                    .as_default(),
                RegisterMode::Insert,
            )
            .unwrap();

        let router = FeedbackRouter::default();
        let recorder = RecordingHandler::new();
        router
            .subscribe(EventFilter::all(), Arc::new(recorder.clone()))
            .unwrap();

        let pipeline = configure(InferencePipeline::builder(registry).router(router))
            .build()
            .unwrap();
        Self { pipeline, recorder }
    }

    /// Wait until every published event reached the recorder.
    async fn drain(&self) {
        self.pipeline.router().shutdown().await;
    }
}

#[tokio::test]
async fn identical_samples_are_elected_and_accepted() {
    let backend = ScriptedBackend::fixed("Summary of X: summarize X in three points.");
    let harness = Harness::new(&backend);

    let outcome = harness
        .pipeline
        .submit(harness.pipeline.request("summarize X").samples(3))
        .await
        .unwrap();
    harness.drain().await;

    let verdict = outcome.verdict.as_ref().unwrap();
    assert_eq!(verdict.agreement_ratio, 1.0);
    assert_eq!(verdict.samples_succeeded, 3);
    assert!(verdict.dissenting.is_empty());
    assert_eq!(
        outcome.candidate.text,
        "Summary of X: summarize X in three points."
    );
    assert_eq!(outcome.status, RefinementStatus::Accepted);
    assert_eq!(outcome.steps.len(), 1);
    assert_backend_called!(backend, 3);

    assert_eq!(harness.recorder.kinds(), vec![FeedbackKind::Accepted]);
}

#[tokio::test]
async fn failing_format_exhausts_with_best_of_three() {
    let backend = ScriptedBackend::sequence([
        "nothing to see here",
        "summarize quarterly report",
        "quarterly",
    ]);
    let harness = Harness::with(&backend, |b| {
        b.refiner(RefinerConfig {
            max_iterations: 2,
            ..RefinerConfig::default()
        })
    });

    let outcome = harness
        .pipeline
        .submit(
            harness
                .pipeline
                .request("summarize the quarterly report")
                .samples(1)
                .format(OutputFormat::Json {
                    required_fields: vec![],
                }),
        )
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(outcome.status, RefinementStatus::Exhausted);
    let sequences: Vec<u32> = outcome.steps.iter().map(|s| s.candidate.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert!(outcome.steps.iter().all(|s| !s.score.passed));
    assert_eq!(outcome.candidate.sequence, 1);
    assert_eq!(outcome.candidate.text, "summarize quarterly report");
    assert_backend_called!(backend, 3);

    let exhausted: Vec<_> = harness
        .recorder
        .events()
        .into_iter()
        .filter(|e| e.kind() == FeedbackKind::RefinementExhausted)
        .collect();
    assert_eq!(exhausted.len(), 1);
    match &exhausted[0].payload {
        FeedbackPayload::RefinementExhausted {
            best, iterations, ..
        } => {
            assert_eq!(best.sequence, 1);
            assert_eq!(*iterations, 2);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(harness.recorder.count(FeedbackKind::ScoreBelowThreshold), 1);
    assert_eq!(harness.recorder.count(FeedbackKind::Accepted), 0);
}

#[tokio::test]
async fn unknown_model_fails_before_any_call() {
    let backend = ScriptedBackend::fixed("unused");
    let harness = Harness::new(&backend);

    let err = harness
        .pipeline
        .submit(harness.pipeline.request("summarize X").model("ghost"))
        .await
        .unwrap_err();
    harness.drain().await;

    assert_eq!(err.error, InferenceError::ModelNotFound("ghost".into()));
    assert_backend_called!(backend, 0);
    assert!(err.events.is_empty());
    assert_eq!(harness.recorder.count(FeedbackKind::BackendFailure), 0);
}

#[tokio::test]
async fn unreachable_backend_reports_backend_failure_once() {
    let backend = ScriptedBackend::failing(BackendError::Auth("bad key".into()));
    let harness = Harness::new(&backend);

    let err = harness
        .pipeline
        .submit(harness.pipeline.request("summarize X").samples(3))
        .await
        .unwrap_err();
    harness.drain().await;

    assert_eq!(
        err.error,
        InferenceError::InsufficientSamples {
            requested: 3,
            succeeded: 0
        }
    );
    // Authentication errors are not retried.
    assert_backend_called!(backend, 3);
    assert_eq!(harness.recorder.count(FeedbackKind::BackendFailure), 1);
}

#[tokio::test]
async fn disagreeing_samples_fail_consistency() {
    let backend = ScriptedBackend::sequence([
        "alpha bravo charlie",
        "delta echo foxtrot",
        "golf hotel india",
    ]);
    let harness = Harness::with(&backend, |b| {
        b.consistency(ConsistencyConfig {
            quorum: 0.6,
            ..ConsistencyConfig::default()
        })
    });

    let err = harness
        .pipeline
        .submit(harness.pipeline.request("summarize X").samples(3))
        .await
        .unwrap_err();
    harness.drain().await;

    match err.error {
        InferenceError::ConsistencyFailure {
            agreement_ratio,
            quorum,
        } => {
            assert!((agreement_ratio - 1.0 / 3.0).abs() < 1e-9);
            assert_eq!(quorum, 0.6);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        harness.recorder.kinds(),
        vec![FeedbackKind::ConsistencyFailure]
    );
}

#[tokio::test(start_paused = true)]
async fn deadline_cancels_slow_backend() {
    let backend = ScriptedBackend::delayed(Duration::from_secs(30), "too late");
    let harness = Harness::new(&backend);

    let err = harness
        .pipeline
        .submit(
            harness
                .pipeline
                .request("summarize X")
                .samples(1)
                .timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    harness.drain().await;

    assert!(matches!(err.error, InferenceError::DeadlineExceeded { .. }));
    assert_eq!(harness.recorder.count(FeedbackKind::Accepted), 0);
}

#[tokio::test]
async fn panicking_subscriber_does_not_starve_others() {
    let backend = ScriptedBackend::fixed("Summary of X: summarize X in three points.");
    let harness = Harness::new(&backend);
    harness.pipeline.router().subscribe(
        EventFilter::all(),
        handler_fn(|_event| async {
            if true {
                panic!("subscriber bug");
            }
            Ok::<(), HandlerError>(())
        }),
    )
    .unwrap();
    harness.pipeline.router().subscribe(
        EventFilter::kinds([FeedbackKind::BackendFailure]),
        handler_fn(|_event| async { Err::<(), HandlerError>("rejected".into()) }),
    )
    .unwrap();

    let outcome = harness
        .pipeline
        .submit(harness.pipeline.request("summarize X"))
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(outcome.status, RefinementStatus::Accepted);
    assert_eq!(harness.recorder.kinds(), vec![FeedbackKind::Accepted]);
}

#[tokio::test]
async fn capability_routing_and_hot_reload() {
    let backend = ScriptedBackend::fixed("Summary of X: summarize X in three points.");
    let harness = Harness::new(&backend);
    let registry = harness.pipeline.registry().clone();

    let outcome = harness
        .pipeline
        .submit(harness.pipeline.request("summarize X").capability("summarize"))
        .await
        .unwrap();
    assert_eq!(outcome.candidate.backend_id, "granite");

    let replacement = ScriptedBackend::fixed("Summary of X: summarize X briefly.");
    let adapter: Arc<dyn BackendAdapter> = Arc::new(replacement.clone());
    registry
        .reload(vec![(
            adapter,
            BackendConfig::new("mistral", ProviderKind::Local).with_capability("summarize", 1.0),
        )])
        .unwrap();

    let outcome = harness
        .pipeline
        .submit(harness.pipeline.request("summarize X").capability("summarize"))
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(outcome.candidate.backend_id, "mistral");
    assert_backend_called!(replacement, 3);
}
