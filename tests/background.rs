//! Background execution and streamed progress

use cadmium::async_prelude::*;
use cadmium::{AlgorithmRegistry, PropertyValue};
use futures::StreamExt;
use std::sync::Arc;

fn context() -> ExecutionContext {
    ExecutionContext::new(Arc::new(AlgorithmRegistry::with_builtins().unwrap()))
}

fn create(ctx: &ExecutionContext, name: &str, counts: f64) -> AlgorithmInstance {
    let mut alg = ctx.registry().create("CreateWorkspace", None).unwrap();
    alg.set_property("DataX", vec![0.0, 1.0, 2.0, 3.0]).unwrap();
    alg.set_property("DataY", vec![counts; 3]).unwrap();
    alg.set_property("OutputWorkspace", PropertyValue::Workspace(name.into()))
        .unwrap();
    alg
}

#[tokio::test]
async fn test_background_execution_streams_progress() {
    let (sink, events) = progress_channel();
    let ctx = context().with_progress(Arc::new(sink));
    let store = ctx.store().clone();
    let alg = create(&ctx, "flat", 5.0);

    let executed = execute_in_background(alg, ctx).await.unwrap();
    assert!(executed.is_executed());
    assert_eq!(store.get("flat").unwrap().spectrum(0).unwrap().y(), &[5.0; 3]);

    // The sender went away with the context, so the stream ends
    let events: Vec<ProgressEvent> = events.collect().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, "CreateWorkspace");
    assert_eq!((events[0].current, events[0].total), (1, 1));
}

#[tokio::test]
async fn test_background_failure_is_returned() {
    let ctx = context();
    let mut alg = ctx.registry().create("Rebin", None).unwrap();
    alg.set_property("InputWorkspace", PropertyValue::Workspace("absent".into()))
        .unwrap();

    let err = execute_in_background(alg, ctx).await.err().unwrap();
    assert!(matches!(err, AlgorithmError::Invalid(_)));
}

#[tokio::test]
async fn test_batch_keeps_submission_order() {
    let ctx = context();
    let mut bad = ctx.registry().create("Scale", None).unwrap();
    bad.set_property("InputWorkspace", PropertyValue::Workspace("missing".into()))
        .unwrap();
    bad.set_property("OutputWorkspace", PropertyValue::Workspace("never".into()))
        .unwrap();
    let batch = vec![create(&ctx, "a", 1.0), bad, create(&ctx, "b", 2.0)];

    let results = execute_batch(batch, &ctx).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().name(), "CreateWorkspace");
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
    assert_eq!(ctx.store().names(), vec!["a", "b"]);
}
