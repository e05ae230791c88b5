use futures::stream::{FuturesOrdered, StreamExt};

use crate::core::algorithm::AlgorithmInstance;
use crate::core::context::ExecutionContext;
use crate::core::error::AlgorithmError;

/// Executes `instance` on tokio's blocking pool and hands it back once done.
///
/// A panic inside the algorithm surfaces as [`AlgorithmError::Panicked`].
pub async fn execute_in_background(
    mut instance: AlgorithmInstance,
    ctx: ExecutionContext,
) -> Result<AlgorithmInstance, AlgorithmError> {
    let name = instance.name().to_string();
    let handle = tokio::task::spawn_blocking(move || -> Result<AlgorithmInstance, AlgorithmError> {
        instance.execute(&ctx)?;
        Ok(instance)
    });

    match handle.await {
        Ok(result) => result,
        Err(e) => Err(AlgorithmError::Panicked {
            algorithm: name,
            message: e.to_string(),
        }),
    }
}

/// Executes independent instances concurrently, each on its own blocking task.
///
/// Results come back in input order.
pub async fn execute_batch(
    instances: Vec<AlgorithmInstance>,
    ctx: &ExecutionContext,
) -> Vec<Result<AlgorithmInstance, AlgorithmError>> {
    let mut pending: FuturesOrdered<_> = instances
        .into_iter()
        .map(|instance| execute_in_background(instance, ctx.clone()))
        .collect();

    let mut results = Vec::new();
    while let Some(result) = pending.next().await {
        results.push(result);
    }
    results
}
