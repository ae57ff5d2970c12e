//! Concurrent reconciliation of independent load balancers.
//!
//! Calls are isolated by resource name, so no locking is needed beyond the
//! concurrency bound.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::Reconciler;
use crate::error::{EnforcerError, Result};
use crate::model::{ObservedState, ResourceSpec};

/// Reconcile every spec with at most `max_concurrency` calls in flight.
///
/// Returns one `(name, result)` per spec, in input order. A failing
/// reconciliation does not affect the others.
pub async fn reconcile_all<R>(
    reconciler: Arc<R>,
    specs: Vec<ResourceSpec>,
    max_concurrency: usize,
) -> Vec<(String, Result<ObservedState>)>
where
    R: Reconciler<Spec = ResourceSpec, Status = ObservedState> + 'static,
{
    info!(
        "Reconciling {} load balancers, {} at a time",
        specs.len(),
        max_concurrency
    );

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
    let mut tasks = JoinSet::new();

    for (index, spec) in specs.into_iter().enumerate() {
        let reconciler = Arc::clone(&reconciler);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => reconciler.reconcile(&spec).await,
                Err(e) => Err(EnforcerError::InvariantViolation(format!(
                    "concurrency limiter closed: {}",
                    e
                ))),
            };
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<ObservedState>>> = names.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => error!("Reconciliation task failed: {}", e),
        }
    }

    names
        .into_iter()
        .zip(results)
        .map(|(name, result)| {
            let result = result.unwrap_or_else(|| {
                Err(EnforcerError::InvariantViolation(format!(
                    "reconciliation of {} did not complete",
                    name
                )))
            });
            (name, result)
        })
        .collect()
}
