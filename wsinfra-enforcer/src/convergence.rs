//! Waiters for eventually-consistent cloud resources.
//!
//! Each waiter parameterizes [`await_condition`] for one resource kind and
//! decides what a timeout means: instance startup degrades to the last seen
//! description, database, HTTP and load balancer waits raise.

use std::fmt::Debug;

use tracing::{debug, info, warn};

use crate::error::{EnforcerError, Result};
use crate::gateway::{DatabaseApi, HttpProbe, InstanceApi, LoadBalancerApi};
use crate::model::{DatabaseDescription, InstanceDescription, InstanceState, ObservedState};
use crate::poll::{await_condition, PollError, PollOutcome, PollSpec};

/// Map a poll error to the enforcer taxonomy.
fn into_enforcer_error<P: Debug>(what: String, err: PollError<P>) -> EnforcerError {
    match err {
        PollError::Timeout { attempts, last } => EnforcerError::ConvergenceTimeout {
            what,
            attempts,
            last_observed: format!("{:?}", last),
        },
        PollError::Failed(reason) => EnforcerError::ConvergenceFailed { what, reason },
        PollError::Predicate(e) => e,
    }
}

/// Wait until the instance is running and has a public address.
///
/// An instance not yet visible counts as pending. A dying instance fails
/// immediately. On timeout the last seen description is returned with a
/// warning; only an instance that was never seen raises.
pub async fn await_instance_running<A: InstanceApi + ?Sized>(
    api: &A,
    id: &str,
    spec: PollSpec,
) -> Result<InstanceDescription> {
    let outcome = await_condition(spec, || async move {
        let instance = api.describe_instance(id).await?;
        Ok(match instance {
            Some(i) if i.state.is_dying() => {
                PollOutcome::Failed(format!("instance {} is {:?}", i.id, i.state))
            }
            Some(i) if i.state == InstanceState::Running && i.public_address.is_some() => {
                PollOutcome::Ready(i)
            }
            other => {
                debug!("Instance {} not yet running: {:?}", id, other.as_ref().map(|i| i.state));
                PollOutcome::Pending(other)
            }
        })
    })
    .await;

    match outcome {
        Ok(instance) => {
            debug!("Instance {} is started", id);
            Ok(instance)
        }
        Err(PollError::Timeout {
            attempts,
            last: Some(instance),
        }) => {
            warn!(
                "Timeout waiting for startup of {} after {} attempts, proceeding with state {:?}",
                id, attempts, instance.state
            );
            Ok(instance)
        }
        Err(e) => Err(into_enforcer_error(format!("instance {} running", id), e)),
    }
}

/// Wait for each instance in turn. Instances that died during startup are
/// terminated and skipped; a failed termination is only logged.
pub async fn await_instances_running<A: InstanceApi + ?Sized>(
    api: &A,
    ids: &[String],
    spec: PollSpec,
) -> Result<Vec<InstanceDescription>> {
    let mut started = Vec::with_capacity(ids.len());
    for id in ids {
        match await_instance_running(api, id, spec).await {
            Ok(instance) => started.push(instance),
            Err(EnforcerError::ConvergenceFailed { reason, .. }) => {
                warn!("Terminate and skip dying instance {}: {}", id, reason);
                if let Err(e) = api.terminate_instance(id).await {
                    warn!("Failed to terminate instance {}: {}", id, e);
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(started)
}

/// Wait until the database is `available`. A vanished database fails
/// immediately; a timeout raises.
pub async fn await_database_available<A: DatabaseApi + ?Sized>(
    api: &A,
    id: &str,
    spec: PollSpec,
) -> Result<DatabaseDescription> {
    info!("Waiting for database {} to become available", id);
    await_condition(spec, || async move {
        Ok(match api.describe_database(id).await? {
            None => PollOutcome::Failed(format!("database {} no longer exists", id)),
            Some(db) if db.is_available() => PollOutcome::Ready(db),
            Some(db) => {
                info!("Database {} not yet available ({}), sleep...", id, db.status);
                PollOutcome::Pending(db.status)
            }
        })
    })
    .await
    .map_err(|e| into_enforcer_error(format!("database {} available", id), e))
}

/// Wait until `url` answers 200. Other statuses and transport errors are
/// pending; on timeout the last one is raised.
pub async fn await_http_available<P: HttpProbe + ?Sized>(
    probe: &P,
    url: &str,
    spec: PollSpec,
) -> Result<()> {
    let outcome = await_condition(spec, || async move {
        Ok(match probe.http_get(url).await {
            Ok(200) => PollOutcome::Ready(()),
            Ok(status) => PollOutcome::Pending(EnforcerError::Http {
                url: url.to_string(),
                message: format!("returned response code {}", status),
            }),
            Err(e @ EnforcerError::Http { .. }) => PollOutcome::Pending(e),
            Err(e) => return Err(e),
        })
    })
    .await;

    match outcome {
        Ok(()) => {
            info!("URL {} is available", url);
            Ok(())
        }
        Err(PollError::Timeout { last, .. }) => Err(last),
        Err(e) => Err(into_enforcer_error(format!("{} available", url), e)),
    }
}

/// Wait until a freshly created load balancer shows up in describe calls.
pub async fn await_load_balancer_visible<A: LoadBalancerApi + ?Sized>(
    api: &A,
    name: &str,
    spec: PollSpec,
) -> Result<ObservedState> {
    await_condition(spec, || async move {
        Ok(match api.describe_load_balancer(name).await? {
            Some(state) => PollOutcome::Ready(state),
            None => PollOutcome::Pending(()),
        })
    })
    .await
    .map_err(|e| into_enforcer_error(format!("load balancer {} visible", name), e))
}

/// Wait until a deleted load balancer no longer shows up in describe calls.
pub async fn await_load_balancer_gone<A: LoadBalancerApi + ?Sized>(
    api: &A,
    name: &str,
    spec: PollSpec,
) -> Result<()> {
    await_condition(spec, || async move {
        Ok(match api.describe_load_balancer(name).await? {
            Some(state) => {
                debug!("Load balancer {} still visible after deletion", name);
                PollOutcome::Pending(state.dns_name)
            }
            None => PollOutcome::Ready(()),
        })
    })
    .await
    .map_err(|e| into_enforcer_error(format!("load balancer {} deleted", name), e))
}
