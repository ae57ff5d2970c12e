//! Load balancer reconciler - converges one load balancer onto its spec.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::Reconciler;
use crate::config::EnforcerConfig;
use crate::convergence::{await_load_balancer_gone, await_load_balancer_visible};
use crate::diff::{diff, CorrectiveAction};
use crate::error::{EnforcerError, Result};
use crate::gateway::{InstanceApi, LoadBalancerApi};
use crate::model::{ObservedState, ResourceSpec};
use crate::poll::PollSpec;

/// Create, optional recreate and the patch pass that follows.
const MAX_PASSES: usize = 3;

/// Desired load balancer for the instances tagged with `Role=application_id`.
pub async fn spec_for_role<A: InstanceApi + ?Sized>(
    api: &A,
    application_id: &str,
    health_check_uri: &str,
) -> Result<ResourceSpec> {
    let instances = api.describe_instances_by_role(application_id).await?;
    debug!(
        "Found {} instances with role {}",
        instances.len(),
        application_id
    );
    Ok(ResourceSpec::for_application(
        application_id,
        health_check_uri,
        &instances,
    ))
}

/// Reconciler driving a [`LoadBalancerApi`].
pub struct LoadBalancerReconciler<G: ?Sized> {
    gateway: Arc<G>,
    visible: PollSpec,
}

impl<G: LoadBalancerApi + ?Sized> LoadBalancerReconciler<G> {
    pub fn new(gateway: Arc<G>, config: &EnforcerConfig) -> Self {
        Self {
            gateway,
            visible: config.load_balancer_visible,
        }
    }

    async fn describe(&self, name: &str) -> Result<Option<ObservedState>> {
        let observed = self.gateway.describe_load_balancer(name).await?;
        if observed.is_none() {
            debug!("Load balancer {} not found", name);
        }
        Ok(observed)
    }

    async fn apply(&self, spec: &ResourceSpec, action: &CorrectiveAction) -> Result<()> {
        let name = spec.name.as_str();
        match action {
            CorrectiveAction::CreateResource | CorrectiveAction::RecreateResource => {
                Err(EnforcerError::InvariantViolation(format!(
                    "{:?} mixed into a patch plan for {}",
                    action, name
                )))
            }
            CorrectiveAction::EnableZones { zones } => {
                info!("Enable zones {:?} on {}", zones, name);
                self.gateway.enable_zones(name, zones).await
            }
            CorrectiveAction::DisableZones { zones } => {
                info!("Disable zones {:?} on {}", zones, name);
                self.gateway.disable_zones(name, zones).await
            }
            CorrectiveAction::SetHealthCheck { health_check } => {
                info!("Configure health check {} on {}", health_check.target, name);
                self.gateway.configure_health_check(name, health_check).await
            }
            CorrectiveAction::DeletePolicy { name: policy } => {
                info!("Delete policy {} of {}", policy, name);
                self.gateway.delete_policy(name, policy).await
            }
            CorrectiveAction::CreatePolicy {
                name: policy,
                cookie_expiration,
            } => {
                info!("Create stickiness policy {} on {}", policy, name);
                self.gateway
                    .create_stickiness_policy(name, policy, *cookie_expiration)
                    .await
            }
            CorrectiveAction::AttachPolicyToListener { name: policy } => {
                info!(
                    "Attach policy {} to listener {} of {}",
                    policy, spec.listener.external_port, name
                );
                self.gateway
                    .attach_policies_to_listener(
                        name,
                        spec.listener.external_port,
                        std::slice::from_ref(policy),
                    )
                    .await
            }
            CorrectiveAction::RegisterInstances { instance_ids } => {
                info!("Register instances {:?} with {}", instance_ids, name);
                self.gateway.register_instances(name, instance_ids).await
            }
            CorrectiveAction::DeregisterInstances { instance_ids } => {
                info!("Deregister instances {:?} from {}", instance_ids, name);
                self.gateway.deregister_instances(name, instance_ids).await
            }
        }
    }
}

#[async_trait]
impl<G: LoadBalancerApi + ?Sized> Reconciler for LoadBalancerReconciler<G> {
    type Spec = ResourceSpec;
    type Status = ObservedState;

    async fn reconcile(&self, spec: &Self::Spec) -> Result<Self::Status> {
        info!("Reconciling load balancer {}", spec.name);

        let mut observed = self.describe(&spec.name).await?;
        let mut recreated = false;

        for pass in 1..=MAX_PASSES {
            let actions = diff(spec, observed.as_ref());
            debug!("Pass {} for {}: {} actions", pass, spec.name, actions.len());

            match actions.as_slice() {
                [] => {
                    // diff never returns an empty plan for an absent resource
                    return observed.ok_or_else(|| {
                        EnforcerError::InvariantViolation(format!(
                            "empty plan for absent load balancer {}",
                            spec.name
                        ))
                    });
                }
                [CorrectiveAction::CreateResource] => {
                    info!("Creating load balancer {}", spec.name);
                    self.gateway.create_load_balancer(spec).await?;
                    let state =
                        await_load_balancer_visible(&*self.gateway, &spec.name, self.visible)
                            .await?;
                    observed = Some(state);
                }
                [CorrectiveAction::RecreateResource] => {
                    if recreated {
                        return Err(EnforcerError::InvariantViolation(format!(
                            "listener of {} still mismatches after recreation",
                            spec.name
                        )));
                    }
                    recreated = true;
                    info!("Listener of {} mismatches, recreating", spec.name);
                    self.gateway.delete_load_balancer(&spec.name).await?;
                    await_load_balancer_gone(&*self.gateway, &spec.name, self.visible).await?;
                    observed = None;
                }
                _ => {
                    for action in &actions {
                        self.apply(spec, action).await?;
                    }
                    let confirmed = self.describe(&spec.name).await?.ok_or_else(|| {
                        EnforcerError::InvariantViolation(format!(
                            "load balancer {} vanished after update",
                            spec.name
                        ))
                    })?;
                    info!(
                        "Load balancer {} reconciled with {} actions",
                        spec.name,
                        actions.len()
                    );
                    return Ok(confirmed);
                }
            }
        }

        Err(EnforcerError::InvariantViolation(format!(
            "load balancer {} did not converge in {} passes",
            spec.name, MAX_PASSES
        )))
    }

    async fn finalize(&self, name: &str) -> Result<()> {
        if self.describe(name).await?.is_none() {
            debug!("Load balancer {} already gone", name);
            return Ok(());
        }
        info!("Deleting load balancer {}", name);
        self.gateway.delete_load_balancer(name).await
    }
}
