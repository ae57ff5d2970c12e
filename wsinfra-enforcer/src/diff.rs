//! Desired/actual diff engine.
//!
//! Pure functions: nothing here talks to the gateway. The reconciler applies
//! the returned actions in order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{
    HealthCheck, InstanceId, ObservedState, PolicyKind, ResourceSpec, StickinessPolicy, Zone,
};

/// One corrective step towards the desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CorrectiveAction {
    CreateResource,
    RecreateResource,
    EnableZones { zones: BTreeSet<Zone> },
    DisableZones { zones: BTreeSet<Zone> },
    SetHealthCheck { health_check: HealthCheck },
    DeletePolicy { name: String },
    CreatePolicy {
        name: String,
        cookie_expiration: Option<u64>,
    },
    AttachPolicyToListener { name: String },
    RegisterInstances { instance_ids: BTreeSet<InstanceId> },
    DeregisterInstances { instance_ids: BTreeSet<InstanceId> },
}

/// Compute the ordered corrective actions that converge `actual` to `desired`.
///
/// `None` means the load balancer does not exist. A listener mismatch yields
/// `[RecreateResource]` alone. Otherwise actions come in this order: zones,
/// health check, policies, listener policy attachment, instances.
pub fn diff(desired: &ResourceSpec, actual: Option<&ObservedState>) -> Vec<CorrectiveAction> {
    let Some(actual) = actual else {
        return vec![CorrectiveAction::CreateResource];
    };

    let listener = match actual.listeners.as_slice() {
        [only] if only.listener == desired.listener => only,
        _ => return vec![CorrectiveAction::RecreateResource],
    };

    let mut actions = Vec::new();

    // Zones
    let enable: BTreeSet<Zone> = desired
        .availability_zones
        .difference(&actual.availability_zones)
        .cloned()
        .collect();
    if !enable.is_empty() {
        actions.push(CorrectiveAction::EnableZones { zones: enable });
    }
    let disable: BTreeSet<Zone> = actual
        .availability_zones
        .difference(&desired.availability_zones)
        .cloned()
        .collect();
    if !disable.is_empty() {
        actions.push(CorrectiveAction::DisableZones { zones: disable });
    }

    // Health check
    if actual.health_check != desired.health_check {
        actions.push(CorrectiveAction::SetHealthCheck {
            health_check: desired.health_check.clone(),
        });
    }

    // Stickiness policy existence
    let recreate_policy = !actual
        .stickiness_policies
        .iter()
        .any(|p| is_desired_policy(desired, p));
    if recreate_policy {
        for policy in &actual.stickiness_policies {
            actions.push(CorrectiveAction::DeletePolicy {
                name: policy.name.clone(),
            });
        }
        actions.push(CorrectiveAction::CreatePolicy {
            name: desired.stickiness_policy_name.clone(),
            cookie_expiration: desired.stickiness_cookie_expiration,
        });
    }

    // Stickiness policy attachment. Deleting a policy detaches it, so a
    // recreated policy is always attached again.
    if recreate_policy
        || listener.policy_names.as_slice() != [desired.stickiness_policy_name.as_str()]
    {
        actions.push(CorrectiveAction::AttachPolicyToListener {
            name: desired.stickiness_policy_name.clone(),
        });
    }

    // Instances
    let register: BTreeSet<InstanceId> = desired
        .member_instance_ids
        .difference(&actual.instance_ids)
        .cloned()
        .collect();
    if !register.is_empty() {
        actions.push(CorrectiveAction::RegisterInstances {
            instance_ids: register,
        });
    }
    let deregister: BTreeSet<InstanceId> = actual
        .instance_ids
        .difference(&desired.member_instance_ids)
        .cloned()
        .collect();
    if !deregister.is_empty() {
        actions.push(CorrectiveAction::DeregisterInstances {
            instance_ids: deregister,
        });
    }

    actions
}

/// The reconciler only creates load-balancer cookie policies, so only those can match.
fn is_desired_policy(desired: &ResourceSpec, policy: &StickinessPolicy) -> bool {
    policy.kind == PolicyKind::LbCookie
        && policy.name == desired.stickiness_policy_name
        && policy.cookie_expiration == desired.stickiness_cookie_expiration
}
