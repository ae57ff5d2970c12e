//! Test helpers for wsinfra-enforcer integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use wsinfra_enforcer::gateway::InMemoryCloud;
use wsinfra_enforcer::model::{
    HealthCheck, InstanceDescription, InstanceState, ListenerDescription, ObservedState,
    StickinessPolicy, ROLE_TAG,
};
use wsinfra_enforcer::{spec_for_role, EnforcerConfig, LoadBalancerReconciler, ResourceSpec};

pub const APP: &str = "petclinic";
pub const HEALTH_CHECK_URI: &str = "/petclinic/healthcheck.jsp";

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn instance(id: &str, zone: &str, role: &str) -> InstanceDescription {
    InstanceDescription {
        id: id.to_string(),
        state: InstanceState::Running,
        availability_zone: zone.to_string(),
        public_address: Some("203.0.113.10".into()),
        public_dns_name: None,
        tags: BTreeMap::from([(ROLE_TAG.to_string(), role.to_string())]),
    }
}

/// Cloud with two petclinic instances in eu-west-1b and eu-west-1c and one
/// unrelated instance.
pub async fn workshop_cloud() -> Arc<InMemoryCloud> {
    let cloud = Arc::new(InMemoryCloud::new());
    cloud.insert_instance(instance("i-1", "eu-west-1b", APP)).await;
    cloud.insert_instance(instance("i-2", "eu-west-1c", APP)).await;
    cloud.insert_instance(instance("i-9", "eu-west-1a", "nagios")).await;
    cloud
}

/// Desired spec built from the instances tagged with the application role.
pub async fn petclinic_spec(cloud: &InMemoryCloud) -> ResourceSpec {
    spec_for_role(cloud, APP, HEALTH_CHECK_URI).await.unwrap()
}

/// Observed state that matches `spec` exactly.
pub fn converged(spec: &ResourceSpec) -> ObservedState {
    ObservedState {
        name: spec.name.clone(),
        dns_name: Some(format!("{}-1234.eu-west-1.elb.amazonaws.com", spec.name)),
        created_at: Utc::now(),
        availability_zones: spec.availability_zones.clone(),
        listeners: vec![ListenerDescription {
            listener: spec.listener.clone(),
            policy_names: vec![spec.stickiness_policy_name.clone()],
        }],
        health_check: spec.health_check.clone(),
        stickiness_policies: vec![StickinessPolicy::lb_cookie(
            spec.stickiness_policy_name.clone(),
            spec.stickiness_cookie_expiration,
        )],
        other_policies: vec![],
        instance_ids: spec.member_instance_ids.clone(),
    }
}

/// A load balancer fresh from creation: listener only, service default
/// health check, no policies, no members.
pub fn bare(spec: &ResourceSpec) -> ObservedState {
    ObservedState {
        listeners: vec![ListenerDescription {
            listener: spec.listener.clone(),
            policy_names: vec![],
        }],
        health_check: HealthCheck::service_default(spec.listener.internal_port),
        stickiness_policies: vec![],
        instance_ids: BTreeSet::new(),
        ..converged(spec)
    }
}

pub fn reconciler<G>(gateway: Arc<G>) -> LoadBalancerReconciler<G>
where
    G: wsinfra_enforcer::gateway::LoadBalancerApi,
{
    LoadBalancerReconciler::new(gateway, &EnforcerConfig::default())
}
