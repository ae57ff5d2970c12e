//! In-memory cloud.
//!
//! Implements every gateway trait over a lock-protected snapshot, applying
//! mutating calls the way the real service does. Supports scripted state
//! transitions, eventual-consistency lag on creation and deletion, and fault
//! injection.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{DatabaseApi, HttpProbe, InstanceApi, LoadBalancerApi};
use crate::error::{EnforcerError, Result};
use crate::model::{
    DatabaseDescription, HealthCheck, InstanceDescription, InstanceId, InstanceState,
    ListenerDescription, ObservedState, ResourceSpec, StickinessPolicy, Zone,
};

/// Serializable content of the in-memory cloud.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSnapshot {
    #[serde(default)]
    pub load_balancers: BTreeMap<String, ObservedState>,
    #[serde(default)]
    pub instances: BTreeMap<InstanceId, InstanceDescription>,
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseDescription>,
}

#[derive(Default)]
struct Inner {
    snapshot: CloudSnapshot,
    calls: Vec<String>,
    faults: HashMap<String, VecDeque<EnforcerError>>,
    /// Describes still answering not-found after a creation.
    hidden: HashMap<String, u32>,
    visibility_lag: u32,
    /// Deleted load balancers still answering describes, with the count left.
    lingering: HashMap<String, (ObservedState, u32)>,
    deletion_lag: u32,
    instance_script: HashMap<InstanceId, VecDeque<Option<InstanceDescription>>>,
    database_script: HashMap<String, VecDeque<Option<DatabaseDescription>>>,
    http_responses: HashMap<String, VecDeque<Result<u16>>>,
    created: u64,
}

impl Inner {
    /// Record the call and pop an injected fault, if any.
    fn enter(&mut self, operation: &str) -> Result<()> {
        debug!("in-memory cloud: {}", operation);
        self.calls.push(operation.to_string());
        match self.faults.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn load_balancer_mut(&mut self, name: &str) -> Result<&mut ObservedState> {
        self.snapshot
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| EnforcerError::NotFound(format!("load balancer {}", name)))
    }
}

/// Gateway backed by process memory.
#[derive(Default)]
pub struct InMemoryCloud {
    inner: Mutex<Inner>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CloudSnapshot) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot,
                ..Inner::default()
            }),
        }
    }

    pub async fn snapshot(&self) -> CloudSnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    pub async fn insert_load_balancer(&self, state: ObservedState) {
        let mut inner = self.inner.lock().await;
        inner
            .snapshot
            .load_balancers
            .insert(state.name.clone(), state);
    }

    pub async fn insert_instance(&self, instance: InstanceDescription) {
        let mut inner = self.inner.lock().await;
        inner
            .snapshot
            .instances
            .insert(instance.id.clone(), instance);
    }

    pub async fn insert_database(&self, database: DatabaseDescription) {
        let mut inner = self.inner.lock().await;
        inner
            .snapshot
            .databases
            .insert(database.id.clone(), database);
    }

    /// Successive describes of `id` return these values; the last one sticks.
    pub async fn script_instance(&self, id: &str, states: Vec<Option<InstanceDescription>>) {
        let mut inner = self.inner.lock().await;
        inner
            .instance_script
            .insert(id.to_string(), states.into_iter().collect());
    }

    /// Successive describes of `id` return these values; the last one sticks.
    pub async fn script_database(&self, id: &str, states: Vec<Option<DatabaseDescription>>) {
        let mut inner = self.inner.lock().await;
        inner
            .database_script
            .insert(id.to_string(), states.into_iter().collect());
    }

    /// Successive GETs of `url` return these results; the last one sticks.
    pub async fn script_http(&self, url: &str, responses: Vec<Result<u16>>) {
        let mut inner = self.inner.lock().await;
        inner
            .http_responses
            .insert(url.to_string(), responses.into_iter().collect());
    }

    /// Newly created load balancers stay invisible to `lag` describes.
    pub async fn set_visibility_lag(&self, lag: u32) {
        self.inner.lock().await.visibility_lag = lag;
    }

    /// Deleted load balancers stay visible to `lag` describes.
    pub async fn set_deletion_lag(&self, lag: u32) {
        self.inner.lock().await.deletion_lag = lag;
    }

    /// Fail the next `times` calls of `operation` with `error`.
    pub async fn fail_next(&self, operation: &str, times: usize, error: EnforcerError) {
        let mut inner = self.inner.lock().await;
        let queue = inner.faults.entry(operation.to_string()).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Operation names in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Mutating calls only, in call order.
    pub async fn mutations(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| !c.starts_with("describe_") && c != "http_get")
            .collect()
    }
}

/// Pop the next scripted value. The last one stays in place.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl LoadBalancerApi for InMemoryCloud {
    async fn describe_load_balancer(&self, name: &str) -> Result<Option<ObservedState>> {
        let mut inner = self.inner.lock().await;
        inner.enter("describe_load_balancer")?;
        if let Some((state, remaining)) = inner.lingering.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Some(state.clone()));
            }
        }
        if let Some(remaining) = inner.hidden.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(inner.snapshot.load_balancers.get(name).cloned())
    }

    async fn create_load_balancer(&self, spec: &ResourceSpec) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("create_load_balancer")?;
        inner.lingering.remove(&spec.name);
        if inner.snapshot.load_balancers.contains_key(&spec.name) {
            return Err(EnforcerError::service(
                "create_load_balancer",
                format!("DuplicateLoadBalancerName: {}", spec.name),
            ));
        }
        inner.created += 1;
        let state = ObservedState {
            name: spec.name.clone(),
            dns_name: Some(format!("{}-{}.elb.local", spec.name, inner.created)),
            created_at: Utc::now(),
            availability_zones: spec.availability_zones.clone(),
            listeners: vec![ListenerDescription {
                listener: spec.listener.clone(),
                policy_names: vec![],
            }],
            health_check: HealthCheck::service_default(spec.listener.internal_port),
            stickiness_policies: vec![],
            other_policies: vec![],
            instance_ids: BTreeSet::new(),
        };
        inner
            .snapshot
            .load_balancers
            .insert(spec.name.clone(), state);
        let lag = inner.visibility_lag;
        inner.hidden.insert(spec.name.clone(), lag);
        Ok(())
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("delete_load_balancer")?;
        // Deleting an absent load balancer succeeds, as on the real service.
        if let Some(state) = inner.snapshot.load_balancers.remove(name) {
            let lag = inner.deletion_lag;
            inner.lingering.insert(name.to_string(), (state, lag));
        }
        inner.hidden.remove(name);
        Ok(())
    }

    async fn enable_zones(&self, name: &str, zones: &BTreeSet<Zone>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("enable_zones")?;
        let lb = inner.load_balancer_mut(name)?;
        lb.availability_zones.extend(zones.iter().cloned());
        Ok(())
    }

    async fn disable_zones(&self, name: &str, zones: &BTreeSet<Zone>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("disable_zones")?;
        let lb = inner.load_balancer_mut(name)?;
        lb.availability_zones.retain(|z| !zones.contains(z));
        Ok(())
    }

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("configure_health_check")?;
        let lb = inner.load_balancer_mut(name)?;
        lb.health_check = health_check.clone();
        Ok(())
    }

    async fn create_stickiness_policy(
        &self,
        name: &str,
        policy_name: &str,
        cookie_expiration: Option<u64>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("create_stickiness_policy")?;
        let lb = inner.load_balancer_mut(name)?;
        if lb.stickiness_policies.iter().any(|p| p.name == policy_name)
            || lb.other_policies.iter().any(|p| p == policy_name)
        {
            return Err(EnforcerError::service(
                "create_stickiness_policy",
                format!("DuplicatePolicyName: {}", policy_name),
            ));
        }
        lb.stickiness_policies
            .push(StickinessPolicy::lb_cookie(policy_name, cookie_expiration));
        Ok(())
    }

    async fn delete_policy(&self, name: &str, policy_name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("delete_policy")?;
        let lb = inner.load_balancer_mut(name)?;
        lb.stickiness_policies.retain(|p| p.name != policy_name);
        lb.other_policies.retain(|p| p != policy_name);
        for listener in &mut lb.listeners {
            listener.policy_names.retain(|p| p != policy_name);
        }
        Ok(())
    }

    async fn attach_policies_to_listener(
        &self,
        name: &str,
        port: u16,
        policy_names: &[String],
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("attach_policies_to_listener")?;
        let lb = inner.load_balancer_mut(name)?;
        if let Some(missing) = policy_names.iter().find(|&policy| {
            !lb.stickiness_policies.iter().any(|p| &p.name == policy)
                && !lb.other_policies.contains(policy)
        }) {
            return Err(EnforcerError::service(
                "attach_policies_to_listener",
                format!("PolicyNotFound: {}", missing),
            ));
        }
        let listener = lb
            .listeners
            .iter_mut()
            .find(|l| l.listener.external_port == port)
            .ok_or_else(|| EnforcerError::NotFound(format!("listener on port {}", port)))?;
        listener.policy_names = policy_names.to_vec();
        Ok(())
    }

    async fn register_instances(
        &self,
        name: &str,
        instance_ids: &BTreeSet<InstanceId>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("register_instances")?;
        let unserved = instance_ids.iter().find_map(|id| {
            let instance = inner.snapshot.instances.get(id)?;
            let lb = inner.snapshot.load_balancers.get(name)?;
            (!lb.availability_zones.contains(&instance.availability_zone))
                .then(|| (id.clone(), instance.availability_zone.clone()))
        });
        if let Some((id, zone)) = unserved {
            return Err(EnforcerError::service(
                "register_instances",
                format!("InvalidInstance: {} is in {} which is not enabled", id, zone),
            ));
        }
        let lb = inner.load_balancer_mut(name)?;
        lb.instance_ids.extend(instance_ids.iter().cloned());
        Ok(())
    }

    async fn deregister_instances(
        &self,
        name: &str,
        instance_ids: &BTreeSet<InstanceId>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("deregister_instances")?;
        let lb = inner.load_balancer_mut(name)?;
        lb.instance_ids.retain(|i| !instance_ids.contains(i));
        Ok(())
    }
}

#[async_trait]
impl InstanceApi for InMemoryCloud {
    async fn describe_instance(&self, id: &str) -> Result<Option<InstanceDescription>> {
        let mut inner = self.inner.lock().await;
        inner.enter("describe_instance")?;
        if let Some(scripted) = inner.instance_script.get_mut(id).and_then(next_scripted) {
            match &scripted {
                Some(instance) => inner.snapshot.instances.insert(id.to_string(), instance.clone()),
                None => inner.snapshot.instances.remove(id),
            };
            return Ok(scripted);
        }
        Ok(inner.snapshot.instances.get(id).cloned())
    }

    async fn describe_instances_by_role(&self, role: &str) -> Result<Vec<InstanceDescription>> {
        let mut inner = self.inner.lock().await;
        inner.enter("describe_instances_by_role")?;
        Ok(inner
            .snapshot
            .instances
            .values()
            .filter(|i| i.has_role(role) && !i.state.is_dying())
            .cloned()
            .collect())
    }

    async fn terminate_instance(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.enter("terminate_instance")?;
        inner.instance_script.remove(id);
        let instance = inner
            .snapshot
            .instances
            .get_mut(id)
            .ok_or_else(|| EnforcerError::NotFound(format!("instance {}", id)))?;
        instance.state = InstanceState::Terminated;
        instance.public_address = None;
        instance.public_dns_name = None;
        Ok(())
    }
}

#[async_trait]
impl DatabaseApi for InMemoryCloud {
    async fn describe_database(&self, id: &str) -> Result<Option<DatabaseDescription>> {
        let mut inner = self.inner.lock().await;
        inner.enter("describe_database")?;
        if let Some(scripted) = inner.database_script.get_mut(id).and_then(next_scripted) {
            match &scripted {
                Some(db) => inner.snapshot.databases.insert(id.to_string(), db.clone()),
                None => inner.snapshot.databases.remove(id),
            };
            return Ok(scripted);
        }
        Ok(inner.snapshot.databases.get(id).cloned())
    }
}

#[async_trait]
impl HttpProbe for InMemoryCloud {
    async fn http_get(&self, url: &str) -> Result<u16> {
        let mut inner = self.inner.lock().await;
        inner.enter("http_get")?;
        inner
            .http_responses
            .get_mut(url)
            .and_then(next_scripted)
            .unwrap_or_else(|| {
                Err(EnforcerError::Http {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                })
            })
    }
}
