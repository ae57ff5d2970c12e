//! Retry-once decorator for gateway calls.
//!
//! A call failing with `EnforcerError::TransientService` is issued a second
//! time after a fixed delay. Any other outcome, including the second attempt's
//! error, is returned unchanged.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{DatabaseApi, HttpProbe, InstanceApi, LoadBalancerApi};
use crate::error::Result;
use crate::model::{
    DatabaseDescription, HealthCheck, InstanceDescription, InstanceId, ObservedState,
    ResourceSpec, Zone,
};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Wraps a gateway and retries transient failures once.
pub struct Retrying<G> {
    inner: Arc<G>,
    delay: Duration,
}

impl<G> Retrying<G> {
    pub fn new(inner: Arc<G>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn inner(&self) -> &Arc<G> {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        match f().await {
            Err(e) if e.is_transient() => {
                warn!(
                    "{} failed: {}. Retrying in {}s",
                    operation,
                    e,
                    self.delay.as_secs()
                );
                tokio::time::sleep(self.delay).await;
                f().await
            }
            other => other,
        }
    }
}

#[async_trait]
impl<G: LoadBalancerApi> LoadBalancerApi for Retrying<G> {
    async fn describe_load_balancer(&self, name: &str) -> Result<Option<ObservedState>> {
        self.call("describe_load_balancer", move || {
            self.inner.describe_load_balancer(name)
        })
        .await
    }

    async fn create_load_balancer(&self, spec: &ResourceSpec) -> Result<()> {
        self.call("create_load_balancer", move || {
            self.inner.create_load_balancer(spec)
        })
        .await
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<()> {
        self.call("delete_load_balancer", move || {
            self.inner.delete_load_balancer(name)
        })
        .await
    }

    async fn enable_zones(&self, name: &str, zones: &BTreeSet<Zone>) -> Result<()> {
        self.call("enable_zones", move || self.inner.enable_zones(name, zones))
            .await
    }

    async fn disable_zones(&self, name: &str, zones: &BTreeSet<Zone>) -> Result<()> {
        self.call("disable_zones", move || self.inner.disable_zones(name, zones))
            .await
    }

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> Result<()> {
        self.call("configure_health_check", move || {
            self.inner.configure_health_check(name, health_check)
        })
        .await
    }

    async fn create_stickiness_policy(
        &self,
        name: &str,
        policy_name: &str,
        cookie_expiration: Option<u64>,
    ) -> Result<()> {
        self.call("create_stickiness_policy", move || {
            self.inner
                .create_stickiness_policy(name, policy_name, cookie_expiration)
        })
        .await
    }

    async fn delete_policy(&self, name: &str, policy_name: &str) -> Result<()> {
        self.call("delete_policy", move || {
            self.inner.delete_policy(name, policy_name)
        })
        .await
    }

    async fn attach_policies_to_listener(
        &self,
        name: &str,
        port: u16,
        policy_names: &[String],
    ) -> Result<()> {
        self.call("attach_policies_to_listener", move || {
            self.inner
                .attach_policies_to_listener(name, port, policy_names)
        })
        .await
    }

    async fn register_instances(
        &self,
        name: &str,
        instance_ids: &BTreeSet<InstanceId>,
    ) -> Result<()> {
        self.call("register_instances", move || {
            self.inner.register_instances(name, instance_ids)
        })
        .await
    }

    async fn deregister_instances(
        &self,
        name: &str,
        instance_ids: &BTreeSet<InstanceId>,
    ) -> Result<()> {
        self.call("deregister_instances", move || {
            self.inner.deregister_instances(name, instance_ids)
        })
        .await
    }
}

#[async_trait]
impl<G: InstanceApi> InstanceApi for Retrying<G> {
    async fn describe_instance(&self, id: &str) -> Result<Option<InstanceDescription>> {
        self.call("describe_instance", move || self.inner.describe_instance(id))
            .await
    }

    async fn describe_instances_by_role(&self, role: &str) -> Result<Vec<InstanceDescription>> {
        self.call("describe_instances_by_role", move || {
            self.inner.describe_instances_by_role(role)
        })
        .await
    }

    async fn terminate_instance(&self, id: &str) -> Result<()> {
        self.call("terminate_instance", move || self.inner.terminate_instance(id))
            .await
    }
}

#[async_trait]
impl<G: DatabaseApi> DatabaseApi for Retrying<G> {
    async fn describe_database(&self, id: &str) -> Result<Option<DatabaseDescription>> {
        self.call("describe_database", move || self.inner.describe_database(id))
            .await
    }
}

#[async_trait]
impl<G: HttpProbe> HttpProbe for Retrying<G> {
    async fn http_get(&self, url: &str) -> Result<u16> {
        self.call("http_get", move || self.inner.http_get(url)).await
    }
}
