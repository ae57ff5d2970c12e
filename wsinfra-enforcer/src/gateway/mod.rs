//! Remote state gateway.
//!
//! Narrow capability traits over the cloud control plane. The enforcer only
//! consumes them; implementations are injected at construction:
//! - `LoadBalancerApi`: describe and mutate load balancers
//! - `InstanceApi`: describe and terminate compute instances
//! - `DatabaseApi`: describe managed databases
//! - `HttpProbe`: plain HTTP GET for reachability checks

pub mod http;
pub mod memory;
pub mod retry;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    DatabaseDescription, HealthCheck, InstanceDescription, InstanceId, ObservedState,
    ResourceSpec, Zone,
};

pub use http::ReqwestProbe;
pub use memory::{CloudSnapshot, InMemoryCloud};
pub use retry::Retrying;

/// Load balancer operations.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// `Ok(None)` when the load balancer does not exist.
    async fn describe_load_balancer(&self, name: &str) -> Result<Option<ObservedState>>;

    /// Create with the spec's name, zones and listener.
    async fn create_load_balancer(&self, spec: &ResourceSpec) -> Result<()>;

    async fn delete_load_balancer(&self, name: &str) -> Result<()>;

    async fn enable_zones(&self, name: &str, zones: &BTreeSet<Zone>) -> Result<()>;

    async fn disable_zones(&self, name: &str, zones: &BTreeSet<Zone>) -> Result<()>;

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> Result<()>;

    /// Create a load-balancer cookie stickiness policy.
    async fn create_stickiness_policy(
        &self,
        name: &str,
        policy_name: &str,
        cookie_expiration: Option<u64>,
    ) -> Result<()>;

    async fn delete_policy(&self, name: &str, policy_name: &str) -> Result<()>;

    /// Replace the policies wired to the listener on `port`.
    async fn attach_policies_to_listener(
        &self,
        name: &str,
        port: u16,
        policy_names: &[String],
    ) -> Result<()>;

    async fn register_instances(&self, name: &str, instance_ids: &BTreeSet<InstanceId>)
        -> Result<()>;

    async fn deregister_instances(
        &self,
        name: &str,
        instance_ids: &BTreeSet<InstanceId>,
    ) -> Result<()>;
}

/// Compute instance queries.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    /// `Ok(None)` when the instance is not (or not yet) visible.
    async fn describe_instance(&self, id: &str) -> Result<Option<InstanceDescription>>;

    /// Instances carrying the given `Role` tag.
    async fn describe_instances_by_role(&self, role: &str) -> Result<Vec<InstanceDescription>>;

    async fn terminate_instance(&self, id: &str) -> Result<()>;
}

/// Managed database queries.
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    /// `Ok(None)` when the database does not exist.
    async fn describe_database(&self, id: &str) -> Result<Option<DatabaseDescription>>;
}

/// HTTP reachability.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Status code of a GET on `url`; transport failures are `EnforcerError::Http`.
    async fn http_get(&self, url: &str) -> Result<u16>;
}
