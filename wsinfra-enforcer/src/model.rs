//! Desired and observed state of the resources the enforcer works on.
//!
//! Desired state (`ResourceSpec`) is built once per reconciliation from caller
//! parameters. Observed state (`ObservedState`, `InstanceDescription`,
//! `DatabaseDescription`) is built fresh from every describe call and replaced,
//! never patched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability zone name, e.g. `eu-west-1b`.
pub type Zone = String;

/// Compute instance identifier, e.g. `i-1a2b3c4d`.
pub type InstanceId = String;

/// Tag used to select the instances served by a load balancer.
pub const ROLE_TAG: &str = "Role";

pub const DEFAULT_EXTERNAL_PORT: u16 = 80;
pub const DEFAULT_INTERNAL_PORT: u16 = 8080;

/// Listener triple. Immutable on the real resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub protocol: String,
    pub external_port: u16,
    pub internal_port: u16,
}

impl Listener {
    pub fn http(external_port: u16, internal_port: u16) -> Self {
        Self {
            protocol: "HTTP".to_string(),
            external_port,
            internal_port,
        }
    }
}

/// Health check configuration. Compared field by field, overwritten as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Full target, e.g. `HTTP:8080/petclinic/healthcheck.jsp`.
    pub target: String,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl HealthCheck {
    /// HTTP health check on `port` with the workshop defaults (30s/2s, 2/2).
    pub fn http(port: u16, uri: &str) -> Self {
        let uri = if uri.starts_with('/') {
            uri.to_string()
        } else {
            format!("/{}", uri)
        };
        Self {
            target: format!("HTTP:{}{}", port, uri),
            interval_secs: 30,
            timeout_secs: 2,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }

    /// What the service configures on a fresh load balancer.
    pub fn service_default(port: u16) -> Self {
        Self {
            target: format!("TCP:{}", port),
            interval_secs: 30,
            timeout_secs: 5,
            healthy_threshold: 10,
            unhealthy_threshold: 2,
        }
    }
}

/// Desired end state of one load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub availability_zones: BTreeSet<Zone>,
    pub listener: Listener,
    pub health_check: HealthCheck,
    pub stickiness_policy_name: String,
    /// Cookie expiration period in seconds, `None` for a session cookie.
    #[serde(default)]
    pub stickiness_cookie_expiration: Option<u64>,
    pub member_instance_ids: BTreeSet<InstanceId>,
}

impl ResourceSpec {
    /// Desired load balancer for an application: one HTTP 80 → 8080 listener,
    /// zones and members taken from the given instances.
    pub fn for_application(
        application_id: &str,
        health_check_uri: &str,
        instances: &[InstanceDescription],
    ) -> Self {
        Self {
            name: application_id.to_string(),
            availability_zones: instances
                .iter()
                .map(|i| i.availability_zone.clone())
                .collect(),
            listener: Listener::http(DEFAULT_EXTERNAL_PORT, DEFAULT_INTERNAL_PORT),
            health_check: HealthCheck::http(DEFAULT_INTERNAL_PORT, health_check_uri),
            stickiness_policy_name: format!("{}-stickiness-policy", application_id),
            stickiness_cookie_expiration: None,
            member_instance_ids: instances.iter().map(|i| i.id.clone()).collect(),
        }
    }
}

/// Kind of a cookie stickiness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Follows a cookie set by the application.
    AppCookie,
    /// Cookie generated by the load balancer.
    LbCookie,
}

/// A stickiness policy held by a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickinessPolicy {
    pub name: String,
    pub kind: PolicyKind,
    /// Cookie expiration period in seconds (load-balancer cookies only).
    #[serde(default)]
    pub cookie_expiration: Option<u64>,
    /// Application cookie name (application cookies only).
    #[serde(default)]
    pub cookie_name: Option<String>,
}

impl StickinessPolicy {
    pub fn lb_cookie(name: impl Into<String>, cookie_expiration: Option<u64>) -> Self {
        Self {
            name: name.into(),
            kind: PolicyKind::LbCookie,
            cookie_expiration,
            cookie_name: None,
        }
    }

    pub fn app_cookie(name: impl Into<String>, cookie_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PolicyKind::AppCookie,
            cookie_expiration: None,
            cookie_name: Some(cookie_name.into()),
        }
    }
}

/// A listener as reported by the service, with the policies wired to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerDescription {
    pub listener: Listener,
    #[serde(default)]
    pub policy_names: Vec<String>,
}

/// Load balancer as currently reported by the remote gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub name: String,
    #[serde(default)]
    pub dns_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub availability_zones: BTreeSet<Zone>,
    pub listeners: Vec<ListenerDescription>,
    pub health_check: HealthCheck,
    #[serde(default)]
    pub stickiness_policies: Vec<StickinessPolicy>,
    /// Policies of other kinds; never touched by the enforcer.
    #[serde(default)]
    pub other_policies: Vec<String>,
    #[serde(default)]
    pub instance_ids: BTreeSet<InstanceId>,
}

/// Lifecycle state of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    /// The instance is dying or dead and will never reach `Running`.
    pub fn is_dying(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }
}

/// Compute instance as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescription {
    pub id: InstanceId,
    pub state: InstanceState,
    pub availability_zone: Zone,
    #[serde(default)]
    pub public_address: Option<String>,
    #[serde(default)]
    pub public_dns_name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl InstanceDescription {
    pub fn has_role(&self, role: &str) -> bool {
        self.tags.get(ROLE_TAG).map(String::as_str) == Some(role)
    }
}

/// Network endpoint of a managed database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// Managed database as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescription {
    pub id: String,
    pub db_name: String,
    /// Service status, e.g. `creating`, `backing-up`, `available`.
    pub status: String,
    /// Only known once the database is available.
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
}

impl DatabaseDescription {
    pub const STATUS_AVAILABLE: &'static str = "available";

    pub fn is_available(&self) -> bool {
        self.status == Self::STATUS_AVAILABLE
    }

    /// JDBC url of a MySQL database, once its endpoint is known.
    pub fn jdbc_url(&self) -> Option<String> {
        self.endpoint
            .as_ref()
            .map(|e| format!("jdbc:mysql://{}:{}/{}", e.address, e.port, self.db_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, zone: &str) -> InstanceDescription {
        InstanceDescription {
            id: id.to_string(),
            state: InstanceState::Running,
            availability_zone: zone.to_string(),
            public_address: None,
            public_dns_name: None,
            tags: BTreeMap::from([(ROLE_TAG.to_string(), "petclinic".to_string())]),
        }
    }

    #[test]
    fn test_health_check_adds_leading_slash() {
        let with = HealthCheck::http(8080, "/petclinic/healthcheck.jsp");
        let without = HealthCheck::http(8080, "petclinic/healthcheck.jsp");
        assert_eq!(with.target, "HTTP:8080/petclinic/healthcheck.jsp");
        assert_eq!(with, without);
    }

    #[test]
    fn test_spec_for_application() {
        let instances = vec![
            instance("i-1", "eu-west-1b"),
            instance("i-2", "eu-west-1c"),
            instance("i-3", "eu-west-1b"),
        ];
        let spec =
            ResourceSpec::for_application("petclinic", "/petclinic/healthcheck.jsp", &instances);

        assert_eq!(spec.name, "petclinic");
        assert_eq!(
            spec.availability_zones,
            BTreeSet::from(["eu-west-1b".to_string(), "eu-west-1c".to_string()])
        );
        assert_eq!(spec.member_instance_ids.len(), 3);
        assert_eq!(spec.listener, Listener::http(80, 8080));
        assert_eq!(spec.stickiness_policy_name, "petclinic-stickiness-policy");
        assert_eq!(spec.stickiness_cookie_expiration, None);
    }

    #[test]
    fn test_jdbc_url_requires_endpoint() {
        let mut db = DatabaseDescription {
            id: "petclinic".into(),
            db_name: "petclinic".into(),
            status: "creating".into(),
            endpoint: None,
        };
        assert_eq!(db.jdbc_url(), None);

        db.endpoint = Some(Endpoint {
            address: "petclinic.abc.eu-west-1.rds.amazonaws.com".into(),
            port: 3306,
        });
        assert_eq!(
            db.jdbc_url().as_deref(),
            Some("jdbc:mysql://petclinic.abc.eu-west-1.rds.amazonaws.com:3306/petclinic")
        );
    }

    #[test]
    fn test_instance_state_serde_names() {
        let json = serde_json::to_string(&InstanceState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting-down\"");
        assert!(InstanceState::Terminated.is_dying());
        assert!(!InstanceState::Pending.is_dying());
    }
}
