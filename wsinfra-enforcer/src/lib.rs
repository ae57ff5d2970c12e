//! wsinfra-enforcer: declarative load balancer enforcement for workshop
//! infrastructure.
//!
//! Compares a desired load balancer spec with what the cloud reports, applies
//! the corrective actions in dependency order and waits for eventually
//! consistent resources (instances, databases, HTTP endpoints) to converge.

pub mod config;
pub mod convergence;
pub mod diff;
pub mod error;
pub mod gateway;
pub mod model;
pub mod poll;
pub mod reconciler;

pub use config::EnforcerConfig;
pub use diff::{diff, CorrectiveAction};
pub use error::{EnforcerError, Result};
pub use model::{ObservedState, ResourceSpec};
pub use reconciler::{reconcile_all, spec_for_role, LoadBalancerReconciler, Reconciler};
