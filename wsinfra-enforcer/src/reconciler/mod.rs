//! Reconcilers for different resource types.
//!
//! Each reconciler compares desired state (the caller's spec) with actual
//! state (from the cloud gateway) and takes actions to converge.

pub mod fleet;
pub mod load_balancer;

use async_trait::async_trait;

use crate::error::Result;

pub use fleet::reconcile_all;
pub use load_balancer::{spec_for_role, LoadBalancerReconciler};

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Desired state supplied by the caller.
    type Spec;
    /// Confirmed state returned after convergence.
    type Status;

    /// Reconcile the resource - compare desired vs actual state and take action.
    async fn reconcile(&self, spec: &Self::Spec) -> Result<Self::Status>;

    /// Remove the resource. Removing an absent resource succeeds.
    async fn finalize(&self, name: &str) -> Result<()>;
}
