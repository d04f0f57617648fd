//! Per-kind reconcilers
//!
//! Each managed kind implements [`Reconcile`]: the fixed create / read /
//! update / delete / import sequence against a [`ClientSet`]. Reconcilers
//! hold no remote state; the handle for the entity's region is looked up on
//! every call.
//!
//! - [`DomainResource`] and the read-only [`DomainDataSource`]
//! - [`RouteResource`]
//! - [`CredentialResource`]
//! - [`WebhookResource`]

pub mod credential;
pub mod domain;
pub mod route;
pub mod webhook;

pub use credential::{CredentialMutation, CredentialResource};
pub use domain::{DomainDataSource, DomainMutation, DomainResource};
pub use route::{RouteMutation, RouteResource};
pub use webhook::{WebhookMutation, WebhookResource};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::diff::{Plan, UpdateOutcome};
use crate::error::Result;
use crate::model::ResourceKind;
use crate::poll::PollOutcome;
use crate::traits::ClientSet;

/// Lifecycle of one managed kind
///
/// # Trust Level: Trusted (Core Component)
///
/// Every method issues its remote calls through the handle for the entity's
/// region and wraps failures with the operation being performed.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Desired state
    type Spec: Send + Sync;
    /// Observed state
    type State: Send + Sync;
    /// One in-place change
    type Mutation: Send;

    const KIND: ResourceKind;

    /// Create the entity and read it back
    async fn create(&self, clients: &ClientSet, spec: &Self::Spec) -> Result<Self::State>;

    /// Re-read the entity; `Ok(None)` when it no longer exists
    async fn read(&self, clients: &ClientSet, prior: &Self::State) -> Result<Option<Self::State>>;

    /// Diff observed against desired state
    fn plan(&self, current: &Self::State, spec: &Self::Spec) -> Plan<Self::Mutation>;

    /// Fresh read, diff, then one remote call per mutation
    ///
    /// Never replaces: a differing force-new field is reported as
    /// [`UpdateOutcome::ReplacementRequired`].
    async fn update(
        &self,
        clients: &ClientSet,
        prior: &Self::State,
        spec: &Self::Spec,
    ) -> Result<UpdateOutcome<Self::State>>;

    /// Delete the entity and wait until reads no longer see it
    async fn delete(
        &self,
        clients: &ClientSet,
        state: &Self::State,
        deadline: Option<Instant>,
    ) -> Result<PollOutcome>;

    /// Adopt an existing entity from an import identifier
    async fn import(&self, clients: &ClientSet, raw_id: &str) -> Result<Self::State>;
}

/// Treat a 404 from a delete call as success
///
/// A previous pass may have been interrupted after the delete went through.
pub(crate) fn already_deleted_ok(result: Result<()>, key: &str) -> Result<()> {
    match result {
        Err(e) if matches!(e.root(), crate::Error::NotFound(_)) => {
            tracing::debug!("{} was already deleted", key);
            Ok(())
        }
        other => other,
    }
}
