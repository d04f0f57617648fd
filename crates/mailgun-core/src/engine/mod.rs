//! Reconciliation engine
//!
//! The Reconciler drives a whole manifest through the per-kind reconcilers:
//! - Reading prior state from the StateStore
//! - Refreshing it against Mailgun to detect drift
//! - Creating, updating, replacing and deleting entities
//! - Persisting what it observed after every step
//!
//! ## Architecture
//!
//! ```text
//!                ┌────────────┐
//!                │  Manifest  │
//!                └────────────┘
//!                      │
//!                      ▼
//!               ┌──────────────┐
//!               │  Reconciler  │
//!               └──────────────┘
//!                      │
//!      ┌───────────────┼────────────────┬───────────────┐
//!      ▼               ▼                ▼               ▼
//! ┌──────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────┐
//! │StateStore│  │ Reconcile   │  │  ClientSet  │  │  Events  │
//! │(observed)│  │ (per kind)  │─▶│ (per region)│  │ (notify) │
//! └──────────┘  └─────────────┘  └─────────────┘  └──────────┘
//! ```
//!
//! ## Ordering
//!
//! Creates and updates run domain, route, credential, webhook; deletes run
//! in reverse. A replacement deletes the old entity before creating the new
//! one. Entities are processed one at a time.
//!
//! ## Failures
//!
//! A failure on one address is recorded in the report and emitted as an
//! event; the remaining addresses are still processed.

pub mod manifest;

pub use manifest::{Address, Manifest, ResourceBlock};

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ProviderConfig;
use crate::diff::UpdateOutcome;
use crate::error::{Error, Result};
use crate::model::{PlannedRecords, ResourceConfig, ResourceKind, ResourceState};
use crate::poll::PollOutcome;
use crate::resources::{
    CredentialResource, DomainResource, Reconcile, RouteResource, WebhookResource,
};
use crate::traits::{ClientSet, StateRecord, StateStore};

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// A pass started
    Started {
        operation: String,
        resources: usize,
    },

    /// Entity created
    Created { address: String, id: String },

    /// Entity updated in place
    Updated { address: String, fields: Vec<String> },

    /// Entity deleted and recreated
    Replaced {
        address: String,
        fields: Vec<String>,
        id: String,
    },

    /// Entity deleted and confirmed gone
    Deleted {
        address: String,
        id: String,
        checks: u32,
    },

    /// Remote already matched
    Unchanged { address: String },

    /// An entity in state no longer exists remotely
    DriftDetected { address: String, id: String },

    /// Existing entity adopted into state
    Imported { address: String, id: String },

    /// Operation on one address failed
    Failed { address: String, error: String },

    /// A pass finished
    Finished { operation: String, failed: usize },
}

/// What a plan would do to one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    /// In-place update of the named fields
    Update(Vec<String>),
    /// Delete and recreate because the named fields cannot change in place
    Replace(Vec<String>),
    Delete,
    NoOp,
}

/// One line of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub address: String,
    pub action: PlannedAction,
    /// DNS records a new domain is expected to need
    pub records: Option<PlannedRecords>,
}

/// Pseudo-address under which a failure to persist state is reported
pub const STATE_ADDRESS: &str = "<state>";

/// Outcome of a pass, by address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub replaced: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    /// Dropped from state because the remote entity is gone
    pub vanished: Vec<String>,
    /// Address and error message
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Applied {
    Created(String),
    Updated(Vec<String>),
    Replaced(Vec<String>, String),
    Unchanged,
}

/// Drives manifests against Mailgun
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Call [`Reconciler::plan()`], [`Reconciler::apply()`],
///    [`Reconciler::refresh()`], [`Reconciler::destroy()`] or
///    [`Reconciler::import()`]
/// 3. Drain the event receiver as you like; events are dropped when it fills
pub struct Reconciler {
    clients: ClientSet,
    state_store: Box<dyn StateStore>,

    domains: DomainResource,
    routes: RouteResource,
    credentials: CredentialResource,
    webhooks: WebhookResource,

    /// Overall deadline for one operation on one entity
    operation_timeout: Option<Duration>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver)
    pub fn new(
        clients: ClientSet,
        state_store: Box<dyn StateStore>,
        config: &ProviderConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let reconciler = Self {
            clients,
            state_store,
            domains: DomainResource::from_config(&config.poll),
            routes: RouteResource::from_config(&config.poll),
            credentials: CredentialResource::from_config(&config.poll),
            webhooks: WebhookResource::from_config(&config.poll),
            operation_timeout: config.engine.operation_timeout(),
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    pub fn state_store(&self) -> &dyn StateStore {
        self.state_store.as_ref()
    }

    /// Compute what [`Reconciler::apply()`] would do, without changing anything
    pub async fn plan(&self, manifest: &Manifest) -> Result<Vec<PlannedChange>> {
        let mut changes = Vec::new();

        for block in manifest.in_create_order() {
            let address = block.address().to_string();
            let current = match self.state_store.get(&address).await? {
                Some(record) => self.read_entity(&record.state).await?,
                None => None,
            };

            let action = match &current {
                None => PlannedAction::Create,
                Some(current) => self.plan_entity(current, &block.config)?,
            };

            let records = match (&action, &block.config) {
                (PlannedAction::Create | PlannedAction::Replace(_), ResourceConfig::Domain(spec)) => {
                    Some(PlannedRecords::for_domain(&spec.name))
                }
                _ => None,
            };

            changes.push(PlannedChange {
                address,
                action,
                records,
            });
        }

        for (address, _) in self.orphans(manifest).await? {
            changes.push(PlannedChange {
                address,
                action: PlannedAction::Delete,
                records: None,
            });
        }

        Ok(changes)
    }

    /// Make Mailgun match the manifest
    pub async fn apply(&self, manifest: &Manifest) -> Result<ReconcileReport> {
        self.emit_event(ReconcileEvent::Started {
            operation: "apply".to_string(),
            resources: manifest.len(),
        });

        let mut report = ReconcileReport::default();

        for block in manifest.in_create_order() {
            let address = block.address().to_string();
            match self.apply_block(&address, &block.config).await {
                Ok(Applied::Created(id)) => {
                    info!("Created {} ({})", address, id);
                    self.emit_event(ReconcileEvent::Created {
                        address: address.clone(),
                        id,
                    });
                    report.created.push(address);
                }
                Ok(Applied::Updated(fields)) => {
                    info!("Updated {}: {}", address, fields.join(", "));
                    self.emit_event(ReconcileEvent::Updated {
                        address: address.clone(),
                        fields,
                    });
                    report.updated.push(address);
                }
                Ok(Applied::Replaced(fields, id)) => {
                    info!("Replaced {} ({}) due to {}", address, id, fields.join(", "));
                    self.emit_event(ReconcileEvent::Replaced {
                        address: address.clone(),
                        fields,
                        id,
                    });
                    report.replaced.push(address);
                }
                Ok(Applied::Unchanged) => {
                    debug!("{} is up to date", address);
                    self.emit_event(ReconcileEvent::Unchanged {
                        address: address.clone(),
                    });
                    report.unchanged.push(address);
                }
                Err(e) => self.record_failure(&mut report, address, e),
            }
        }

        for (address, record) in self.orphans(manifest).await? {
            match self.delete_address(&address, &record).await {
                Ok(_) => report.deleted.push(address),
                Err(e) => self.record_failure(&mut report, address, e),
            }
        }

        self.finish("apply", &mut report).await;
        Ok(report)
    }

    /// Re-read every entity in state; drop the ones that are gone
    pub async fn refresh(&self) -> Result<ReconcileReport> {
        let records = self.records_in_create_order().await?;
        self.emit_event(ReconcileEvent::Started {
            operation: "refresh".to_string(),
            resources: records.len(),
        });

        let mut report = ReconcileReport::default();

        for (address, record) in records {
            match self.read_entity(&record.state).await {
                Ok(Some(state)) => {
                    let refreshed = StateRecord::new(state);
                    match self.state_store.put(&address, &refreshed).await {
                        Ok(()) => report.unchanged.push(address),
                        Err(e) => self.record_failure(&mut report, address, e),
                    }
                }
                Ok(None) => {
                    warn!("{} ({}) no longer exists, dropping it from state", address, record.id);
                    self.emit_event(ReconcileEvent::DriftDetected {
                        address: address.clone(),
                        id: record.id.clone(),
                    });
                    match self.state_store.delete(&address).await {
                        Ok(()) => report.vanished.push(address),
                        Err(e) => self.record_failure(&mut report, address, e),
                    }
                }
                Err(e) => self.record_failure(&mut report, address, e),
            }
        }

        self.finish("refresh", &mut report).await;
        Ok(report)
    }

    /// Delete every entity in state
    pub async fn destroy(&self) -> Result<ReconcileReport> {
        let mut records = self.records_in_create_order().await?;
        records.reverse();

        self.emit_event(ReconcileEvent::Started {
            operation: "destroy".to_string(),
            resources: records.len(),
        });

        let mut report = ReconcileReport::default();
        for (address, record) in records {
            match self.delete_address(&address, &record).await {
                Ok(_) => report.deleted.push(address),
                Err(e) => self.record_failure(&mut report, address, e),
            }
        }

        self.finish("destroy", &mut report).await;
        Ok(report)
    }

    /// Adopt an existing entity under `address`
    ///
    /// `raw_id` is the import identifier of the address's kind.
    pub async fn import(&self, address: &str, raw_id: &str) -> Result<StateRecord> {
        let parsed: Address = address.parse()?;
        let address = parsed.to_string();

        if self.state_store.get(&address).await?.is_some() {
            return Err(Error::validation(
                "address",
                format!("{} is already managed", address),
            ));
        }

        let state = self.import_entity(parsed.kind, raw_id).await?;
        let record = StateRecord::new(state);
        self.state_store.put(&address, &record).await?;
        self.state_store.flush().await?;

        info!("Imported {} as {}", record.id, address);
        self.emit_event(ReconcileEvent::Imported {
            address,
            id: record.id.clone(),
        });

        Ok(record)
    }

    async fn apply_block(&self, address: &str, config: &ResourceConfig) -> Result<Applied> {
        let Some(record) = self.state_store.get(address).await? else {
            let state = self.create_entity(config).await?;
            return self.store(address, state).await.map(Applied::Created);
        };

        let Some(current) = self.read_entity(&record.state).await? else {
            warn!("{} ({}) was deleted outside of this tool, recreating", address, record.id);
            self.emit_event(ReconcileEvent::DriftDetected {
                address: address.to_string(),
                id: record.id.clone(),
            });
            self.state_store.delete(address).await?;
            let state = self.create_entity(config).await?;
            return self.store(address, state).await.map(Applied::Created);
        };

        match self.update_entity(&current, config).await? {
            UpdateOutcome::Unchanged(state) => {
                self.store(address, state).await?;
                Ok(Applied::Unchanged)
            }
            UpdateOutcome::Updated(state) => {
                let fields = match self.plan_entity(&current, config)? {
                    PlannedAction::Update(fields) => fields,
                    _ => Vec::new(),
                };
                self.store(address, state).await?;
                Ok(Applied::Updated(fields))
            }
            UpdateOutcome::ReplacementRequired(fields) => {
                let fields: Vec<String> = fields.into_iter().map(String::from).collect();
                info!("{} must be replaced: {}", address, fields.join(", "));

                self.delete_entity(&current).await?;
                self.state_store.delete(address).await?;

                let state = self.create_entity(config).await?;
                let id = self.store(address, state).await?;
                Ok(Applied::Replaced(fields, id))
            }
        }
    }

    async fn delete_address(&self, address: &str, record: &StateRecord) -> Result<PollOutcome> {
        let outcome = self.delete_entity(&record.state).await?;
        self.state_store.delete(address).await?;

        info!("Deleted {} ({}) after {} check(s)", address, record.id, outcome.checks);
        self.emit_event(ReconcileEvent::Deleted {
            address: address.to_string(),
            id: record.id.clone(),
            checks: outcome.checks,
        });
        Ok(outcome)
    }

    async fn store(&self, address: &str, state: ResourceState) -> Result<String> {
        let record = StateRecord::new(state);
        self.state_store.put(address, &record).await?;
        Ok(record.id)
    }

    /// State entries whose address is not in the manifest, in delete order
    async fn orphans(&self, manifest: &Manifest) -> Result<Vec<(String, StateRecord)>> {
        let mut orphans: Vec<(String, StateRecord)> = self
            .records_in_create_order()
            .await?
            .into_iter()
            .filter(|(address, _)| {
                !manifest
                    .blocks()
                    .iter()
                    .any(|b| &b.address().to_string() == address)
            })
            .collect();
        orphans.reverse();
        Ok(orphans)
    }

    async fn records_in_create_order(&self) -> Result<Vec<(String, StateRecord)>> {
        let mut records = Vec::new();
        for address in self.state_store.list().await? {
            if let Some(record) = self.state_store.get(&address).await? {
                records.push((address, record));
            }
        }
        records.sort_by(|(a, ra), (b, rb)| {
            (ra.kind().create_rank(), a).cmp(&(rb.kind().create_rank(), b))
        });
        Ok(records)
    }

    /// Flush state and close the pass
    ///
    /// A failed flush is recorded under [`STATE_ADDRESS`] rather than
    /// returned, so the report of work already done survives.
    async fn finish(&self, operation: &str, report: &mut ReconcileReport) {
        if let Err(e) = self.state_store.flush().await {
            self.record_failure(report, STATE_ADDRESS.to_string(), e);
        }
        self.emit_event(ReconcileEvent::Finished {
            operation: operation.to_string(),
            failed: report.failed.len(),
        });
        info!("{} finished, {} failure(s)", operation, report.failed.len());
    }

    fn record_failure(&self, report: &mut ReconcileReport, address: String, e: Error) {
        error!("{} failed: {}", address, e);
        let message = e.to_string();
        self.emit_event(ReconcileEvent::Failed {
            address: address.clone(),
            error: message.clone(),
        });
        report.failed.push((address, message));
    }

    fn deadline(&self) -> Option<Instant> {
        self.operation_timeout.map(|timeout| Instant::now() + timeout)
    }

    async fn create_entity(&self, config: &ResourceConfig) -> Result<ResourceState> {
        let clients = &self.clients;
        let state: ResourceState = match config {
            ResourceConfig::Domain(spec) => self.domains.create(clients, spec).await?.into(),
            ResourceConfig::Route(spec) => self.routes.create(clients, spec).await?.into(),
            ResourceConfig::Credential(spec) => {
                self.credentials.create(clients, spec).await?.into()
            }
            ResourceConfig::Webhook(spec) => self.webhooks.create(clients, spec).await?.into(),
        };
        Ok(state)
    }

    async fn read_entity(&self, state: &ResourceState) -> Result<Option<ResourceState>> {
        let clients = &self.clients;
        let current: Option<ResourceState> = match state {
            ResourceState::Domain(s) => self.domains.read(clients, s).await?.map(Into::into),
            ResourceState::Route(s) => self.routes.read(clients, s).await?.map(Into::into),
            ResourceState::Credential(s) => {
                self.credentials.read(clients, s).await?.map(Into::into)
            }
            ResourceState::Webhook(s) => self.webhooks.read(clients, s).await?.map(Into::into),
        };
        Ok(current)
    }

    fn plan_entity(&self, current: &ResourceState, config: &ResourceConfig) -> Result<PlannedAction> {
        let (replace, changed) = match (current, config) {
            (ResourceState::Domain(s), ResourceConfig::Domain(c)) => {
                let plan = self.domains.plan(s, c);
                (plan.replace, plan.changed)
            }
            (ResourceState::Route(s), ResourceConfig::Route(c)) => {
                let plan = self.routes.plan(s, c);
                (plan.replace, plan.changed)
            }
            (ResourceState::Credential(s), ResourceConfig::Credential(c)) => {
                let plan = self.credentials.plan(s, c);
                (plan.replace, plan.changed)
            }
            (ResourceState::Webhook(s), ResourceConfig::Webhook(c)) => {
                let plan = self.webhooks.plan(s, c);
                (plan.replace, plan.changed)
            }
            (state, config) => return Err(kind_mismatch(state.kind(), config.kind())),
        };

        let action = if !replace.is_empty() {
            PlannedAction::Replace(replace.into_iter().map(String::from).collect())
        } else if !changed.is_empty() {
            PlannedAction::Update(changed.into_iter().map(String::from).collect())
        } else {
            PlannedAction::NoOp
        };
        Ok(action)
    }

    async fn update_entity(
        &self,
        current: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<UpdateOutcome<ResourceState>> {
        let clients = &self.clients;
        let outcome: UpdateOutcome<ResourceState> = match (current, config) {
            (ResourceState::Domain(s), ResourceConfig::Domain(c)) => {
                self.domains.update(clients, s, c).await?.map(Into::into)
            }
            (ResourceState::Route(s), ResourceConfig::Route(c)) => {
                self.routes.update(clients, s, c).await?.map(Into::into)
            }
            (ResourceState::Credential(s), ResourceConfig::Credential(c)) => {
                self.credentials.update(clients, s, c).await?.map(Into::into)
            }
            (ResourceState::Webhook(s), ResourceConfig::Webhook(c)) => {
                self.webhooks.update(clients, s, c).await?.map(Into::into)
            }
            (state, config) => return Err(kind_mismatch(state.kind(), config.kind())),
        };
        Ok(outcome)
    }

    async fn delete_entity(&self, state: &ResourceState) -> Result<PollOutcome> {
        let clients = &self.clients;
        let deadline = self.deadline();
        match state {
            ResourceState::Domain(s) => self.domains.delete(clients, s, deadline).await,
            ResourceState::Route(s) => self.routes.delete(clients, s, deadline).await,
            ResourceState::Credential(s) => self.credentials.delete(clients, s, deadline).await,
            ResourceState::Webhook(s) => self.webhooks.delete(clients, s, deadline).await,
        }
    }

    async fn import_entity(&self, kind: ResourceKind, raw_id: &str) -> Result<ResourceState> {
        let clients = &self.clients;
        let state: ResourceState = match kind {
            ResourceKind::Domain => self.domains.import(clients, raw_id).await?.into(),
            ResourceKind::Route => self.routes.import(clients, raw_id).await?.into(),
            ResourceKind::Credential => self.credentials.import(clients, raw_id).await?.into(),
            ResourceKind::Webhook => self.webhooks.import(clients, raw_id).await?.into(),
        };
        Ok(state)
    }

    /// Emit an event, logging a warning if the channel is full
    fn emit_event(&self, event: ReconcileEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn kind_mismatch(state: ResourceKind, config: ResourceKind) -> Error {
    Error::state_store(format!(
        "state holds a {} where the manifest declares a {}",
        state, config
    ))
}
