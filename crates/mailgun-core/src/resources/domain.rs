// # Domain Reconciler
//
// Create sequence: create domain, set the DKIM selector (if any), enable open
// tracking (if requested), read back. Reads combine the domain endpoint with
// the tracking endpoint.
//
// The SMTP password and the DKIM creation options are write-only: Mailgun
// never returns them, so observed state carries the last applied values.

use async_trait::async_trait;
use std::fmt;
use tokio::time::Instant;

use super::{Reconcile, already_deleted_ok};
use crate::config::PollConfig;
use crate::diff::{Differ, Plan, UpdateOutcome};
use crate::error::{Error, Result, ResultExt};
use crate::model::{DnsRecord, DomainSpec, DomainState, Region, ResourceKind, SpamAction};
use crate::poll::{PollOutcome, PollPolicy, Presence, confirm_absent};
use crate::traits::{ApiDnsRecord, ClientSet, CreateDomainOptions, DomainDetails, MailgunApi};

/// In-place change to a domain
#[derive(Clone, PartialEq, Eq)]
pub enum DomainMutation {
    /// Change the password of the domain's SMTP login
    SmtpPassword(String),
    OpenTracking(bool),
}

impl fmt::Debug for DomainMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainMutation::SmtpPassword(_) => f.write_str("SmtpPassword(<REDACTED>)"),
            DomainMutation::OpenTracking(active) => {
                f.debug_tuple("OpenTracking").field(active).finish()
            }
        }
    }
}

/// Values Mailgun accepts but never returns
#[derive(Debug, Clone, Default)]
struct WriteOnly {
    smtp_password: Option<String>,
    dkim_selector: Option<String>,
    force_dkim_authority: bool,
    dkim_key_size: Option<u32>,
}

impl WriteOnly {
    fn from_spec(spec: &DomainSpec) -> Self {
        Self {
            smtp_password: spec.smtp_password.clone(),
            dkim_selector: spec.dkim_selector.clone(),
            force_dkim_authority: spec.force_dkim_authority,
            dkim_key_size: spec.dkim_key_size,
        }
    }

    fn from_state(state: &DomainState) -> Self {
        Self {
            smtp_password: state.smtp_password.clone(),
            dkim_selector: state.dkim_selector.clone(),
            force_dkim_authority: state.force_dkim_authority,
            dkim_key_size: state.dkim_key_size,
        }
    }
}

/// Reconciler for `mailgun_domain`
#[derive(Debug, Clone)]
pub struct DomainResource {
    poll: PollPolicy,
}

impl DomainResource {
    pub fn new(poll: PollPolicy) -> Self {
        Self { poll }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.policy_for(ResourceKind::Domain))
    }
}

#[async_trait]
impl Reconcile for DomainResource {
    type Spec = DomainSpec;
    type State = DomainState;
    type Mutation = DomainMutation;

    const KIND: ResourceKind = ResourceKind::Domain;

    async fn create(&self, clients: &ClientSet, spec: &DomainSpec) -> Result<DomainState> {
        spec.validate()?;
        let api = clients.for_region(spec.region)?;
        let name = spec.name.as_str();

        tracing::info!("Creating domain {} in region {}", name, spec.region);

        let options = CreateDomainOptions {
            name: spec.name.clone(),
            spam_action: spec.spam_action,
            smtp_password: spec.smtp_password.clone(),
            wildcard: spec.wildcard,
            force_dkim_authority: spec.force_dkim_authority,
            dkim_key_size: spec.dkim_key_size,
        };
        api.create_domain(&options)
            .await
            .context(|| format!("creating domain {}", name))?;

        if let Some(selector) = &spec.dkim_selector {
            api.update_dkim_selector(name, selector)
                .await
                .context(|| format!("setting DKIM selector of domain {}", name))?;
        }

        if spec.open_tracking {
            api.update_open_tracking(name, true)
                .await
                .context(|| format!("enabling open tracking for domain {}", name))?;
        }

        observe(api, name, WriteOnly::from_spec(spec))
            .await
            .context(|| format!("reading back domain {}", name))?
            .ok_or_else(|| Error::not_found(format!("domain {} vanished after create", name)))
    }

    async fn read(&self, clients: &ClientSet, prior: &DomainState) -> Result<Option<DomainState>> {
        let api = clients.for_region(prior.region)?;
        observe(api, &prior.name, WriteOnly::from_state(prior))
            .await
            .context(|| format!("reading domain {}", prior.name))
    }

    fn plan(&self, current: &DomainState, spec: &DomainSpec) -> Plan<DomainMutation> {
        let mut differ = Differ::new()
            .force_new("name", current.name.as_str(), spec.name.as_str())
            .force_new("region", &current.region, &spec.region)
            .force_new("spam_action", &current.spam_action, &spec.spam_action)
            .force_new("wildcard", &current.wildcard, &spec.wildcard)
            .force_new("dkim_selector", &current.dkim_selector, &spec.dkim_selector)
            .force_new(
                "force_dkim_authority",
                &current.force_dkim_authority,
                &spec.force_dkim_authority,
            )
            .force_new("dkim_key_size", &current.dkim_key_size, &spec.dkim_key_size);

        // Omitting the password leaves the remote one alone
        if let Some(desired) = &spec.smtp_password {
            differ = differ.mutable(
                "smtp_password",
                &current.smtp_password.as_deref(),
                &Some(desired.as_str()),
                |_| DomainMutation::SmtpPassword(desired.clone()),
            );
        }

        differ
            .mutable(
                "open_tracking",
                &current.open_tracking,
                &spec.open_tracking,
                |active| DomainMutation::OpenTracking(*active),
            )
            .finish()
    }

    async fn update(
        &self,
        clients: &ClientSet,
        prior: &DomainState,
        spec: &DomainSpec,
    ) -> Result<UpdateOutcome<DomainState>> {
        spec.validate()?;
        let api = clients.for_region(prior.region)?;
        let name = prior.name.as_str();

        let current = observe(api, name, WriteOnly::from_state(prior))
            .await
            .context(|| format!("reading domain {}", name))?
            .ok_or_else(|| Error::not_found(format!("domain {}", name)))?;

        let plan = self.plan(&current, spec);
        if plan.requires_replacement() {
            return Ok(UpdateOutcome::ReplacementRequired(plan.replace));
        }
        if plan.is_noop() {
            return Ok(UpdateOutcome::Unchanged(current));
        }

        for mutation in &plan.mutations {
            match mutation {
                DomainMutation::SmtpPassword(password) => {
                    tracing::info!("Changing SMTP password of {}", current.smtp_login);
                    api.change_credential_password(name, &current.smtp_login, password)
                        .await
                        .context(|| format!("changing SMTP password of domain {}", name))?;
                }
                DomainMutation::OpenTracking(active) => {
                    tracing::info!("Setting open tracking of {} to {}", name, active);
                    api.update_open_tracking(name, *active)
                        .await
                        .context(|| format!("updating open tracking of domain {}", name))?;
                }
            }
        }

        let mut write_only = WriteOnly::from_state(&current);
        if spec.smtp_password.is_some() {
            write_only.smtp_password = spec.smtp_password.clone();
        }

        observe(api, name, write_only)
            .await
            .context(|| format!("reading back domain {}", name))?
            .map(UpdateOutcome::Updated)
            .ok_or_else(|| Error::not_found(format!("domain {} vanished during update", name)))
    }

    async fn delete(
        &self,
        clients: &ClientSet,
        state: &DomainState,
        deadline: Option<Instant>,
    ) -> Result<PollOutcome> {
        let api = clients.for_region(state.region)?;
        let name = state.name.as_str();

        tracing::info!("Deleting domain {}", name);
        already_deleted_ok(api.delete_domain(name).await, name)
            .context(|| format!("deleting domain {}", name))?;

        confirm_absent(name, &self.poll, deadline, move || async move {
            api.get_domain(name).await.map(|found| Presence::of(&found))
        })
        .await
        .context(|| format!("waiting for domain {} to disappear", name))
    }

    async fn import(&self, clients: &ClientSet, raw_id: &str) -> Result<DomainState> {
        let (region, name) = DomainSpec::key_from_import(raw_id)?;
        DomainDataSource.read(clients, &name, region).await
    }
}

/// Read-only lookup of an existing domain
///
/// Unlike a resource read, absence is an error here.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainDataSource;

impl DomainDataSource {
    pub async fn read(&self, clients: &ClientSet, name: &str, region: Region) -> Result<DomainState> {
        let api = clients.for_region(region)?;
        observe(api, name, WriteOnly::default())
            .await
            .context(|| format!("reading domain {}", name))?
            .ok_or_else(|| {
                Error::not_found(format!("domain {} does not exist in region {}", name, region))
            })
    }
}

async fn observe(
    api: &dyn MailgunApi,
    name: &str,
    write_only: WriteOnly,
) -> Result<Option<DomainState>> {
    let Some(details) = api.get_domain(name).await? else {
        tracing::debug!("Domain {} not found", name);
        return Ok(None);
    };
    let tracking = api.get_domain_tracking(name).await?;

    let state = to_state(api.region(), details, tracking.open, write_only)?;
    Ok(Some(state))
}

fn to_state(
    region: Region,
    details: DomainDetails,
    open_tracking: bool,
    write_only: WriteOnly,
) -> Result<DomainState> {
    let spam_action = if details.domain.spam_action.is_empty() {
        SpamAction::default()
    } else {
        details.domain.spam_action.parse()?
    };

    let receiving_records = details
        .receiving_dns_records
        .iter()
        .map(receiving_record)
        .collect();
    let sending_records = details
        .sending_dns_records
        .iter()
        .map(|r| sending_record(&details.domain.name, r))
        .collect();

    Ok(DomainState {
        name: details.domain.name,
        region,
        spam_action,
        wildcard: details.domain.wildcard,
        smtp_login: details.domain.smtp_login,
        smtp_password: write_only.smtp_password,
        open_tracking,
        dkim_selector: write_only.dkim_selector,
        force_dkim_authority: write_only.force_dkim_authority,
        dkim_key_size: write_only.dkim_key_size,
        receiving_records,
        sending_records,
    })
}

/// Receiving records (MX) are identified by their value
fn receiving_record(record: &ApiDnsRecord) -> DnsRecord {
    DnsRecord {
        id: record.value.clone(),
        name: String::new(),
        priority: record.priority.clone(),
        record_type: record.record_type.clone(),
        valid: record.valid.clone(),
        value: record.value.clone(),
    }
}

/// Sending records are identified by name; the DKIM record's name embeds the
/// selector, so it gets a selector-independent id
fn sending_record(domain: &str, record: &ApiDnsRecord) -> DnsRecord {
    let id = if record.name.contains("._domainkey.") {
        format!("_domainkey.{}", domain)
    } else {
        record.name.clone()
    };

    DnsRecord {
        id,
        name: record.name.clone(),
        priority: String::new(),
        record_type: record.record_type.clone(),
        valid: record.valid.clone(),
        value: record.value.clone(),
    }
}
