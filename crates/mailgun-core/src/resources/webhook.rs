// # Webhook Reconciler
//
// One webhook per (domain, kind). The kind is part of the identity; only the
// URL set can change in place. URLs are compared as a set.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio::time::Instant;

use super::{Reconcile, already_deleted_ok};
use crate::config::PollConfig;
use crate::diff::{Differ, Plan, UpdateOutcome};
use crate::error::{Error, Result, ResultExt};
use crate::model::{ResourceKind, WebhookKind, WebhookSpec, WebhookState};
use crate::poll::{PollOutcome, PollPolicy, Presence, confirm_absent};
use crate::traits::{ClientSet, MailgunApi};

/// In-place change to a webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookMutation {
    /// Replace the URL set
    Urls(Vec<String>),
}

/// Reconciler for `mailgun_webhook`
#[derive(Debug, Clone)]
pub struct WebhookResource {
    poll: PollPolicy,
}

impl WebhookResource {
    pub fn new(poll: PollPolicy) -> Self {
        Self { poll }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.policy_for(ResourceKind::Webhook))
    }
}

async fn observe(
    api: &dyn MailgunApi,
    domain: &str,
    kind: WebhookKind,
) -> Result<Option<WebhookState>> {
    let urls = api.get_webhook(domain, kind).await?;
    Ok(urls.map(|urls| WebhookState {
        region: api.region(),
        domain: domain.to_string(),
        kind,
        urls: urls.into_iter().collect(),
    }))
}

fn url_list(urls: &BTreeSet<String>) -> Vec<String> {
    urls.iter().cloned().collect()
}

#[async_trait]
impl Reconcile for WebhookResource {
    type Spec = WebhookSpec;
    type State = WebhookState;
    type Mutation = WebhookMutation;

    const KIND: ResourceKind = ResourceKind::Webhook;

    async fn create(&self, clients: &ClientSet, spec: &WebhookSpec) -> Result<WebhookState> {
        spec.validate()?;
        let api = clients.for_region(spec.region)?;
        let key = format!("{}:{}:{}", spec.region, spec.domain, spec.kind);

        api.create_webhook(&spec.domain, spec.kind, &url_list(&spec.urls))
            .await
            .context(|| format!("creating webhook {}", key))?;

        tracing::info!("Create webhook ID: {}", key);

        observe(api, &spec.domain, spec.kind)
            .await
            .context(|| format!("reading back webhook {}", key))?
            .ok_or_else(|| Error::not_found(format!("webhook {} vanished after create", key)))
    }

    async fn read(&self, clients: &ClientSet, prior: &WebhookState) -> Result<Option<WebhookState>> {
        let api = clients.for_region(prior.region)?;
        observe(api, &prior.domain, prior.kind)
            .await
            .context(|| format!("reading webhook {}", prior.identity()))
    }

    fn plan(&self, current: &WebhookState, spec: &WebhookSpec) -> Plan<WebhookMutation> {
        Differ::new()
            .force_new("region", &current.region, &spec.region)
            .force_new("domain", current.domain.as_str(), spec.domain.as_str())
            .force_new("kind", &current.kind, &spec.kind)
            .mutable("urls", &current.urls, &spec.urls, |urls| {
                WebhookMutation::Urls(url_list(urls))
            })
            .finish()
    }

    async fn update(
        &self,
        clients: &ClientSet,
        prior: &WebhookState,
        spec: &WebhookSpec,
    ) -> Result<UpdateOutcome<WebhookState>> {
        spec.validate()?;
        let key = prior.identity();

        let current = self
            .read(clients, prior)
            .await?
            .ok_or_else(|| Error::not_found(format!("webhook {}", key)))?;

        let plan = self.plan(&current, spec);
        if plan.requires_replacement() {
            return Ok(UpdateOutcome::ReplacementRequired(plan.replace));
        }
        if plan.is_noop() {
            return Ok(UpdateOutcome::Unchanged(current));
        }

        let api = clients.for_region(current.region)?;
        for mutation in &plan.mutations {
            match mutation {
                WebhookMutation::Urls(urls) => {
                    api.update_webhook(&current.domain, current.kind, urls)
                        .await
                        .context(|| format!("updating webhook {}", key))?;
                }
            }
        }

        tracing::info!("Update webhook ID: {}", key);

        self.read(clients, &current)
            .await?
            .map(UpdateOutcome::Updated)
            .ok_or_else(|| Error::not_found(format!("webhook {} vanished during update", key)))
    }

    async fn delete(
        &self,
        clients: &ClientSet,
        state: &WebhookState,
        deadline: Option<Instant>,
    ) -> Result<PollOutcome> {
        let api = clients.for_region(state.region)?;
        let key = state.identity();
        let (domain, kind) = (state.domain.as_str(), state.kind);

        already_deleted_ok(api.delete_webhook(domain, kind).await, &key)
            .context(|| format!("deleting webhook {}", key))?;

        tracing::info!("Delete webhook ID: {}", key);

        confirm_absent(&key, &self.poll, deadline, move || async move {
            api.get_webhook(domain, kind)
                .await
                .map(|found| Presence::of(&found))
        })
        .await
        .context(|| format!("waiting for webhook {} to disappear", key))
    }

    async fn import(&self, clients: &ClientSet, raw_id: &str) -> Result<WebhookState> {
        let (region, domain, kind) = WebhookSpec::key_from_import(raw_id)?;
        let api = clients.for_region(region)?;

        observe(api, &domain, kind)
            .await
            .context(|| format!("importing webhook {}", raw_id))?
            .ok_or_else(|| Error::not_found(format!("webhook {} does not exist", raw_id)))
    }
}
