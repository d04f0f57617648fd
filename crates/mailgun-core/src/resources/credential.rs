// # Credential Reconciler
//
// SMTP credentials have no single-item endpoint; reads list every credential
// of the domain and match on login. Mailgun reports logins as full addresses
// (`alice@example.com`), so a bare local part matches too.

use async_trait::async_trait;
use std::fmt;
use tokio::time::Instant;

use super::{Reconcile, already_deleted_ok};
use crate::config::PollConfig;
use crate::diff::{Differ, Plan, UpdateOutcome};
use crate::error::{Error, Result, ResultExt};
use crate::model::{CredentialSpec, CredentialState, Region, ResourceKind};
use crate::poll::{PollOutcome, PollPolicy, Presence, confirm_absent};
use crate::traits::{ClientSet, Credential, MailgunApi};

/// In-place change to a credential
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialMutation {
    Password(String),
}

impl fmt::Debug for CredentialMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialMutation::Password(_) => f.write_str("Password(<REDACTED>)"),
        }
    }
}

/// Reconciler for `mailgun_domain_credential`
#[derive(Debug, Clone)]
pub struct CredentialResource {
    poll: PollPolicy,
}

impl CredentialResource {
    pub fn new(poll: PollPolicy) -> Self {
        Self { poll }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.policy_for(ResourceKind::Credential))
    }
}

fn login_matches(listed: &str, login: &str, domain: &str) -> bool {
    if listed == login {
        return true;
    }
    listed
        .strip_suffix(domain)
        .and_then(|rest| rest.strip_suffix('@'))
        .is_some_and(|local| local == login)
}

async fn find(api: &dyn MailgunApi, domain: &str, login: &str) -> Result<Option<Credential>> {
    let credentials = api.list_credentials(domain).await?;
    tracing::debug!("Domain {} has {} credential(s)", domain, credentials.len());
    Ok(credentials
        .into_iter()
        .find(|c| login_matches(&c.login, login, domain)))
}

fn to_state(
    region: Region,
    domain: &str,
    login: &str,
    password: Option<String>,
    found: Credential,
) -> CredentialState {
    CredentialState {
        region,
        domain: domain.to_string(),
        login: login.to_string(),
        password,
        created_at: Some(found.created_at).filter(|at| !at.is_empty()),
    }
}

#[async_trait]
impl Reconcile for CredentialResource {
    type Spec = CredentialSpec;
    type State = CredentialState;
    type Mutation = CredentialMutation;

    const KIND: ResourceKind = ResourceKind::Credential;

    async fn create(&self, clients: &ClientSet, spec: &CredentialSpec) -> Result<CredentialState> {
        spec.validate()?;
        let api = clients.for_region(spec.region)?;
        let key = format!("{}@{}", spec.login, spec.domain);

        tracing::debug!("Creating credential with login: {}", spec.login);
        api.create_credential(&spec.domain, &spec.login, &spec.password)
            .await
            .context(|| format!("creating credential {}", key))?;

        tracing::info!("Credential ID: {}", key);

        find(api, &spec.domain, &spec.login)
            .await
            .context(|| format!("reading back credential {}", key))?
            .map(|found| {
                to_state(
                    spec.region,
                    &spec.domain,
                    &spec.login,
                    Some(spec.password.clone()),
                    found,
                )
            })
            .ok_or_else(|| Error::not_found(format!("credential {} vanished after create", key)))
    }

    async fn read(
        &self,
        clients: &ClientSet,
        prior: &CredentialState,
    ) -> Result<Option<CredentialState>> {
        let api = clients.for_region(prior.region)?;
        let found = find(api, &prior.domain, &prior.login)
            .await
            .context(|| format!("reading credential {}", prior.identity()))?;

        Ok(found.map(|found| {
            to_state(
                prior.region,
                &prior.domain,
                &prior.login,
                prior.password.clone(),
                found,
            )
        }))
    }

    fn plan(&self, current: &CredentialState, spec: &CredentialSpec) -> Plan<CredentialMutation> {
        Differ::new()
            .force_new("region", &current.region, &spec.region)
            .force_new("domain", current.domain.as_str(), spec.domain.as_str())
            .force_new("login", current.login.as_str(), spec.login.as_str())
            .mutable(
                "password",
                &current.password.as_deref(),
                &Some(spec.password.as_str()),
                |_| CredentialMutation::Password(spec.password.clone()),
            )
            .finish()
    }

    async fn update(
        &self,
        clients: &ClientSet,
        prior: &CredentialState,
        spec: &CredentialSpec,
    ) -> Result<UpdateOutcome<CredentialState>> {
        spec.validate()?;
        let key = prior.identity();

        let current = self
            .read(clients, prior)
            .await?
            .ok_or_else(|| Error::not_found(format!("credential {}", key)))?;

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
                CredentialMutation::Password(password) => {
                    tracing::info!("Changing password of credential {}", key);
                    api.change_credential_password(&current.domain, &current.login, password)
                        .await
                        .context(|| format!("changing password of credential {}", key))?;
                }
            }
        }

        Ok(UpdateOutcome::Updated(CredentialState {
            password: Some(spec.password.clone()),
            ..current
        }))
    }

    async fn delete(
        &self,
        clients: &ClientSet,
        state: &CredentialState,
        deadline: Option<Instant>,
    ) -> Result<PollOutcome> {
        let api = clients.for_region(state.region)?;
        let key = state.identity();
        let (domain, login) = (state.domain.as_str(), state.login.as_str());

        tracing::info!("Deleting credential: {}", key);
        already_deleted_ok(api.delete_credential(domain, login).await, &key)
            .context(|| format!("deleting credential {}", key))?;

        confirm_absent(&key, &self.poll, deadline, move || async move {
            find(api, domain, login).await.map(|found| Presence::of(&found))
        })
        .await
        .context(|| format!("waiting for credential {} to disappear", key))
    }

    async fn import(&self, clients: &ClientSet, raw_id: &str) -> Result<CredentialState> {
        let (region, login, domain) = CredentialSpec::key_from_import(raw_id)?;
        let api = clients.for_region(region)?;
        let key = format!("{}@{}", login, domain);

        find(api, &domain, &login)
            .await
            .context(|| format!("importing credential {}", key))?
            .map(|found| to_state(region, &domain, &login, None, found))
            .ok_or_else(|| {
                Error::not_found(format!(
                    "credential {} does not exist in region {}",
                    key, region
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bare_and_full_logins_match() {
        assert!(login_matches("alice@example.com", "alice", "example.com"));
        assert!(login_matches("alice@example.com", "alice@example.com", "example.com"));
        assert!(!login_matches("malice@example.com", "alice", "example.com"));
        assert!(!login_matches("alice@other.com", "alice", "example.com"));
    }

    #[test]
    fn password_change_is_the_only_mutation() {
        let resource =
            CredentialResource::new(PollPolicy::fixed(Duration::from_secs(60), Duration::from_secs(1)));
        let current = CredentialState {
            region: Region::Us,
            domain: "example.com".to_string(),
            login: "alice".to_string(),
            password: Some("old".to_string()),
            created_at: None,
        };

        let spec = CredentialSpec::new("example.com", "alice", "old");
        assert!(resource.plan(&current, &spec).is_noop());

        let spec = CredentialSpec::new("example.com", "alice", "new");
        let plan = resource.plan(&current, &spec);
        assert_eq!(plan.mutations, vec![CredentialMutation::Password("new".to_string())]);

        let spec = CredentialSpec::new("example.com", "bob", "new");
        assert_eq!(resource.plan(&current, &spec).replace, vec!["login"]);
    }
}
