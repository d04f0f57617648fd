//! Test doubles and common utilities for contract tests
//!
//! [`FakeMailgun`] is an in-memory Mailgun region. It counts every call,
//! can fail a chosen method once, and can keep deleted entities visible for
//! a number of reads to imitate replication lag.

#![allow(dead_code)]

use mailgun_core::error::{Error, Result};
use mailgun_core::model::{Region, WebhookKind};
use mailgun_core::traits::{
    ApiDnsRecord, ClientSet, CreateDomainOptions, Credential, DomainDetails, DomainInfo,
    DomainTracking, MailgunApi, Route, RouteOptions,
};
use mailgun_core::engine::ResourceBlock;
use mailgun_core::model::{CredentialSpec, DomainSpec, RouteSpec, WebhookSpec};
use mailgun_core::{Manifest, MemoryStateStore, ProviderConfig, ReconcileEvent, Reconciler};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct FakeDomain {
    info: DomainInfo,
    dkim_selector: String,
    tracking: DomainTracking,
}

impl FakeDomain {
    fn details(&self) -> DomainDetails {
        let name = &self.info.name;
        let record = |name: String, record_type: &str, value: &str| ApiDnsRecord {
            name,
            record_type: record_type.to_string(),
            valid: "unknown".to_string(),
            value: value.to_string(),
            ..Default::default()
        };

        DomainDetails {
            domain: self.info.clone(),
            receiving_dns_records: ["mxa.mailgun.org", "mxb.mailgun.org"]
                .into_iter()
                .map(|mx| ApiDnsRecord {
                    priority: "10".to_string(),
                    ..record(String::new(), "MX", mx)
                })
                .collect(),
            sending_dns_records: vec![
                record(name.clone(), "TXT", "v=spf1 include:mailgun.org ~all"),
                record(
                    format!("{}._domainkey.{}", self.dkim_selector, name),
                    "TXT",
                    "k=rsa; p=MIGfMA0",
                ),
                record(format!("email.{}", name), "CNAME", "mailgun.org"),
            ],
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    domains: BTreeMap<String, FakeDomain>,
    routes: BTreeMap<String, Route>,
    /// domain -> full login -> password
    credentials: BTreeMap<String, BTreeMap<String, String>>,
    webhooks: BTreeMap<(String, WebhookKind), Vec<String>>,

    /// Deleted entities still visible for this many reads
    lingering: HashMap<String, u32>,
    linger_reads: u32,

    calls: HashMap<&'static str, usize>,
    password_changes: Vec<(String, String)>,
    route_updates: Vec<RouteOptions>,
    fail_next: HashMap<&'static str, String>,
    next_route: u32,
}

impl Inner {
    /// Whether a deleted entity should still be reported, consuming one read
    fn still_visible(&mut self, key: &str) -> Option<bool> {
        let remaining = self.lingering.get_mut(key)?;
        if *remaining == 0 {
            self.lingering.remove(key);
            Some(false)
        } else {
            if *remaining != u32::MAX {
                *remaining -= 1;
            }
            Some(true)
        }
    }
}

/// In-memory stand-in for one Mailgun region
#[derive(Clone)]
pub struct FakeMailgun {
    region: Region,
    inner: Arc<Mutex<Inner>>,
}

impl FakeMailgun {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Keep deleted entities visible for `reads` existence checks
    pub fn linger_after_delete(&self, reads: u32) {
        self.lock().linger_reads = reads;
    }

    /// Never let deleted entities disappear
    pub fn linger_forever(&self) {
        self.linger_after_delete(u32::MAX);
    }

    /// Fail the next call of `method` with an API error
    pub fn fail_next(&self, method: &'static str, message: &str) {
        self.lock().fail_next.insert(method, message.to_string());
    }

    /// Number of calls made to `method`
    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Calls to any mutating method
    pub fn mutation_calls(&self) -> usize {
        let inner = self.lock();
        inner
            .calls
            .iter()
            .filter(|(method, _)| {
                !method.starts_with("get_") && !method.starts_with("list_")
            })
            .map(|(_, count)| count)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    /// (login, password) of every password change, in order
    pub fn password_changes(&self) -> Vec<(String, String)> {
        self.lock().password_changes.clone()
    }

    /// Every route update body, in order
    pub fn route_updates(&self) -> Vec<RouteOptions> {
        self.lock().route_updates.clone()
    }

    pub fn has_domain(&self, name: &str) -> bool {
        self.lock().domains.contains_key(name)
    }

    pub fn route_ids(&self) -> Vec<String> {
        self.lock().routes.keys().cloned().collect()
    }

    pub fn webhook_urls(&self, domain: &str, kind: WebhookKind) -> Option<Vec<String>> {
        self.lock().webhooks.get(&(domain.to_string(), kind)).cloned()
    }

    pub fn credential_password(&self, domain: &str, login: &str) -> Option<String> {
        self.lock()
            .credentials
            .get(domain)
            .and_then(|logins| logins.get(&full_login(login, domain)).cloned())
    }

    /// Remove a domain behind the engine's back
    pub fn remove_domain_out_of_band(&self, name: &str) {
        self.lock().domains.remove(name);
    }

    /// Change a route behind the engine's back
    pub fn set_route_priority_out_of_band(&self, id: &str, priority: i64) {
        if let Some(route) = self.lock().routes.get_mut(id) {
            route.priority = priority;
        }
    }

    /// Seed a domain as if it had been created elsewhere
    pub fn seed_domain(&self, name: &str) {
        let mut inner = self.lock();
        inner.domains.insert(
            name.to_string(),
            FakeDomain {
                info: DomainInfo {
                    name: name.to_string(),
                    smtp_login: format!("postmaster@{}", name),
                    spam_action: "disabled".to_string(),
                    wildcard: false,
                    state: "active".to_string(),
                    created_at: "Thu, 13 Oct 2022 18:02:00 UTC".to_string(),
                },
                dkim_selector: "mx".to_string(),
                tracking: DomainTracking::default(),
            },
        );
    }

    /// Seed a webhook as if it had been created elsewhere
    pub fn seed_webhook(&self, domain: &str, kind: WebhookKind, url: &str) {
        self.lock()
            .webhooks
            .insert((domain.to_string(), kind), vec![url.to_string()]);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Count the call and apply any injected failure
    fn call(&self, method: &'static str) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        *inner.calls.entry(method).or_insert(0) += 1;
        if let Some(message) = inner.fail_next.remove(method) {
            return Err(Error::api(message));
        }
        Ok(inner)
    }

    fn start_lingering(inner: &mut Inner, key: String) -> bool {
        if inner.linger_reads == 0 {
            return false;
        }
        let reads = inner.linger_reads;
        inner.lingering.insert(key, reads);
        true
    }
}

fn full_login(login: &str, domain: &str) -> String {
    if login.contains('@') {
        login.to_string()
    } else {
        format!("{}@{}", login, domain)
    }
}

#[async_trait::async_trait]
impl MailgunApi for FakeMailgun {
    fn region(&self) -> Region {
        self.region
    }

    async fn create_domain(&self, options: &CreateDomainOptions) -> Result<()> {
        let mut inner = self.call("create_domain")?;
        if inner.domains.contains_key(&options.name) {
            return Err(Error::api(format!("domain {} already exists", options.name)));
        }

        let login = format!("postmaster@{}", options.name);
        inner.domains.insert(
            options.name.clone(),
            FakeDomain {
                info: DomainInfo {
                    name: options.name.clone(),
                    smtp_login: login.clone(),
                    spam_action: options.spam_action.to_string(),
                    wildcard: options.wildcard,
                    state: "unverified".to_string(),
                    created_at: "Thu, 13 Oct 2022 18:02:00 UTC".to_string(),
                },
                dkim_selector: "mx".to_string(),
                tracking: DomainTracking::default(),
            },
        );
        inner
            .credentials
            .entry(options.name.clone())
            .or_default()
            .insert(login, options.smtp_password.clone().unwrap_or_default());
        Ok(())
    }

    async fn get_domain(&self, name: &str) -> Result<Option<DomainDetails>> {
        let mut inner = self.call("get_domain")?;
        match inner.still_visible(&format!("domain:{}", name)) {
            Some(true) => {}
            Some(false) => {
                inner.domains.remove(name);
            }
            None => {}
        }
        Ok(inner.domains.get(name).map(FakeDomain::details))
    }

    async fn delete_domain(&self, name: &str) -> Result<()> {
        let mut inner = self.call("delete_domain")?;
        if !inner.domains.contains_key(name) {
            return Err(Error::not_found(format!("domain {}", name)));
        }
        if !Self::start_lingering(&mut inner, format!("domain:{}", name)) {
            inner.domains.remove(name);
        }
        inner.credentials.remove(name);
        Ok(())
    }

    async fn get_domain_tracking(&self, name: &str) -> Result<DomainTracking> {
        let inner = self.call("get_domain_tracking")?;
        inner
            .domains
            .get(name)
            .map(|d| d.tracking)
            .ok_or_else(|| Error::not_found(format!("domain {}", name)))
    }

    async fn update_open_tracking(&self, name: &str, active: bool) -> Result<()> {
        let mut inner = self.call("update_open_tracking")?;
        let domain = inner
            .domains
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("domain {}", name)))?;
        domain.tracking.open = active;
        Ok(())
    }

    async fn update_dkim_selector(&self, name: &str, selector: &str) -> Result<()> {
        let mut inner = self.call("update_dkim_selector")?;
        let domain = inner
            .domains
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("domain {}", name)))?;
        domain.dkim_selector = selector.to_string();
        Ok(())
    }

    async fn create_route(&self, options: &RouteOptions) -> Result<Route> {
        let mut inner = self.call("create_route")?;
        inner.next_route += 1;
        let route = Route {
            id: format!("route-{:04}", inner.next_route),
            priority: options.priority.unwrap_or(0),
            description: options.description.clone().unwrap_or_default(),
            expression: options.expression.clone().unwrap_or_default(),
            actions: options.actions.clone().unwrap_or_default(),
            created_at: "Wed, 15 Feb 2012 13:03:31 GMT".to_string(),
        };
        inner.routes.insert(route.id.clone(), route.clone());
        Ok(route)
    }

    async fn get_route(&self, id: &str) -> Result<Option<Route>> {
        let mut inner = self.call("get_route")?;
        if inner.still_visible(&format!("route:{}", id)) == Some(false) {
            inner.routes.remove(id);
        }
        Ok(inner.routes.get(id).cloned())
    }

    async fn update_route(&self, id: &str, options: &RouteOptions) -> Result<Route> {
        let mut inner = self.call("update_route")?;
        inner.route_updates.push(options.clone());
        let route = inner
            .routes
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("route {}", id)))?;
        if let Some(priority) = options.priority {
            route.priority = priority;
        }
        if let Some(description) = &options.description {
            route.description = description.clone();
        }
        if let Some(expression) = &options.expression {
            route.expression = expression.clone();
        }
        if let Some(actions) = &options.actions {
            route.actions = actions.clone();
        }
        Ok(route.clone())
    }

    async fn delete_route(&self, id: &str) -> Result<()> {
        let mut inner = self.call("delete_route")?;
        if !inner.routes.contains_key(id) {
            return Err(Error::not_found(format!("route {}", id)));
        }
        if !Self::start_lingering(&mut inner, format!("route:{}", id)) {
            inner.routes.remove(id);
        }
        Ok(())
    }

    async fn create_credential(&self, domain: &str, login: &str, password: &str) -> Result<()> {
        let mut inner = self.call("create_credential")?;
        if !inner.domains.contains_key(domain) {
            return Err(Error::not_found(format!("domain {}", domain)));
        }
        inner
            .credentials
            .entry(domain.to_string())
            .or_default()
            .insert(full_login(login, domain), password.to_string());
        Ok(())
    }

    async fn change_credential_password(
        &self,
        domain: &str,
        login: &str,
        password: &str,
    ) -> Result<()> {
        let mut inner = self.call("change_credential_password")?;
        inner
            .password_changes
            .push((login.to_string(), password.to_string()));
        let stored = inner
            .credentials
            .get_mut(domain)
            .and_then(|logins| logins.get_mut(&full_login(login, domain)))
            .ok_or_else(|| Error::not_found(format!("credential {}", login)))?;
        *stored = password.to_string();
        Ok(())
    }

    async fn delete_credential(&self, domain: &str, login: &str) -> Result<()> {
        let mut inner = self.call("delete_credential")?;
        let key = full_login(login, domain);
        let exists = inner
            .credentials
            .get(domain)
            .is_some_and(|logins| logins.contains_key(&key));
        if !exists {
            return Err(Error::not_found(format!("credential {}", key)));
        }
        if !Self::start_lingering(&mut inner, format!("credential:{}", key))
            && let Some(logins) = inner.credentials.get_mut(domain)
        {
            logins.remove(&key);
        }
        Ok(())
    }

    async fn list_credentials(&self, domain: &str) -> Result<Vec<Credential>> {
        let mut inner = self.call("list_credentials")?;
        let logins: Vec<String> = inner
            .credentials
            .get(domain)
            .map(|logins| logins.keys().cloned().collect())
            .unwrap_or_default();

        let mut visible = Vec::new();
        for login in logins {
            if inner.still_visible(&format!("credential:{}", login)) == Some(false) {
                if let Some(logins) = inner.credentials.get_mut(domain) {
                    logins.remove(&login);
                }
                continue;
            }
            visible.push(Credential {
                login,
                created_at: "Mon, 16 Oct 2023 09:00:00 UTC".to_string(),
            });
        }
        Ok(visible)
    }

    async fn create_webhook(&self, domain: &str, kind: WebhookKind, urls: &[String]) -> Result<()> {
        let mut inner = self.call("create_webhook")?;
        let key = (domain.to_string(), kind);
        if inner.webhooks.contains_key(&key) {
            return Err(Error::api(format!("webhook {} already exists", kind)));
        }
        inner.webhooks.insert(key, urls.to_vec());
        Ok(())
    }

    async fn get_webhook(&self, domain: &str, kind: WebhookKind) -> Result<Option<Vec<String>>> {
        let mut inner = self.call("get_webhook")?;
        let key = (domain.to_string(), kind);
        if inner.still_visible(&format!("webhook:{}:{}", domain, kind)) == Some(false) {
            inner.webhooks.remove(&key);
        }
        Ok(inner.webhooks.get(&key).cloned())
    }

    async fn update_webhook(&self, domain: &str, kind: WebhookKind, urls: &[String]) -> Result<()> {
        let mut inner = self.call("update_webhook")?;
        let stored = inner
            .webhooks
            .get_mut(&(domain.to_string(), kind))
            .ok_or_else(|| Error::not_found(format!("webhook {}", kind)))?;
        *stored = urls.to_vec();
        Ok(())
    }

    async fn delete_webhook(&self, domain: &str, kind: WebhookKind) -> Result<()> {
        let mut inner = self.call("delete_webhook")?;
        let key = (domain.to_string(), kind);
        if !inner.webhooks.contains_key(&key) {
            return Err(Error::not_found(format!("webhook {}", kind)));
        }
        if !Self::start_lingering(&mut inner, format!("webhook:{}:{}", domain, kind)) {
            inner.webhooks.remove(&key);
        }
        Ok(())
    }
}

/// One fake per region, plus the client set wrapping them
pub struct FakeRegions {
    pub us: FakeMailgun,
    pub eu: FakeMailgun,
    pub clients: ClientSet,
}

pub fn fake_regions() -> FakeRegions {
    let us = FakeMailgun::new(Region::Us);
    let eu = FakeMailgun::new(Region::Eu);
    let clients = ClientSet::from_clients([
        Arc::new(us.clone()) as Arc<dyn MailgunApi>,
        Arc::new(eu.clone()) as Arc<dyn MailgunApi>,
    ]);
    FakeRegions { us, eu, clients }
}

/// Configuration with fast polling for tests
pub fn test_config() -> ProviderConfig {
    let mut config = ProviderConfig::new("key-test");
    config.poll.interval_ms = 1_000;
    config.poll.max_interval_ms = 1_000;
    config.poll.backoff_multiplier = 1.0;
    config
}

/// Reconciler over the fakes with a shared in-memory state store
pub fn reconciler(
    regions: &FakeRegions,
    store: &MemoryStateStore,
    config: &ProviderConfig,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
    Reconciler::new(regions.clients.clone(), Box::new(store.clone()), config)
        .expect("reconciler construction succeeds")
}

/// Drain every event currently buffered
pub fn drain(rx: &mut mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn domain_spec() -> DomainSpec {
    DomainSpec::new("example.com")
        .with_wildcard(true)
        .with_smtp_password("initial-smtp-password")
}

pub fn route_spec() -> RouteSpec {
    RouteSpec::new(
        10,
        r#"match_recipient(".*@example.com")"#,
        vec!["forward(\"https://inbound.example.com/mail\")".to_string()],
    )
    .with_description("inbound mail")
}

pub fn credential_spec() -> CredentialSpec {
    CredentialSpec::new("example.com", "alice", "alice-password-1")
}

pub fn webhook_spec() -> WebhookSpec {
    WebhookSpec::new(
        "example.com",
        WebhookKind::Delivered,
        ["https://hooks.example.com/delivered"],
    )
}

/// One block of every kind, deliberately listed in reverse creation order
pub fn full_manifest() -> Manifest {
    Manifest::new(vec![
        ResourceBlock::new("delivered", webhook_spec()),
        ResourceBlock::new("alice", credential_spec()),
        ResourceBlock::new("inbound", route_spec()),
        ResourceBlock::new("main", domain_spec()),
    ])
    .expect("valid manifest")
}

/// Addresses of the `Created` events, in emission order
pub fn created_addresses(events: &[ReconcileEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ReconcileEvent::Created { address, .. } => Some(address.clone()),
            _ => None,
        })
        .collect()
}

/// Addresses of the `Deleted` events, in emission order
pub fn deleted_addresses(events: &[ReconcileEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ReconcileEvent::Deleted { address, .. } => Some(address.clone()),
            _ => None,
        })
        .collect()
}
