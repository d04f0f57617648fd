// # Mailgun API Trait
//
// The capability handle every reconciler talks to. One handle serves one
// region; the domain is passed per call.
//
// ## Implementations
//
// - HTTP: `mailgun-http` crate
// - In-memory fakes in the contract tests
//
// ## Not-found semantics
//
// Lookups (`get_*`, `list_credentials`) return `Ok(None)` / an empty list when
// the entity does not exist. Only genuine failures (transport, auth, 5xx,
// malformed responses) are errors. Reconcilers rely on this to tell "gone"
// apart from "could not check".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::model::{Region, SpamAction, WebhookKind};

/// Options for creating a domain
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CreateDomainOptions {
    pub name: String,
    pub spam_action: SpamAction,
    pub smtp_password: Option<String>,
    pub wildcard: bool,
    pub force_dkim_authority: bool,
    pub dkim_key_size: Option<u32>,
}

impl fmt::Debug for CreateDomainOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateDomainOptions")
            .field("name", &self.name)
            .field("spam_action", &self.spam_action)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "<REDACTED>"))
            .field("wildcard", &self.wildcard)
            .field("force_dkim_authority", &self.force_dkim_authority)
            .field("dkim_key_size", &self.dkim_key_size)
            .finish()
    }
}

/// Domain attributes as returned by `GET /domains/{name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub name: String,
    #[serde(default)]
    pub smtp_login: String,
    #[serde(default)]
    pub spam_action: String,
    #[serde(default)]
    pub wildcard: bool,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub created_at: String,
}

/// DNS record as returned by the domains endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDnsRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub record_type: String,
    #[serde(default)]
    pub valid: String,
    #[serde(default)]
    pub value: String,
}

/// Full domain response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDetails {
    pub domain: DomainInfo,
    #[serde(default)]
    pub receiving_dns_records: Vec<ApiDnsRecord>,
    #[serde(default)]
    pub sending_dns_records: Vec<ApiDnsRecord>,
}

/// Tracking settings of a domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainTracking {
    pub open: bool,
    pub click: bool,
    pub unsubscribe: bool,
}

/// An inbound route
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub created_at: String,
}

/// Fields of a route to send; `None` leaves the remote value untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOptions {
    pub priority: Option<i64>,
    pub description: Option<String>,
    pub expression: Option<String>,
    pub actions: Option<Vec<String>>,
}

/// An SMTP credential listed for a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub login: String,
    #[serde(default)]
    pub created_at: String,
}

/// Capability handle for one Mailgun region
///
/// # Trust Level: Untrusted
///
/// Implementations issue exactly one remote request (or one paginated
/// listing) per call. They do not retry, poll or cache: the delete
/// confirmation loop lives in [`crate::poll`], and state lives in the
/// [`crate::StateStore`].
#[async_trait]
pub trait MailgunApi: Send + Sync {
    /// Region this handle is bound to
    fn region(&self) -> Region;

    async fn create_domain(&self, options: &CreateDomainOptions) -> Result<()>;

    async fn get_domain(&self, name: &str) -> Result<Option<DomainDetails>>;

    async fn delete_domain(&self, name: &str) -> Result<()>;

    async fn get_domain_tracking(&self, name: &str) -> Result<DomainTracking>;

    async fn update_open_tracking(&self, name: &str, active: bool) -> Result<()>;

    async fn update_dkim_selector(&self, name: &str, selector: &str) -> Result<()>;

    /// Create a route; returns it with its remote-assigned id
    async fn create_route(&self, options: &RouteOptions) -> Result<Route>;

    async fn get_route(&self, id: &str) -> Result<Option<Route>>;

    async fn update_route(&self, id: &str, options: &RouteOptions) -> Result<Route>;

    async fn delete_route(&self, id: &str) -> Result<()>;

    async fn create_credential(&self, domain: &str, login: &str, password: &str) -> Result<()>;

    async fn change_credential_password(
        &self,
        domain: &str,
        login: &str,
        password: &str,
    ) -> Result<()>;

    async fn delete_credential(&self, domain: &str, login: &str) -> Result<()>;

    /// Every credential of the domain, across all pages
    async fn list_credentials(&self, domain: &str) -> Result<Vec<Credential>>;

    async fn create_webhook(&self, domain: &str, kind: WebhookKind, urls: &[String])
    -> Result<()>;

    /// URLs of the webhook, or `None` if it is not configured
    async fn get_webhook(&self, domain: &str, kind: WebhookKind) -> Result<Option<Vec<String>>>;

    async fn update_webhook(&self, domain: &str, kind: WebhookKind, urls: &[String])
    -> Result<()>;

    async fn delete_webhook(&self, domain: &str, kind: WebhookKind) -> Result<()>;
}

/// Helper trait for constructing API handles from configuration
pub trait MailgunApiFactory: Send + Sync {
    /// Create a handle bound to `region`
    fn create(&self, config: &ProviderConfig, region: Region) -> Result<Box<dyn MailgunApi>>;
}

/// One API handle per region
///
/// Built once from configuration and passed explicitly into every
/// reconciliation call.
#[derive(Clone)]
pub struct ClientSet {
    clients: HashMap<Region, Arc<dyn MailgunApi>>,
}

impl ClientSet {
    /// Build a handle for every supported region
    pub fn from_factory(factory: &dyn MailgunApiFactory, config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let mut clients: HashMap<Region, Arc<dyn MailgunApi>> = HashMap::new();
        for region in Region::ALL {
            clients.insert(region, Arc::from(factory.create(config, region)?));
        }
        Ok(Self { clients })
    }

    /// Build from explicit handles, keyed by the region each reports
    pub fn from_clients(handles: impl IntoIterator<Item = Arc<dyn MailgunApi>>) -> Self {
        let clients = handles
            .into_iter()
            .map(|client| (client.region(), client))
            .collect();
        Self { clients }
    }

    /// The handle for `region`
    pub fn for_region(&self, region: Region) -> Result<&dyn MailgunApi> {
        self.clients
            .get(&region)
            .map(|client| client.as_ref())
            .ok_or_else(|| Error::config(format!("No Mailgun client configured for region {}", region)))
    }

    pub fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.clients.keys().copied().collect();
        regions.sort();
        regions
    }
}

impl fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSet")
            .field("regions", &self.regions())
            .finish()
    }
}
