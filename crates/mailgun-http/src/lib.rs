// # Mailgun HTTP Client
//
// This crate implements `MailgunApi` over Mailgun's v3 REST API with reqwest.
//
// ## Implementation Status
//
// - ✅ One HTTP request per trait call (credential listing pages through results)
// - ✅ Full error propagation to the reconcilers
// - ✅ HTTP timeout from `ProviderConfig::http_timeout_secs`
// - ✅ Specific handling for 401/403, 404, 429 and 5xx
// - ✅ US and EU endpoints, plus a base URL override for testing
// - ❌ NO retry logic (owned by the reconcilers and the delete poller)
// - ❌ NO caching (observed state is owned by the StateStore)
//
// ### Trust Level: Untrusted (API client)
//
// The client only talks to its own region's endpoint, parses responses, and
// reports failures. It never spawns tasks and never touches state.
//
// ## Security Requirements
//
// - The API key NEVER appears in logs or `Debug` output
// - Passwords are sent in request bodies only
//
// ## API Reference
//
// - Domains: `/domains`, `/domains/{name}`, `/domains/{name}/tracking`,
//   `/domains/{name}/tracking/open`, `/domains/{name}/dkim_selector`
// - Routes: `/routes`, `/routes/{id}`
// - Credentials: `/domains/{name}/credentials[/{login}]`
// - Webhooks: `/domains/{name}/webhooks[/{kind}]`

use async_trait::async_trait;
use mailgun_core::config::ProviderConfig;
use mailgun_core::model::{Region, WebhookKind};
use mailgun_core::traits::{
    ApiDnsRecord, CreateDomainOptions, Credential, DomainDetails, DomainInfo, DomainTracking,
    MailgunApi, MailgunApiFactory, Route, RouteOptions,
};
use mailgun_core::{Error, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Page size used when listing credentials
const CREDENTIALS_PAGE_SIZE: usize = 100;

/// Mailgun v3 client bound to one region
///
/// # Trust Level: Untrusted
///
/// Stateless apart from the connection pool; every call is a single request.
pub struct MailgunClient {
    /// ⚠️ NEVER log this value
    api_key: String,

    region: Region,

    /// Base URL without trailing slash, e.g. `https://api.eu.mailgun.net/v3`
    base_url: String,

    /// `base_url` parsed; request paths are appended segment by segment
    base: Url,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for MailgunClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailgunClient")
            .field("api_key", &"<REDACTED>")
            .field("region", &self.region)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl MailgunClient {
    /// Create a client for `region`
    ///
    /// `base_url` overrides the region's endpoint when given.
    pub fn new(
        api_key: impl Into<String>,
        region: Region,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("Mailgun API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url
            .unwrap_or_else(|| region.api_base())
            .trim_end_matches('/')
            .to_string();

        let base = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| Error::config(format!("'{}' is not a usable API base URL", base_url)))?;

        Ok(Self {
            api_key,
            region,
            base_url,
            base,
            client,
        })
    }

    /// Create a client from provider configuration
    pub fn from_config(config: &ProviderConfig, region: Region) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            region,
            config.api_base_url.as_deref(),
            config.http_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request for the path made of `segments`
    ///
    /// Each segment is percent-encoded on its own, so a `/`, `?` or `#` in a
    /// domain, route id or login stays inside that segment.
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("'{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        tracing::debug!("{} {}", method, url);
        Ok(self
            .client
            .request(method, url)
            .basic_auth("api", Some(&self.api_key)))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", what, e)))?;
        check_status(response, what).await
    }

    /// Like [`Self::send`], but a 404 becomes `Ok(None)`
    async fn send_lookup(&self, request: RequestBuilder, what: &str) -> Result<Option<Response>> {
        match self.send(request, what).await {
            Ok(response) => Ok(Some(response)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Map a non-success status to an error
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    let message = error_message(&body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(format!(
            "{}: invalid API key or insufficient permissions ({})",
            what, status
        )),
        StatusCode::NOT_FOUND => Error::not_found(format!("{}: {}", what, message)),
        StatusCode::TOO_MANY_REQUESTS => {
            Error::rate_limited(format!("{}: {} ({})", what, message, status))
        }
        s if s.is_server_error() => {
            Error::api(format!("{}: server error (transient): {} - {}", what, status, message))
        }
        _ => Error::api(format!("{}: {} - {}", what, status, message)),
    })
}

/// Mailgun errors carry `{"message": "..."}`; fall back to the raw body
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| Error::api(format!("{}: failed to parse response: {}", what, e)))
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

// ===== Response shapes =====

#[derive(Debug, Deserialize)]
struct RawDnsRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    priority: Option<serde_json::Value>,
    #[serde(default)]
    record_type: String,
    #[serde(default)]
    valid: String,
    #[serde(default)]
    value: String,
}

impl From<RawDnsRecord> for ApiDnsRecord {
    fn from(raw: RawDnsRecord) -> Self {
        // Mailgun sends the MX priority as a string, some accounts as a number
        let priority = match raw.priority {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        ApiDnsRecord {
            name: raw.name,
            priority,
            record_type: raw.record_type,
            valid: raw.valid,
            value: raw.value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DomainResponse {
    domain: DomainInfo,
    #[serde(default)]
    receiving_dns_records: Vec<RawDnsRecord>,
    #[serde(default)]
    sending_dns_records: Vec<RawDnsRecord>,
}

/// Tracking flags are booleans, except click tracking which may be `"htmlonly"`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Active {
    Flag(bool),
    Text(String),
}

impl Active {
    fn is_on(&self) -> bool {
        match self {
            Active::Flag(flag) => *flag,
            Active::Text(text) => !matches!(text.as_str(), "" | "no" | "false"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrackingSetting {
    active: Active,
}

#[derive(Debug, Deserialize)]
struct TrackingSettings {
    open: Option<TrackingSetting>,
    click: Option<TrackingSetting>,
    unsubscribe: Option<TrackingSetting>,
}

#[derive(Debug, Deserialize)]
struct TrackingResponse {
    tracking: TrackingSettings,
}

impl From<TrackingSettings> for DomainTracking {
    fn from(settings: TrackingSettings) -> Self {
        let on = |s: &Option<TrackingSetting>| s.as_ref().is_some_and(|s| s.active.is_on());
        DomainTracking {
            open: on(&settings.open),
            click: on(&settings.click),
            unsubscribe: on(&settings.unsubscribe),
        }
    }
}

/// Route endpoints answer `{"route": {...}}`, except update which answers
/// with the route fields at the top level
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteEnvelope {
    Wrapped { route: Route },
    Bare(Route),
}

impl RouteEnvelope {
    fn into_route(self) -> Route {
        match self {
            RouteEnvelope::Wrapped { route } => route,
            RouteEnvelope::Bare(route) => route,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsPage {
    #[serde(default)]
    total_count: Option<usize>,
    #[serde(default)]
    items: Vec<Credential>,
}

/// Webhook body; older accounts report a single `url`
#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    urls: Option<Vec<String>>,
    #[serde(default)]
    url: Option<String>,
}

impl WebhookBody {
    fn into_urls(self) -> Vec<String> {
        match (self.urls, self.url) {
            (Some(urls), _) => urls,
            (None, Some(url)) => vec![url],
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    webhook: WebhookBody,
}

fn route_form(options: &RouteOptions) -> Vec<(&'static str, String)> {
    let mut form = Vec::new();
    if let Some(priority) = options.priority {
        form.push(("priority", priority.to_string()));
    }
    if let Some(description) = &options.description {
        form.push(("description", description.clone()));
    }
    if let Some(expression) = &options.expression {
        form.push(("expression", expression.clone()));
    }
    if let Some(actions) = &options.actions {
        form.extend(actions.iter().map(|action| ("action", action.clone())));
    }
    form
}

fn webhook_form(urls: &[String]) -> Vec<(&'static str, String)> {
    urls.iter().map(|url| ("url", url.clone())).collect()
}

#[async_trait]
impl MailgunApi for MailgunClient {
    fn region(&self) -> Region {
        self.region
    }

    async fn create_domain(&self, options: &CreateDomainOptions) -> Result<()> {
        let mut form: Vec<(&str, String)> = vec![
            ("name", options.name.clone()),
            ("spam_action", options.spam_action.to_string()),
            ("wildcard", options.wildcard.to_string()),
            ("force_dkim_authority", options.force_dkim_authority.to_string()),
        ];
        if let Some(password) = &options.smtp_password {
            form.push(("smtp_password", password.clone()));
        }
        if let Some(size) = options.dkim_key_size {
            form.push(("dkim_key_size", size.to_string()));
        }

        let request = self.request(Method::POST, &["domains"])?.form(&form);
        self.send(request, "create domain").await?;
        Ok(())
    }

    async fn get_domain(&self, name: &str) -> Result<Option<DomainDetails>> {
        let request = self.request(Method::GET, &["domains", name])?;
        let Some(response) = self.send_lookup(request, "get domain").await? else {
            return Ok(None);
        };

        let body: DomainResponse = parse(response, "get domain").await?;
        Ok(Some(DomainDetails {
            domain: body.domain,
            receiving_dns_records: body.receiving_dns_records.into_iter().map(Into::into).collect(),
            sending_dns_records: body.sending_dns_records.into_iter().map(Into::into).collect(),
        }))
    }

    async fn delete_domain(&self, name: &str) -> Result<()> {
        let request = self.request(Method::DELETE, &["domains", name])?;
        self.send(request, "delete domain").await?;
        Ok(())
    }

    async fn get_domain_tracking(&self, name: &str) -> Result<DomainTracking> {
        let request = self.request(Method::GET, &["domains", name, "tracking"])?;
        let response = self.send(request, "get domain tracking").await?;
        let body: TrackingResponse = parse(response, "get domain tracking").await?;
        Ok(body.tracking.into())
    }

    async fn update_open_tracking(&self, name: &str, active: bool) -> Result<()> {
        let request = self.request(Method::PUT, &["domains", name, "tracking", "open"])?
            .form(&[("active", yes_no(active))]);
        self.send(request, "update open tracking").await?;
        Ok(())
    }

    async fn update_dkim_selector(&self, name: &str, selector: &str) -> Result<()> {
        let request = self.request(Method::PUT, &["domains", name, "dkim_selector"])?
            .form(&[("dkim_selector", selector)]);
        self.send(request, "update DKIM selector").await?;
        Ok(())
    }

    async fn create_route(&self, options: &RouteOptions) -> Result<Route> {
        let request = self.request(Method::POST, &["routes"])?.form(&route_form(options));
        let response = self.send(request, "create route").await?;
        let body: RouteEnvelope = parse(response, "create route").await?;
        Ok(body.into_route())
    }

    async fn get_route(&self, id: &str) -> Result<Option<Route>> {
        let request = self.request(Method::GET, &["routes", id])?;
        let Some(response) = self.send_lookup(request, "get route").await? else {
            return Ok(None);
        };
        let body: RouteEnvelope = parse(response, "get route").await?;
        Ok(Some(body.into_route()))
    }

    async fn update_route(&self, id: &str, options: &RouteOptions) -> Result<Route> {
        let request = self.request(Method::PUT, &["routes", id])?
            .form(&route_form(options));
        let response = self.send(request, "update route").await?;
        let body: RouteEnvelope = parse(response, "update route").await?;
        Ok(body.into_route())
    }

    async fn delete_route(&self, id: &str) -> Result<()> {
        let request = self.request(Method::DELETE, &["routes", id])?;
        self.send(request, "delete route").await?;
        Ok(())
    }

    async fn create_credential(&self, domain: &str, login: &str, password: &str) -> Result<()> {
        let request = self.request(Method::POST, &["domains", domain, "credentials"])?
            .form(&[("login", login), ("password", password)]);
        self.send(request, "create credential").await?;
        Ok(())
    }

    async fn change_credential_password(
        &self,
        domain: &str,
        login: &str,
        password: &str,
    ) -> Result<()> {
        let request = self
            .request(Method::PUT, &["domains", domain, "credentials", login])?
            .form(&[("password", password)]);
        self.send(request, "change credential password").await?;
        Ok(())
    }

    async fn delete_credential(&self, domain: &str, login: &str) -> Result<()> {
        let request = self.request(Method::DELETE, &["domains", domain, "credentials", login])?;
        self.send(request, "delete credential").await?;
        Ok(())
    }

    async fn list_credentials(&self, domain: &str) -> Result<Vec<Credential>> {
        let mut credentials = Vec::new();

        loop {
            let request = self.request(Method::GET, &["domains", domain, "credentials"])?
                .query(&[
                    ("limit", CREDENTIALS_PAGE_SIZE),
                    ("skip", credentials.len()),
                ]);

            let Some(response) = self.send_lookup(request, "list credentials").await? else {
                // Unknown domain: nothing to list
                return Ok(credentials);
            };
            let page: CredentialsPage = parse(response, "list credentials").await?;

            let fetched = page.items.len();
            credentials.extend(page.items);

            let complete = match page.total_count {
                Some(total) => credentials.len() >= total,
                None => fetched < CREDENTIALS_PAGE_SIZE,
            };
            if fetched == 0 || complete {
                break;
            }
        }

        tracing::debug!("Listed {} credential(s) for {}", credentials.len(), domain);
        Ok(credentials)
    }

    async fn create_webhook(&self, domain: &str, kind: WebhookKind, urls: &[String]) -> Result<()> {
        let mut form = vec![("id", kind.to_string())];
        form.extend(webhook_form(urls));

        let request = self.request(Method::POST, &["domains", domain, "webhooks"])?
            .form(&form);
        self.send(request, "create webhook").await?;
        Ok(())
    }

    async fn get_webhook(&self, domain: &str, kind: WebhookKind) -> Result<Option<Vec<String>>> {
        let request =
            self.request(Method::GET, &["domains", domain, "webhooks", kind.as_str()])?;
        let Some(response) = self.send_lookup(request, "get webhook").await? else {
            return Ok(None);
        };
        let body: WebhookResponse = parse(response, "get webhook").await?;
        Ok(Some(body.webhook.into_urls()))
    }

    async fn update_webhook(&self, domain: &str, kind: WebhookKind, urls: &[String]) -> Result<()> {
        let request = self
            .request(Method::PUT, &["domains", domain, "webhooks", kind.as_str()])?
            .form(&webhook_form(urls));
        self.send(request, "update webhook").await?;
        Ok(())
    }

    async fn delete_webhook(&self, domain: &str, kind: WebhookKind) -> Result<()> {
        let request =
            self.request(Method::DELETE, &["domains", domain, "webhooks", kind.as_str()])?;
        self.send(request, "delete webhook").await?;
        Ok(())
    }
}

/// Factory for creating Mailgun HTTP clients
pub struct HttpClientFactory;

impl MailgunApiFactory for HttpClientFactory {
    fn create(&self, config: &ProviderConfig, region: Region) -> Result<Box<dyn MailgunApi>> {
        if config.api_key.trim().is_empty() {
            return Err(Error::config("Mailgun API key is required"));
        }

        let client = MailgunClient::from_config(config, region)?;
        tracing::debug!("Created Mailgun client for region {} at {}", region, client.base_url());
        Ok(Box::new(client))
    }
}
