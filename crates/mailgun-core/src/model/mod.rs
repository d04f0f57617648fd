//! Typed desired-state and observed-state models
//!
//! Each managed entity kind has a `*Spec` (what the user asked for) and a
//! `*State` (what was last observed on Mailgun). Enumerated fields are enums,
//! so unknown values are rejected when a manifest is parsed rather than when
//! the remote call is made.
//!
//! - [`domain`]: sending domains and their DNS records
//! - [`route`]: inbound routes
//! - [`credential`]: SMTP credentials of a domain
//! - [`webhook`]: event webhooks of a domain

pub mod credential;
pub mod domain;
pub mod region;
pub mod route;
pub mod webhook;

pub use credential::{CredentialSpec, CredentialState};
pub use domain::{DnsRecord, DomainSpec, DomainState, PlannedRecords, SpamAction};
pub use region::Region;
pub use route::{RouteSpec, RouteState};
pub use webhook::{WebhookKind, WebhookSpec, WebhookState};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The kinds of entity this provider manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "mailgun_domain")]
    Domain,
    #[serde(rename = "mailgun_route")]
    Route,
    #[serde(rename = "mailgun_domain_credential")]
    Credential,
    #[serde(rename = "mailgun_webhook")]
    Webhook,
}

impl ResourceKind {
    /// Kinds in creation order; deletion runs in reverse
    pub const CREATE_ORDER: [ResourceKind; 4] = [
        ResourceKind::Domain,
        ResourceKind::Route,
        ResourceKind::Credential,
        ResourceKind::Webhook,
    ];

    /// Resource type name as written in manifests and addresses
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Domain => "mailgun_domain",
            ResourceKind::Route => "mailgun_route",
            ResourceKind::Credential => "mailgun_domain_credential",
            ResourceKind::Webhook => "mailgun_webhook",
        }
    }

    /// Position in [`Self::CREATE_ORDER`]
    pub fn create_rank(&self) -> usize {
        match self {
            ResourceKind::Domain => 0,
            ResourceKind::Route => 1,
            ResourceKind::Credential => 2,
            ResourceKind::Webhook => 3,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::CREATE_ORDER
            .into_iter()
            .find(|kind| kind.type_name() == s)
            .ok_or_else(|| Error::validation("type", format!("unknown resource type '{}'", s)))
    }
}

/// Desired state of any managed entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResourceConfig {
    #[serde(rename = "mailgun_domain")]
    Domain(DomainSpec),
    #[serde(rename = "mailgun_route")]
    Route(RouteSpec),
    #[serde(rename = "mailgun_domain_credential")]
    Credential(CredentialSpec),
    #[serde(rename = "mailgun_webhook")]
    Webhook(WebhookSpec),
}

impl ResourceConfig {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceConfig::Domain(_) => ResourceKind::Domain,
            ResourceConfig::Route(_) => ResourceKind::Route,
            ResourceConfig::Credential(_) => ResourceKind::Credential,
            ResourceConfig::Webhook(_) => ResourceKind::Webhook,
        }
    }

    /// Check field-level constraints before anything is sent to Mailgun
    pub fn validate(&self) -> Result<()> {
        match self {
            ResourceConfig::Domain(spec) => spec.validate(),
            ResourceConfig::Route(spec) => spec.validate(),
            ResourceConfig::Credential(spec) => spec.validate(),
            ResourceConfig::Webhook(spec) => spec.validate(),
        }
    }
}

/// Observed state of any managed entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "attributes")]
pub enum ResourceState {
    #[serde(rename = "mailgun_domain")]
    Domain(DomainState),
    #[serde(rename = "mailgun_route")]
    Route(RouteState),
    #[serde(rename = "mailgun_domain_credential")]
    Credential(CredentialState),
    #[serde(rename = "mailgun_webhook")]
    Webhook(WebhookState),
}

impl ResourceState {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceState::Domain(_) => ResourceKind::Domain,
            ResourceState::Route(_) => ResourceKind::Route,
            ResourceState::Credential(_) => ResourceKind::Credential,
            ResourceState::Webhook(_) => ResourceKind::Webhook,
        }
    }

    /// Identity key addressing the remote entity
    pub fn identity(&self) -> String {
        match self {
            ResourceState::Domain(s) => s.identity(),
            ResourceState::Route(s) => s.identity(),
            ResourceState::Credential(s) => s.identity(),
            ResourceState::Webhook(s) => s.identity(),
        }
    }
}

impl From<DomainSpec> for ResourceConfig {
    fn from(spec: DomainSpec) -> Self {
        ResourceConfig::Domain(spec)
    }
}

impl From<RouteSpec> for ResourceConfig {
    fn from(spec: RouteSpec) -> Self {
        ResourceConfig::Route(spec)
    }
}

impl From<CredentialSpec> for ResourceConfig {
    fn from(spec: CredentialSpec) -> Self {
        ResourceConfig::Credential(spec)
    }
}

impl From<WebhookSpec> for ResourceConfig {
    fn from(spec: WebhookSpec) -> Self {
        ResourceConfig::Webhook(spec)
    }
}

impl From<DomainState> for ResourceState {
    fn from(state: DomainState) -> Self {
        ResourceState::Domain(state)
    }
}

impl From<RouteState> for ResourceState {
    fn from(state: RouteState) -> Self {
        ResourceState::Route(state)
    }
}

impl From<CredentialState> for ResourceState {
    fn from(state: CredentialState) -> Self {
        ResourceState::Credential(state)
    }
}

impl From<WebhookState> for ResourceState {
    fn from(state: WebhookState) -> Self {
        ResourceState::Webhook(state)
    }
}

/// Reject an empty (or whitespace-only) required string field
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_type_name() {
        for kind in ResourceKind::CREATE_ORDER {
            assert_eq!(kind.type_name().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("mailgun_template".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn config_is_tagged_by_type() {
        let config: ResourceConfig = serde_json::from_value(serde_json::json!({
            "type": "mailgun_webhook",
            "domain": "example.com",
            "kind": "delivered",
            "urls": ["https://hooks.example.com/delivered"]
        }))
        .unwrap();

        assert_eq!(config.kind(), ResourceKind::Webhook);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_webhook_kind_rejected_at_parse_time() {
        let result: std::result::Result<ResourceConfig, _> =
            serde_json::from_value(serde_json::json!({
                "type": "mailgun_webhook",
                "domain": "example.com",
                "kind": "bounced",
                "urls": ["https://hooks.example.com"]
            }));

        assert!(result.is_err());
    }
}
