use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Region, require_non_empty};
use crate::error::{Error, Result};
use crate::hashcode::RecordSet;
use crate::identity::ImportId;

/// Mailgun's standard inbound MX hosts
pub const MAILGUN_MX_HOSTS: [&str; 2] = ["mxa.mailgun.org", "mxb.mailgun.org"];

/// DKIM key sizes Mailgun accepts
pub const DKIM_KEY_SIZES: [u32; 2] = [1024, 2048];

/// What Mailgun does with messages it classifies as spam
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpamAction {
    #[default]
    Disabled,
    Tag,
    Block,
}

impl SpamAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamAction::Disabled => "disabled",
            SpamAction::Tag => "tag",
            SpamAction::Block => "block",
        }
    }
}

impl fmt::Display for SpamAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpamAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disabled" => Ok(SpamAction::Disabled),
            "tag" => Ok(SpamAction::Tag),
            "block" => Ok(SpamAction::Block),
            other => Err(Error::validation(
                "spam_action",
                format!("'{}' is not one of: disabled, tag, block", other),
            )),
        }
    }
}

/// Desired state of a sending domain
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Domain name (force-new)
    pub name: String,

    #[serde(default)]
    pub region: Region,

    #[serde(default)]
    pub spam_action: SpamAction,

    /// Password of the domain's default SMTP login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_password: Option<String>,

    #[serde(default)]
    pub wildcard: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dkim_selector: Option<String>,

    #[serde(default)]
    pub force_dkim_authority: bool,

    #[serde(default)]
    pub open_tracking: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dkim_key_size: Option<u32>,
}

// Hides the SMTP password
impl fmt::Debug for DomainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainSpec")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("spam_action", &self.spam_action)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "<REDACTED>"))
            .field("wildcard", &self.wildcard)
            .field("dkim_selector", &self.dkim_selector)
            .field("force_dkim_authority", &self.force_dkim_authority)
            .field("open_tracking", &self.open_tracking)
            .field("dkim_key_size", &self.dkim_key_size)
            .finish()
    }
}

impl DomainSpec {
    /// A domain with every optional field at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: Region::default(),
            spam_action: SpamAction::default(),
            smtp_password: None,
            wildcard: false,
            dkim_selector: None,
            force_dkim_authority: false,
            open_tracking: false,
            dkim_key_size: None,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn with_spam_action(mut self, spam_action: SpamAction) -> Self {
        self.spam_action = spam_action;
        self
    }

    pub fn with_smtp_password(mut self, password: impl Into<String>) -> Self {
        self.smtp_password = Some(password.into());
        self
    }

    pub fn with_wildcard(mut self, wildcard: bool) -> Self {
        self.wildcard = wildcard;
        self
    }

    pub fn with_dkim_selector(mut self, selector: impl Into<String>) -> Self {
        self.dkim_selector = Some(selector.into());
        self
    }

    pub fn with_open_tracking(mut self, open_tracking: bool) -> Self {
        self.open_tracking = open_tracking;
        self
    }

    pub fn with_dkim_key_size(mut self, size: u32) -> Self {
        self.dkim_key_size = Some(size);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;

        if let Some(size) = self.dkim_key_size
            && !DKIM_KEY_SIZES.contains(&size)
        {
            return Err(Error::validation(
                "dkim_key_size",
                format!("{} is not one of: 1024, 2048", size),
            ));
        }

        if let Some(selector) = &self.dkim_selector {
            require_non_empty("dkim_selector", selector)?;
        }

        if let Some(password) = &self.smtp_password {
            require_non_empty("smtp_password", password)?;
        }

        Ok(())
    }

    /// Decode `[region:]name`
    pub fn key_from_import(raw: &str) -> Result<(Region, String)> {
        let id = ImportId::parse(raw);
        let region = id.region()?;
        let name = id.non_empty_key()?;
        Ok((region, name.to_string()))
    }
}

/// A DNS record Mailgun asks the domain owner to publish
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Set-membership id: the value for receiving records, the name for
    /// sending records (`_domainkey.<domain>` for the DKIM record)
    pub id: String,
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

/// Observed state of a sending domain
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainState {
    pub name: String,
    pub region: Region,
    pub spam_action: SpamAction,
    pub wildcard: bool,
    pub smtp_login: String,

    /// Last applied password; Mailgun never returns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_password: Option<String>,

    pub open_tracking: bool,

    // Creation-time options Mailgun does not echo back; carried from the
    // last applied spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dkim_selector: Option<String>,
    #[serde(default)]
    pub force_dkim_authority: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dkim_key_size: Option<u32>,

    #[serde(default)]
    pub receiving_records: Vec<DnsRecord>,
    #[serde(default)]
    pub sending_records: Vec<DnsRecord>,
}

impl fmt::Debug for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainState")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("spam_action", &self.spam_action)
            .field("wildcard", &self.wildcard)
            .field("smtp_login", &self.smtp_login)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "<REDACTED>"))
            .field("open_tracking", &self.open_tracking)
            .field("receiving_records", &self.receiving_records.len())
            .field("sending_records", &self.sending_records.len())
            .finish()
    }
}

impl DomainState {
    pub fn identity(&self) -> String {
        self.name.clone()
    }

    pub fn receiving_records_set(&self) -> RecordSet {
        self.receiving_records.iter().cloned().collect()
    }

    pub fn sending_records_set(&self) -> RecordSet {
        self.sending_records.iter().cloned().collect()
    }
}

/// Record ids expected once a domain with the given name exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRecords {
    pub sending: Vec<String>,
    pub receiving: Vec<String>,
}

impl PlannedRecords {
    pub fn for_domain(name: &str) -> Self {
        Self {
            sending: vec![
                name.to_string(),
                format!("_domainkey.{}", name),
                format!("email.{}", name),
            ],
            receiving: MAILGUN_MX_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}
