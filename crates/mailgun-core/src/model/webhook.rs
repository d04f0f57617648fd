use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::{Region, require_non_empty};
use crate::error::{Error, Result};
use crate::identity::ImportId;

/// Event a webhook fires on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    Clicked,
    Complained,
    Delivered,
    Opened,
    PermanentFail,
    TemporaryFail,
    Unsubscribed,
}

impl WebhookKind {
    pub const ALL: [WebhookKind; 7] = [
        WebhookKind::Clicked,
        WebhookKind::Complained,
        WebhookKind::Delivered,
        WebhookKind::Opened,
        WebhookKind::PermanentFail,
        WebhookKind::TemporaryFail,
        WebhookKind::Unsubscribed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookKind::Clicked => "clicked",
            WebhookKind::Complained => "complained",
            WebhookKind::Delivered => "delivered",
            WebhookKind::Opened => "opened",
            WebhookKind::PermanentFail => "permanent_fail",
            WebhookKind::TemporaryFail => "temporary_fail",
            WebhookKind::Unsubscribed => "unsubscribed",
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                Error::validation("kind", format!("kind must be one of {}", allowed.join(", ")))
            })
    }
}

/// Desired state of a domain webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSpec {
    #[serde(default)]
    pub region: Region,
    pub domain: String,
    pub kind: WebhookKind,
    pub urls: BTreeSet<String>,
}

impl WebhookSpec {
    pub fn new<I, S>(domain: impl Into<String>, kind: WebhookKind, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            region: Region::default(),
            domain: domain.into(),
            kind,
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("domain", &self.domain)?;
        if self.urls.is_empty() {
            return Err(Error::validation("urls", "at least one URL is required"));
        }
        for url in &self.urls {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(Error::validation(
                    "urls",
                    format!("'{}' must use the http or https scheme", url),
                ));
            }
        }
        Ok(())
    }

    /// Decode `region:domain:kind`
    pub fn key_from_import(raw: &str) -> Result<(Region, String, WebhookKind)> {
        let id = ImportId::parse(raw);
        let region = id.region()?;
        let key = id.non_empty_key()?;

        let (domain, kind) = key
            .split_once(':')
            .filter(|(domain, kind)| !domain.is_empty() && !kind.is_empty())
            .ok_or_else(|| id.malformed("expected region:domain:kind"))?;

        let kind = kind
            .parse::<WebhookKind>()
            .map_err(|e| id.malformed(e.to_string()))?;

        Ok((region, domain.to_string(), kind))
    }
}

/// Observed state of a domain webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookState {
    pub region: Region,
    pub domain: String,
    pub kind: WebhookKind,
    pub urls: BTreeSet<String>,
}

impl WebhookState {
    /// `region:domain:kind`
    pub fn identity(&self) -> String {
        format!("{}:{}:{}", self.region, self.domain, self.kind)
    }
}
