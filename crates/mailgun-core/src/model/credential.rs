use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Region, require_non_empty};
use crate::error::Result;
use crate::identity::ImportId;

/// Desired state of an SMTP credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSpec {
    #[serde(default)]
    pub region: Region,
    pub domain: String,
    pub login: String,
    pub password: String,
}

impl fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSpec")
            .field("region", &self.region)
            .field("domain", &self.domain)
            .field("login", &self.login)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl CredentialSpec {
    pub fn new(
        domain: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            region: Region::default(),
            domain: domain.into(),
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("domain", &self.domain)?;
        require_non_empty("login", &self.login)?;
        require_non_empty("password", &self.password)
    }

    /// Decode `[region:]login@domain`
    ///
    /// Splits on the last `@`, so a login that is itself an address still
    /// decodes.
    pub fn key_from_import(raw: &str) -> Result<(Region, String, String)> {
        let id = ImportId::parse(raw);
        let region = id.region()?;
        let key = id.non_empty_key()?;

        match key.rsplit_once('@') {
            Some((login, domain)) if !login.is_empty() && !domain.is_empty() => {
                Ok((region, login.to_string(), domain.to_string()))
            }
            _ => Err(id.malformed("expected [region:]login@domain")),
        }
    }
}

/// Observed state of an SMTP credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    pub region: Region,
    pub domain: String,
    pub login: String,

    /// Last applied password; Mailgun never returns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialState")
            .field("region", &self.region)
            .field("domain", &self.domain)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl CredentialState {
    /// `login@domain`
    pub fn identity(&self) -> String {
        format!("{}@{}", self.login, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn import_splits_login_and_domain() {
        let (region, login, domain) =
            CredentialSpec::key_from_import("eu:alice@example.com").unwrap();
        assert_eq!(region, Region::Eu);
        assert_eq!(login, "alice");
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn import_without_at_is_malformed() {
        let err = CredentialSpec::key_from_import("us:alice").unwrap_err();
        assert!(matches!(err, Error::MalformedImport { .. }));

        let err = CredentialSpec::key_from_import("@example.com").unwrap_err();
        assert!(matches!(err, Error::MalformedImport { .. }));
    }

    #[test]
    fn identity_is_login_at_domain() {
        let state = CredentialState {
            region: Region::Us,
            domain: "example.com".to_string(),
            login: "alice".to_string(),
            password: Some("secret".to_string()),
            created_at: None,
        };
        assert_eq!(state.identity(), "alice@example.com");
        assert!(!format!("{:?}", state).contains("secret"));
    }
}
