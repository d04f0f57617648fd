use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// US API endpoint
pub const US_API_BASE: &str = "https://api.mailgun.net/v3";

/// EU API endpoint
pub const EU_API_BASE: &str = "https://api.eu.mailgun.net/v3";

/// Mailgun hosting region
///
/// Each region is served by its own API endpoint and keeps its own set of
/// domains, routes and credentials. Written lowercase, read in any case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    /// All supported regions
    pub const ALL: [Region; 2] = [Region::Us, Region::Eu];

    /// Lowercase tag used in identity keys and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "us",
            Region::Eu => "eu",
        }
    }

    /// Base URL of the v3 API for this region
    pub fn api_base(&self) -> &'static str {
        match self {
            Region::Us => US_API_BASE,
            Region::Eu => EU_API_BASE,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(Region::Us),
            "eu" => Ok(Region::Eu),
            other => Err(Error::validation(
                "region",
                format!("unknown region '{}', expected one of: us, eu", other),
            )),
        }
    }
}

impl TryFrom<String> for Region {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("EU".parse::<Region>().unwrap(), Region::Eu);
        assert_eq!("us".parse::<Region>().unwrap(), Region::Us);
        assert!("ap".parse::<Region>().is_err());
    }

    #[test]
    fn deserializes_any_case_and_writes_lowercase() {
        let region: Region = serde_json::from_str("\"EU\"").unwrap();
        assert_eq!(region, Region::Eu);
        assert_eq!(serde_json::to_string(&region).unwrap(), "\"eu\"");

        let err = serde_json::from_str::<Region>("\"ap\"").unwrap_err();
        assert!(err.to_string().contains("unknown region"));
    }

    #[test]
    fn each_region_has_its_own_endpoint() {
        assert_eq!(Region::Us.api_base(), "https://api.mailgun.net/v3");
        assert_eq!(Region::Eu.api_base(), "https://api.eu.mailgun.net/v3");
        assert_eq!(Region::default(), Region::Us);
    }
}
