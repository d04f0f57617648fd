//! Desired-state manifest
//!
//! A manifest lists resource blocks; each block has a type, a name unique
//! within its type, and the type's configuration:
//!
//! ```json
//! {
//!   "resources": [
//!     {
//!       "type": "mailgun_domain",
//!       "name": "main",
//!       "config": { "name": "example.com", "spam_action": "disabled" }
//!     },
//!     {
//!       "type": "mailgun_webhook",
//!       "name": "delivered",
//!       "config": {
//!         "domain": "example.com",
//!         "kind": "delivered",
//!         "urls": ["https://hooks.example.com/delivered"]
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! A block is addressed as `<type>.<name>`, e.g. `mailgun_domain.main`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::{ResourceConfig, ResourceKind};

/// `<type>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub kind: ResourceKind,
    pub name: String,
}

impl Address {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// Block names must be non-blank and dot-free so an address splits back
/// into exactly one type and one name
fn validate_block_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('.') {
        return Err(Error::validation(
            "name",
            format!("'{}' is not a valid block name", name),
        ));
    }
    Ok(())
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| Error::validation("address", format!("'{}' is not <type>.<name>", s)))?;
        validate_block_name(name)?;

        Ok(Self::new(kind.parse()?, name))
    }
}

/// One resource block
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBlock {
    pub name: String,
    pub config: ResourceConfig,
}

impl ResourceBlock {
    pub fn new(name: impl Into<String>, config: impl Into<ResourceConfig>) -> Self {
        Self {
            name: name.into(),
            config: config.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.config.kind()
    }

    pub fn address(&self) -> Address {
        Address::new(self.kind(), self.name.clone())
    }
}

/// On-disk shape of a block, before the config is typed
#[derive(Debug, Serialize, Deserialize)]
struct RawBlock {
    #[serde(rename = "type")]
    kind: ResourceKind,
    name: String,
    #[serde(default)]
    config: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawManifest {
    #[serde(default)]
    resources: Vec<RawBlock>,
}

/// Validated set of resource blocks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    blocks: Vec<ResourceBlock>,
}

impl Manifest {
    /// Build from blocks, rejecting duplicates and invalid configuration
    pub fn new(blocks: Vec<ResourceBlock>) -> Result<Self> {
        let mut seen = HashSet::new();
        for block in &blocks {
            validate_block_name(&block.name)?;

            let address = block.address();
            if !seen.insert(address.clone()) {
                return Err(Error::validation(
                    "resources",
                    format!("duplicate resource {}", address),
                ));
            }

            block
                .config
                .validate()
                .map_err(|e| e.context(format!("validating {}", address)))?;
        }

        Ok(Self { blocks })
    }

    /// Parse a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(text)?;

        let blocks = raw
            .resources
            .into_iter()
            .map(|raw| {
                let address = Address::new(raw.kind, raw.name.clone());
                let config = typed_config(raw.kind, raw.config)
                    .map_err(|e| e.context(format!("parsing {}", address)))?;
                Ok(ResourceBlock::new(raw.name, config))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(blocks)
    }

    /// Read and parse a manifest file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;

        tracing::debug!("Loaded manifest from {}", path.display());
        Self::from_json(&text)
    }

    pub fn blocks(&self) -> &[ResourceBlock] {
        &self.blocks
    }

    pub fn get(&self, address: &Address) -> Option<&ResourceBlock> {
        self.blocks.iter().find(|b| &b.address() == address)
    }

    /// Blocks in creation order, manifest order within a kind
    pub fn in_create_order(&self) -> Vec<&ResourceBlock> {
        let mut blocks: Vec<&ResourceBlock> = self.blocks.iter().collect();
        blocks.sort_by_key(|b| b.kind().create_rank());
        blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn typed_config(kind: ResourceKind, value: serde_json::Value) -> Result<ResourceConfig> {
    let config = match kind {
        ResourceKind::Domain => ResourceConfig::Domain(serde_json::from_value(value)?),
        ResourceKind::Route => ResourceConfig::Route(serde_json::from_value(value)?),
        ResourceKind::Credential => ResourceConfig::Credential(serde_json::from_value(value)?),
        ResourceKind::Webhook => ResourceConfig::Webhook(serde_json::from_value(value)?),
    };
    Ok(config)
}
