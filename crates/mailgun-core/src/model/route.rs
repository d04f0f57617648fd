use serde::{Deserialize, Serialize};

use super::{Region, require_non_empty};
use crate::error::{Error, Result};
use crate::identity::ImportId;

/// Desired state of an inbound route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(default)]
    pub region: Region,

    /// Lower numbers are evaluated first
    pub priority: i64,

    #[serde(default)]
    pub description: String,

    /// Filter expression, e.g. `match_recipient(".*@example.com")`
    pub expression: String,

    /// Actions run in order when the expression matches
    pub actions: Vec<String>,
}

impl RouteSpec {
    pub fn new(priority: i64, expression: impl Into<String>, actions: Vec<String>) -> Self {
        Self {
            region: Region::default(),
            priority,
            description: String::new(),
            expression: expression.into(),
            actions,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.priority < 0 {
            return Err(Error::validation("priority", "must not be negative"));
        }
        require_non_empty("expression", &self.expression)?;
        if self.actions.is_empty() {
            return Err(Error::validation("actions", "at least one action is required"));
        }
        for action in &self.actions {
            require_non_empty("actions", action)?;
        }
        Ok(())
    }

    /// Decode `[region:]route_id`
    pub fn key_from_import(raw: &str) -> Result<(Region, String)> {
        let id = ImportId::parse(raw);
        let region = id.region()?;
        let route_id = id.non_empty_key()?;
        Ok((region, route_id.to_string()))
    }
}

/// Observed state of an inbound route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteState {
    /// Remote-assigned id
    pub id: String,
    pub region: Region,
    pub priority: i64,
    #[serde(default)]
    pub description: String,
    pub expression: String,
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl RouteState {
    pub fn identity(&self) -> String {
        self.id.clone()
    }
}
