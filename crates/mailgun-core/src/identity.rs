// # Identity / Import Codec
//
// Every importable resource accepts an identifier of the form
// `[region:]natural-key`. The codec splits on the first colon only, so the
// natural key may itself contain colons (webhooks use `domain:kind`).
//
// ## Fallback
//
// If the split does not produce two non-empty parts, the region defaults to
// `us` and the whole original string becomes the key. This includes inputs
// with one empty side such as `"us:"` or `":abc"`; the per-kind decoders are
// responsible for rejecting keys that make no sense for them.
//
// | input              | region | key               |
// |--------------------|--------|-------------------|
// | `example.com`      | `us`   | `example.com`     |
// | `eu:example.com`   | `eu`   | `example.com`     |
// | `us:a.com:opened`  | `us`   | `a.com:opened`    |
// | `:abc`             | `us`   | `:abc`            |

use crate::error::{Error, Result};
use crate::model::Region;

/// Region assumed when the identifier carries none
pub const DEFAULT_REGION: &str = "us";

/// A decoded import identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    /// Region tag, not yet validated
    pub region: String,
    /// Natural key of the entity
    pub key: String,
    raw: String,
}

impl ImportId {
    /// Decode a user-supplied import string
    pub fn parse(raw: &str) -> Self {
        let (region, key) = match raw.split_once(':') {
            Some((region, key)) if !region.is_empty() && !key.is_empty() => {
                (region.to_string(), key.to_string())
            }
            _ => (DEFAULT_REGION.to_string(), raw.to_string()),
        };

        Self {
            region,
            key,
            raw: raw.to_string(),
        }
    }

    /// The string this identifier was decoded from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Validate the region tag
    pub fn region(&self) -> Result<Region> {
        self.region
            .parse()
            .map_err(|_| self.malformed(format!("unknown region '{}'", self.region)))
    }

    /// The natural key, rejecting an empty one
    pub fn non_empty_key(&self) -> Result<&str> {
        if self.key.trim().is_empty() {
            return Err(self.malformed("identifier is empty"));
        }
        Ok(&self.key)
    }

    /// Build a malformed-import error for this identifier
    pub fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::malformed_import(&self.raw, reason)
    }
}
