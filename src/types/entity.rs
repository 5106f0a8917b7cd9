//! Entity metadata record types.
//!
//! An [`EntityDescriptor`] is one party's metadata: its identifier, the
//! author-declared validity and caching hints, and the roles it plays with
//! their endpoints. The resolver treats it as mostly opaque; it only reads
//! the identifier, the validity hints, and whatever the configured indexes
//! extract.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::role::{EndpointType, RoleType};
use crate::Result;

/// Metadata for a single federation entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Unique entity identifier (usually a URI).
    pub entity_id: String,
    /// Absolute instant after which the document must not be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Author's hint for how long the document may be cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration_secs: Option<u64>,
    /// Roles this entity plays.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleDescriptor>,
    /// Document bytes exactly as received, when parsed from bytes.
    #[serde(skip)]
    source: Option<Arc<[u8]>>,
}

impl PartialEq for EntityDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
            && self.valid_until == other.valid_until
            && self.cache_duration_secs == other.cache_duration_secs
            && self.roles == other.roles
    }
}

impl EntityDescriptor {
    /// Create a descriptor with no roles and no validity hints.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    /// Set the absolute validity bound.
    pub fn valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    /// Set the cache duration hint.
    pub fn cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration_secs = Some(duration.as_secs());
        self
    }

    /// Add a role.
    pub fn role(mut self, role: RoleDescriptor) -> Self {
        self.roles.push(role);
        self
    }

    /// Parse a JSON document, retaining the raw bytes.
    ///
    /// Persistent stores write retained bytes back verbatim, so a document
    /// round-trips through the cache byte-for-byte.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let mut descriptor: Self = serde_json::from_slice(bytes)?;
        descriptor.source = Some(Arc::from(bytes));
        Ok(descriptor)
    }

    /// Raw bytes this descriptor was parsed from, if any.
    pub fn source_bytes(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    /// Serialized form: the retained source bytes, or fresh JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.source {
            Some(bytes) => Ok(bytes.to_vec()),
            None => Ok(serde_json::to_vec_pretty(self)?),
        }
    }

    /// Trimmed entity ID, or `None` if blank.
    pub fn trimmed_entity_id(&self) -> Option<&str> {
        let id = self.entity_id.trim();
        (!id.is_empty()).then_some(id)
    }

    /// Roles of the given type.
    pub fn roles_of<'a>(&'a self, role_type: &'a RoleType) -> impl Iterator<Item = &'a RoleDescriptor> {
        self.roles.iter().filter(move |r| &r.role_type == role_type)
    }

    /// Earliest author-declared expiration, bounded above by `upper_bound`.
    ///
    /// Considers `valid_until` and `now + cache_duration` on the descriptor
    /// and on every role.
    pub fn earliest_expiration(&self, upper_bound: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut earliest = upper_bound;
        let mut consider = |valid_until: Option<DateTime<Utc>>, cache_secs: Option<u64>| {
            if let Some(valid_until) = valid_until {
                earliest = earliest.min(valid_until);
            }
            if let Some(cached_until) = cache_secs.and_then(|secs| add_secs(now, secs)) {
                earliest = earliest.min(cached_until);
            }
        };

        consider(self.valid_until, self.cache_duration_secs);
        for role in &self.roles {
            consider(role.valid_until, role.cache_duration_secs);
        }
        earliest
    }

    /// Whether neither the descriptor nor any role is past its `valid_until`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let current = |valid_until: Option<DateTime<Utc>>| valid_until.is_none_or(|t| t > now);
        current(self.valid_until) && self.roles.iter().all(|r| current(r.valid_until))
    }
}

fn add_secs(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    now.checked_add_signed(TimeDelta::try_seconds(secs)?)
}

/// One role an entity plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub role_type: RoleType,
    /// Supported protocol URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
    /// Hex-encoded artifact source IDs declared in the role's extensions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ids: Vec<String>,
}

impl RoleDescriptor {
    /// Create an empty role of the given type.
    pub fn new(role_type: RoleType) -> Self {
        Self {
            role_type,
            protocols: Vec::new(),
            valid_until: None,
            cache_duration_secs: None,
            endpoints: Vec::new(),
            source_ids: Vec::new(),
        }
    }

    /// Add a supported protocol.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Add an endpoint.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Add a hex-encoded artifact source ID.
    pub fn source_id(mut self, hex_value: impl Into<String>) -> Self {
        self.source_ids.push(hex_value.into());
        self
    }

    /// Set the role's validity bound.
    pub fn valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocols.iter().any(|p| p == protocol)
    }
}

/// A typed protocol endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub endpoint_type: EndpointType,
    /// Binding URI.
    pub binding: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_location: Option<String>,
}

impl Endpoint {
    pub fn new(endpoint_type: EndpointType, binding: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            endpoint_type,
            binding: binding.into(),
            location: location.into(),
            response_location: None,
        }
    }

    /// Set the response location.
    pub fn response_location(mut self, location: impl Into<String>) -> Self {
        self.response_location = Some(location.into());
        self
    }
}
