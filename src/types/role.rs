//! Role and endpoint type names.
//!
//! Federation metadata describes each party through one or more roles
//! (identity provider, service provider, attribute authority, ...), each of
//! which publishes typed endpoints. Both sets of names are open: the
//! well-known variants cover the standard SAML 2.0 surface, and `Other(String)`
//! carries anything else without requiring a release.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Well-known role descriptor types with an `Other` escape hatch.
///
/// Serializes as the SAML element name (e.g. `"SPSSODescriptor"`), so it works
/// both as a JSON value and as a JSON object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleType {
    IdpSso,
    SpSso,
    AttributeAuthority,
    AuthnAuthority,
    Pdp,
    /// Role not in the well-known set (e.g. an extension role).
    Other(String),
}

impl RoleType {
    /// Canonical SAML element name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::IdpSso => "IDPSSODescriptor",
            Self::SpSso => "SPSSODescriptor",
            Self::AttributeAuthority => "AttributeAuthorityDescriptor",
            Self::AuthnAuthority => "AuthnAuthorityDescriptor",
            Self::Pdp => "PDPDescriptor",
            Self::Other(s) => s.as_str(),
        }
    }

    fn from_name(s: &str) -> Self {
        match s {
            "IDPSSODescriptor" => Self::IdpSso,
            "SPSSODescriptor" => Self::SpSso,
            "AttributeAuthorityDescriptor" => Self::AttributeAuthority,
            "AuthnAuthorityDescriptor" => Self::AuthnAuthority,
            "PDPDescriptor" => Self::Pdp,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Serialize for RoleType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_name(&s))
    }
}

/// Well-known endpoint types with an `Other` escape hatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointType {
    SingleSignOnService,
    SingleLogoutService,
    AssertionConsumerService,
    ArtifactResolutionService,
    AttributeService,
    ManageNameIdService,
    DiscoveryResponse,
    /// Endpoint not in the well-known set.
    Other(String),
}

impl EndpointType {
    /// Canonical SAML element name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SingleSignOnService => "SingleSignOnService",
            Self::SingleLogoutService => "SingleLogoutService",
            Self::AssertionConsumerService => "AssertionConsumerService",
            Self::ArtifactResolutionService => "ArtifactResolutionService",
            Self::AttributeService => "AttributeService",
            Self::ManageNameIdService => "ManageNameIDService",
            Self::DiscoveryResponse => "DiscoveryResponse",
            Self::Other(s) => s.as_str(),
        }
    }

    fn from_name(s: &str) -> Self {
        match s {
            "SingleSignOnService" => Self::SingleSignOnService,
            "SingleLogoutService" => Self::SingleLogoutService,
            "AssertionConsumerService" => Self::AssertionConsumerService,
            "ArtifactResolutionService" => Self::ArtifactResolutionService,
            "AttributeService" => Self::AttributeService,
            "ManageNameIDService" => Self::ManageNameIdService,
            "DiscoveryResponse" => Self::DiscoveryResponse,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Serialize for EndpointType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EndpointType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_name(&s))
    }
}
