//! What the broker knows about a requesting client

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::geo::GeoLocation;

/// Tunnel public key identifying a client application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resources a deployment asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    pub cpu: f64,
    pub mem: f64,
    pub disk: f64,
}

/// Immutable per-request view of the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub publickey: PublicKey,
    pub ipaddress: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(rename = "resourceReqs", default)]
    pub resource_reqs: ResourceRequirements,
}

impl ClientInfo {
    pub fn new(publickey: PublicKey, ipaddress: IpAddr) -> Self {
        Self {
            publickey,
            ipaddress,
            location: None,
            resource_reqs: ResourceRequirements::default(),
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_requirements(mut self, reqs: ResourceRequirements) -> Self {
        self.resource_reqs = reqs;
        self
    }
}
