//! Cloudlet resource - a candidate edge node that can host deployments
//!
//! A Cloudlet:
//! - Is identified by a UUID that never changes
//! - Advertises the endpoint deployments are dispatched to
//! - Reports a resource snapshot with every heartbeat
//! - May restrict which clients it serves by network range

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geo::GeoLocation;

/// Resource snapshot reported by a cloudlet.
///
/// Overwritten wholesale on each heartbeat; fields absent from a report
/// read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudletResources {
    pub cpu_avail: f64,
    pub mem_avail: f64,
    pub disk_avail: f64,
    pub cpu_used: f64,
    pub mem_used: f64,
    pub net_rx_rate: f64,
    pub net_tx_rate: f64,
}

/// A candidate edge node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cloudlet {
    pub uuid: Uuid,

    /// Human readable label, only used for logging
    pub name: String,

    /// URL deployments are dispatched to
    pub endpoint: String,

    #[serde(default)]
    pub resources: CloudletResources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,

    /// Networks this cloudlet considers local to itself
    #[serde(default)]
    pub local_networks: Vec<IpNet>,

    /// When non-empty, only clients in these networks are served
    #[serde(default)]
    pub accepted_clients: Vec<IpNet>,

    /// Clients in these networks are never served
    #[serde(default)]
    pub rejected_clients: Vec<IpNet>,

    /// Time of the last heartbeat, `None` until the first one arrives
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl PartialEq for Cloudlet {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Cloudlet {}

impl Cloudlet {
    /// Create a cloudlet that has not reported yet
    pub fn new(uuid: Uuid, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            endpoint: endpoint.into(),
            resources: CloudletResources::default(),
            location: None,
            local_networks: Vec::new(),
            accepted_clients: Vec::new(),
            rejected_clients: Vec::new(),
            last_update: None,
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_resources(mut self, resources: CloudletResources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_local_networks(mut self, networks: Vec<IpNet>) -> Self {
        self.local_networks = networks;
        self
    }

    pub fn with_accepted_clients(mut self, networks: Vec<IpNet>) -> Self {
        self.accepted_clients = networks;
        self
    }

    pub fn with_rejected_clients(mut self, networks: Vec<IpNet>) -> Self {
        self.rejected_clients = networks;
        self
    }

    pub fn with_last_update(mut self, at: DateTime<Utc>) -> Self {
        self.last_update = Some(at);
        self
    }

    /// Distance to a client location, `None` when this cloudlet's location is unknown
    pub fn distance_from(&self, location: &GeoLocation) -> Option<f64> {
        self.location.map(|own| own.distance_km(location))
    }

    pub fn is_local_to(&self, addr: &IpAddr) -> bool {
        self.local_networks.iter().any(|net| net.contains(addr))
    }

    pub fn rejects(&self, addr: &IpAddr) -> bool {
        self.rejected_clients.iter().any(|net| net.contains(addr))
    }

    /// Whether the accept list (if any) admits `addr`
    pub fn accepts(&self, addr: &IpAddr) -> bool {
        self.accepted_clients.is_empty()
            || self.accepted_clients.iter().any(|net| net.contains(addr))
    }

    /// Apply a heartbeat: resources are replaced wholesale, network lists
    /// only when the report carries them.
    pub fn apply_heartbeat(&mut self, report: HeartbeatReport, at: DateTime<Utc>) {
        self.endpoint = report.endpoint;
        self.resources = report.resources;
        if let Some(name) = report.name {
            self.name = name;
        }
        if report.location.is_some() {
            self.location = report.location;
        }
        if let Some(networks) = report.local_networks {
            self.local_networks = networks;
        }
        if let Some(networks) = report.accepted_clients {
            self.accepted_clients = networks;
        }
        if let Some(networks) = report.rejected_clients {
            self.rejected_clients = networks;
        }
        self.last_update = Some(at);
    }

    pub fn summary(&self) -> CloudletSummary {
        CloudletSummary {
            uuid: self.uuid,
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            location: self.location,
            resources: self.resources.clone(),
            last_update: self.last_update,
        }
    }
}

/// Heartbeat body a Tier2 node posts to `{tier1}/api/v1/cloudlets/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub uuid: Uuid,
    pub endpoint: String,
    #[serde(default)]
    pub resources: CloudletResources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_networks: Option<Vec<IpNet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_clients: Option<Vec<IpNet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_clients: Option<Vec<IpNet>>,
}

impl HeartbeatReport {
    /// Build a new cloudlet from a first heartbeat
    pub fn into_cloudlet(self, at: DateTime<Utc>) -> Cloudlet {
        let name = self.name.clone().unwrap_or_else(|| self.uuid.to_string());
        let mut cloudlet = Cloudlet::new(self.uuid, name, self.endpoint.clone());
        cloudlet.apply_heartbeat(self, at);
        cloudlet
    }
}

/// Public view of a cloudlet as returned by the listing API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudletSummary {
    pub uuid: Uuid,
    pub name: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    pub resources: CloudletResources,
    #[serde(rename = "lastUpdate")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Cloudlet entry in a preseed file. The UUID is generated when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudletSpec {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    #[serde(default)]
    pub resources: CloudletResources,
    #[serde(default)]
    pub local_networks: Vec<IpNet>,
    #[serde(default)]
    pub accepted_clients: Vec<IpNet>,
    #[serde(default)]
    pub rejected_clients: Vec<IpNet>,
}

impl From<CloudletSpec> for Cloudlet {
    fn from(spec: CloudletSpec) -> Self {
        Cloudlet {
            uuid: spec.uuid.unwrap_or_else(Uuid::new_v4),
            name: spec.name,
            endpoint: spec.endpoint,
            resources: spec.resources,
            location: spec.location,
            local_networks: spec.local_networks,
            accepted_clients: spec.accepted_clients,
            rejected_clients: spec.rejected_clients,
            last_update: None,
        }
    }
}
