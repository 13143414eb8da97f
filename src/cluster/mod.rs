//! # Cloudlet model and registry
//!
//! - **Cloudlet**: an edge node that can host deployments
//! - **ClientInfo**: what we know about the requesting client
//! - **DeploymentRecipe**: descriptor of what is being deployed
//! - **CloudletRegistry**: the shared set of known cloudlets
//! - **ClusterBackend**: the orchestrator this broker reports for

pub mod backend;
pub mod client;
pub mod cloudlet;
pub mod geo;
pub mod recipe;
pub mod registry;

pub use backend::{ClusterBackend, ClusterError};
pub use client::{ClientInfo, PublicKey, ResourceRequirements};
pub use cloudlet::{Cloudlet, CloudletResources, CloudletSpec, CloudletSummary, HeartbeatReport};
pub use geo::GeoLocation;
pub use recipe::DeploymentRecipe;
pub use registry::CloudletRegistry;

/// Default interval of the stale cloudlet sweep in seconds
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Default age after which a reporting cloudlet is considered stale
pub const STALENESS_SECS: u64 = 300;

/// Default interval of the deployment expiry job in seconds
pub const DEPLOYMENT_EXPIRY_INTERVAL_SECS: u64 = 60;

/// Default interval for reporting to Tier1 brokers in seconds
pub const REPORT_INTERVAL_SECS: u64 = 5;
