//! Tier1 edge broker
//!
//! Picks the cloudlet a client deployment should go to by running a chain
//! of pluggable matcher stages over the known cloudlets, and keeps that set
//! current with background expiry and upstream reporting jobs.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod jobs;
pub mod matcher;
pub mod metrics;
pub mod server;
