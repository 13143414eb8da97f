//! Deployment recipe descriptor
//!
//! The built-in match stages ignore the recipe; it is passed through so
//! policy-aware stages can inspect it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecipe {
    #[serde(default = "Uuid::nil")]
    pub uuid: Uuid,
    pub name: String,
    pub version: String,
    /// Restricted recipes are not exposed through public lookups
    #[serde(default)]
    pub restricted: bool,
}

impl DeploymentRecipe {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::nil(),
            name: name.into(),
            version: version.into(),
            restricted: false,
        }
    }
}
