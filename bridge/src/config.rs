//! Configuration document loading.
//!
//! The document is one YAML file holding both the policy description the
//! compiler consumes and the render-only settings (region, availability
//! zones) the compiler never sees.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use policy_engine::PolicyDocument;

use crate::error::BridgeError;

/// The full configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Target region for the rendered provider block.
    #[serde(default)]
    pub region: Option<String>,

    /// Availability zones subnets are spread across.
    #[serde(default)]
    pub availability_zones: Vec<String>,

    /// The policy description consumed by the compiler.
    #[serde(flatten)]
    pub policy: PolicyDocument,
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml(document: &str) -> Result<Self, BridgeError> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Read and parse a YAML document from disk.
    pub fn from_path(path: &Path) -> Result<Self, BridgeError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }
}
