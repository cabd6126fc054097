//! Instance definition and selection-method types

use crate::torrc::TorrcMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Desired configuration for one pool instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceDefinition {
    /// Optional pool-unique name
    pub name: Option<String>,
    /// Per-instance torrc overrides, merged over the pool defaults
    #[serde(default)]
    pub config: TorrcMap,
    /// Selection weight under the weighted strategy
    pub weight: Option<u32>,
    /// Group labels this instance starts with
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl InstanceDefinition {
    /// Create an empty definition (anonymous instance, pool defaults only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a definition carrying just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the selection weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Add a group label
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }
}

/// Strategy that reorders the pool on each selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalanceMethod {
    /// Rotate the pool sequence left by one per selection
    RoundRobin,
    /// Draw a weighted random permutation of the pool per selection
    Weighted,
}

impl Default for LoadBalanceMethod {
    fn default() -> Self {
        LoadBalanceMethod::RoundRobin
    }
}

impl std::fmt::Display for LoadBalanceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadBalanceMethod::RoundRobin => write!(f, "round-robin"),
            LoadBalanceMethod::Weighted => write!(f, "weighted"),
        }
    }
}
