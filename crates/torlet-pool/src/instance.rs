//! Pool-side instance representation

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use torlet_core::{InstanceDefinition, TorrcMap};
use torlet_runtime::InstanceHandle;
use uuid::Uuid;

/// One managed tor daemon tracked by the pool.
///
/// Identity and definition are fixed at creation; only the group label set
/// mutates over the instance's lifetime.
pub struct Instance {
    /// Unique instance identifier
    pub id: Uuid,
    /// Pool-unique name, if the definition carried one
    pub name: Option<String>,
    /// The definition this instance was created from
    pub definition: InstanceDefinition,
    /// Effective torrc: pool defaults merged with the definition overrides
    pub torrc: TorrcMap,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Live group label set, seeded from the definition
    groups: RwLock<BTreeSet<String>>,
    /// Control surface over the running daemon
    handle: Arc<dyn InstanceHandle>,
}

impl Instance {
    pub(crate) fn new(
        id: Uuid,
        definition: InstanceDefinition,
        torrc: TorrcMap,
        handle: Arc<dyn InstanceHandle>,
    ) -> Self {
        Self {
            id,
            name: definition.name.clone(),
            groups: RwLock::new(definition.groups.clone()),
            definition,
            torrc,
            created_at: Utc::now(),
            handle,
        }
    }

    /// The handle driving the underlying daemon
    pub fn handle(&self) -> &Arc<dyn InstanceHandle> {
        &self.handle
    }

    /// Current group labels
    pub async fn groups(&self) -> BTreeSet<String> {
        self.groups.read().await.clone()
    }

    /// Whether the instance carries the given label
    pub async fn in_group(&self, label: &str) -> bool {
        self.groups.read().await.contains(label)
    }

    /// Add a label; adding an existing label is a no-op
    pub(crate) async fn add_group(&self, label: &str) {
        self.groups.write().await.insert(label.to_string());
    }

    /// Remove a label; removing an absent label is a no-op
    pub(crate) async fn remove_group(&self, label: &str) {
        self.groups.write().await.remove(label);
    }

    /// Stable ordering key for group views: the name when present, the id
    /// string otherwise
    pub fn sort_key(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("runtime", &self.handle.runtime())
            .finish()
    }
}
