//! Group views
//!
//! Groups are not stored anywhere: a view filters the live pool by one
//! label on every access, so it always reflects current membership and
//! current label sets.

use std::sync::Arc;
use torlet_core::{TorletError, TorletResult};
use tracing::debug;

use crate::instance::Instance;
use crate::pool::TorPool;

/// A live, name-sorted projection of the instances carrying one label.
///
/// Mutators act directly on the underlying instances' label sets, never on
/// a detached copy.
pub struct GroupView<'a> {
    pool: &'a TorPool,
    label: String,
}

impl<'a> GroupView<'a> {
    pub(crate) fn new(pool: &'a TorPool, label: String) -> Self {
        Self { pool, label }
    }

    /// The label this view projects
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current members, sorted by name (unnamed instances sort by id)
    pub async fn instances(&self) -> Vec<Arc<Instance>> {
        let mut members = Vec::new();
        for instance in self.pool.instances().await {
            if instance.in_group(&self.label).await {
                members.push(instance);
            }
        }
        members.sort_by_key(|instance| instance.sort_key());
        members
    }

    /// Number of current members
    pub async fn len(&self) -> usize {
        self.instances().await.len()
    }

    /// Whether the view is currently empty
    pub async fn is_empty(&self) -> bool {
        self.instances().await.is_empty()
    }

    /// Add the label to an instance; adding it twice is a no-op
    pub async fn add(&self, instance: &Instance) {
        instance.add_group(&self.label).await;
        debug!(label = %self.label, instance_id = %instance.id, "Label added");
    }

    /// Add the label to the instance named `name`
    pub async fn add_by_name(&self, name: &str) -> TorletResult<()> {
        let instance = self.pool.instance_by_name(name).await?;
        self.add(&instance).await;
        Ok(())
    }

    /// Remove the label from an instance; absent labels are a no-op
    pub async fn remove(&self, instance: &Instance) {
        instance.remove_group(&self.label).await;
        debug!(label = %self.label, instance_id = %instance.id, "Label removed");
    }

    /// Remove the label from the instance named `name`
    pub async fn remove_by_name(&self, name: &str) -> TorletResult<()> {
        let instance = self.pool.instance_by_name(name).await?;
        self.remove(&instance).await;
        Ok(())
    }

    /// Remove the label from the member at `position` within this view's
    /// current (filtered, sorted) ordering
    pub async fn remove_at(&self, position: usize) -> TorletResult<()> {
        let members = self.instances().await;
        let instance = members.get(position).ok_or_else(|| {
            TorletError::InstanceNotFound(format!(
                "group {} has no member at position {}",
                self.label, position
            ))
        })?;
        self.remove(instance).await;
        Ok(())
    }
}

impl std::fmt::Debug for GroupView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupView").field("label", &self.label).finish()
    }
}
