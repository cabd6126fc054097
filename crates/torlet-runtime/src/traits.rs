//! Runtime trait definitions

use async_trait::async_trait;
use std::sync::Arc;
use torlet_core::{InstanceDefinition, TorletResult, TorrcMap};
use uuid::Uuid;

/// Control surface over one running tor daemon.
///
/// `create` performs the asynchronous startup and resolves exactly once:
/// `Ok` when the daemon signals readiness, `Err` on startup failure. The
/// remaining operations require a successful `create`.
#[async_trait]
pub trait InstanceHandle: Send + Sync {
    /// Start the daemon and wait for readiness
    async fn create(&self) -> TorletResult<()>;

    /// Stop the daemon and its control session
    async fn exit(&self) -> TorletResult<()>;

    /// Rotate the anonymity circuit (SIGNAL NEWNYM)
    async fn new_identity(&self) -> TorletResult<()>;

    /// Read a configuration keyword; multi-valued keywords yield one entry
    /// per value
    async fn get_config(&self, keyword: &str) -> TorletResult<Vec<String>>;

    /// Write a configuration keyword
    async fn set_config(&self, keyword: &str, value: &str) -> TorletResult<()>;

    /// Send a control signal by name
    async fn signal(&self, signal: &str) -> TorletResult<()>;

    /// SOCKS port the daemon listens on
    fn socks_port(&self) -> u16;

    /// Control port the daemon listens on
    fn control_port(&self) -> u16;

    /// Get the runtime name
    fn runtime(&self) -> &'static str;
}

/// Constructs instance handles for the pool
#[async_trait]
pub trait InstanceLauncher: Send + Sync {
    /// Build a handle for a new instance.
    ///
    /// Allocates whatever per-instance resources the runtime needs (ports,
    /// directories) but does not start the daemon; the pool drives startup
    /// through `InstanceHandle::create`.
    async fn launch(
        &self,
        id: Uuid,
        definition: &InstanceDefinition,
        torrc: &TorrcMap,
    ) -> TorletResult<Arc<dyn InstanceHandle>>;

    /// Get the launcher name
    fn name(&self) -> &'static str;
}
