//! Mock instance runtime for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use torlet_core::{InstanceDefinition, TorletError, TorletResult, TorrcMap};
use uuid::Uuid;

use crate::traits::{InstanceHandle, InstanceLauncher};

/// Mock launcher for testing.
///
/// Hands out in-memory handles, records every handle it built, and can be
/// told to fail startup for specific instance names.
pub struct MockLauncher {
    next_port: AtomicU16,
    fail_names: Mutex<Vec<String>>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockLauncher {
    /// Create a new mock launcher
    pub fn new() -> Self {
        Self {
            next_port: AtomicU16::new(19050),
            fail_names: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Make `create` fail for instances launched with this name
    pub async fn fail_startup_of(&self, name: impl Into<String>) {
        self.fail_names.lock().await.push(name.into());
    }

    /// Every handle this launcher has built, in launch order
    pub async fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.handles.lock().await.clone()
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceLauncher for MockLauncher {
    async fn launch(
        &self,
        id: Uuid,
        definition: &InstanceDefinition,
        torrc: &TorrcMap,
    ) -> TorletResult<Arc<dyn InstanceHandle>> {
        let fail_create = match &definition.name {
            Some(name) => self.fail_names.lock().await.contains(name),
            None => false,
        };

        let config = torrc
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect();

        let handle = Arc::new(MockHandle {
            id,
            socks_port: self.next_port.fetch_add(2, Ordering::SeqCst),
            fail_create,
            create_calls: AtomicU32::new(0),
            exit_calls: AtomicU32::new(0),
            new_identity_calls: AtomicU32::new(0),
            signals: Mutex::new(Vec::new()),
            config: Mutex::new(config),
        });
        self.handles.lock().await.push(handle.clone());
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Mock instance handle recording every call made against it.
pub struct MockHandle {
    id: Uuid,
    socks_port: u16,
    fail_create: bool,
    create_calls: AtomicU32,
    exit_calls: AtomicU32,
    new_identity_calls: AtomicU32,
    signals: Mutex<Vec<String>>,
    config: Mutex<BTreeMap<String, String>>,
}

impl MockHandle {
    /// Number of times `create` was called
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of times `exit` was called
    pub fn exit_calls(&self) -> u32 {
        self.exit_calls.load(Ordering::SeqCst)
    }

    /// Number of times `new_identity` was called
    pub fn new_identity_calls(&self) -> u32 {
        self.new_identity_calls.load(Ordering::SeqCst)
    }

    /// Signals delivered via `signal`, in order
    pub async fn signals(&self) -> Vec<String> {
        self.signals.lock().await.clone()
    }

    /// The handle's id
    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl InstanceHandle for MockHandle {
    async fn create(&self) -> TorletResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(TorletError::Startup(format!(
                "mock startup failure for {}",
                self.id
            )));
        }
        Ok(())
    }

    async fn exit(&self) -> TorletResult<()> {
        self.exit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn new_identity(&self) -> TorletResult<()> {
        self.new_identity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_config(&self, keyword: &str) -> TorletResult<Vec<String>> {
        let config = self.config.lock().await;
        Ok(config.get(keyword).cloned().into_iter().collect())
    }

    async fn set_config(&self, keyword: &str, value: &str) -> TorletResult<()> {
        self.config
            .lock()
            .await
            .insert(keyword.to_string(), value.to_string());
        Ok(())
    }

    async fn signal(&self, signal: &str) -> TorletResult<()> {
        self.signals.lock().await.push(signal.to_string());
        Ok(())
    }

    fn socks_port(&self) -> u16 {
        self.socks_port
    }

    fn control_port(&self) -> u16 {
        self.socks_port + 1
    }

    fn runtime(&self) -> &'static str {
        "mock"
    }
}
