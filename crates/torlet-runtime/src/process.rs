//! Process-based tor runtime
//!
//! Spawns one `tor` process per instance with a rendered torrc and drives
//! readiness through the control port.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use torlet_core::{
    render_torrc, InstanceDefinition, TorSettings, TorletError, TorletResult, TorrcMap,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::control::ControlClient;
use crate::traits::{InstanceHandle, InstanceLauncher};

/// Process launcher configuration
#[derive(Debug, Clone)]
pub struct ProcessLauncherConfig {
    /// Path to the tor binary
    pub tor_path: PathBuf,
    /// Base directory for per-instance data directories
    pub data_directory: PathBuf,
    /// First SOCKS port in the allocation range
    pub socks_base_port: u16,
    /// First control port in the allocation range
    pub control_base_port: u16,
    /// Width of the port allocation range
    pub max_instances: u32,
    /// Delay between control-port readiness probes
    pub probe_interval: Duration,
    /// Number of readiness probes before startup is declared failed
    pub probe_attempts: u32,
}

impl ProcessLauncherConfig {
    /// Build launcher configuration from daemon settings
    pub fn from_settings(tor: &TorSettings, data_directory: PathBuf) -> Self {
        Self {
            tor_path: tor.tor_path.clone(),
            data_directory,
            socks_base_port: tor.socks_base_port,
            control_base_port: tor.control_base_port,
            max_instances: tor.max_instances,
            probe_interval: Duration::from_millis(tor.startup_probe_interval_ms),
            probe_attempts: tor.startup_probe_attempts,
        }
    }
}

impl Default for ProcessLauncherConfig {
    fn default() -> Self {
        Self::from_settings(&TorSettings::default(), PathBuf::from("/var/lib/torlet"))
    }
}

/// Launcher that runs instances as local tor processes
pub struct TorProcessLauncher {
    config: ProcessLauncherConfig,
    allocated_ports: Arc<Mutex<HashSet<u16>>>,
}

impl TorProcessLauncher {
    /// Create a new process launcher
    pub fn new(config: ProcessLauncherConfig) -> Self {
        Self {
            config,
            allocated_ports: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Allocate a (socks, control) port pair from the configured range
    async fn allocate_ports(&self) -> TorletResult<(u16, u16)> {
        let mut allocated = self.allocated_ports.lock().await;
        for offset in 0..self.config.max_instances as u16 {
            let socks = self.config.socks_base_port + offset;
            let control = self.config.control_base_port + offset;
            if !allocated.contains(&socks) && !allocated.contains(&control) {
                allocated.insert(socks);
                allocated.insert(control);
                return Ok((socks, control));
            }
        }
        Err(TorletError::Runtime(format!(
            "port range exhausted after {} instances",
            self.config.max_instances
        )))
    }
}

#[async_trait]
impl InstanceLauncher for TorProcessLauncher {
    async fn launch(
        &self,
        id: Uuid,
        definition: &InstanceDefinition,
        torrc: &TorrcMap,
    ) -> TorletResult<Arc<dyn InstanceHandle>> {
        let (socks_port, control_port) = self.allocate_ports().await?;
        let data_dir = self.config.data_directory.join(id.to_string());

        debug!(
            instance_id = %id,
            name = definition.name.as_deref().unwrap_or("<anonymous>"),
            socks_port,
            control_port,
            "Instance handle constructed"
        );

        Ok(Arc::new(TorProcess {
            id,
            tor_path: self.config.tor_path.clone(),
            data_dir,
            torrc: torrc.clone(),
            socks_port,
            control_port,
            probe_interval: self.config.probe_interval,
            probe_attempts: self.config.probe_attempts,
            child: Mutex::new(None),
            control: Mutex::new(None),
            allocated_ports: self.allocated_ports.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "tor-process"
    }
}

/// One tor daemon process plus its control session
pub struct TorProcess {
    id: Uuid,
    tor_path: PathBuf,
    data_dir: PathBuf,
    torrc: TorrcMap,
    socks_port: u16,
    control_port: u16,
    probe_interval: Duration,
    probe_attempts: u32,
    child: Mutex<Option<Child>>,
    control: Mutex<Option<ControlClient>>,
    allocated_ports: Arc<Mutex<HashSet<u16>>>,
}

impl TorProcess {
    fn build_command(&self, torrc_path: &Path) -> Command {
        let mut cmd = Command::new(&self.tor_path);
        cmd.arg("-f").arg(torrc_path);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    async fn release_ports(&self) {
        let mut allocated = self.allocated_ports.lock().await;
        allocated.remove(&self.socks_port);
        allocated.remove(&self.control_port);
    }

    fn control_of<'a>(&self, guard: &'a Option<ControlClient>) -> TorletResult<&'a ControlClient> {
        guard.as_ref().ok_or_else(|| {
            TorletError::Control(format!("instance {} has no control session", self.id))
        })
    }
}

#[async_trait]
impl InstanceHandle for TorProcess {
    async fn create(&self) -> TorletResult<()> {
        info!(
            instance_id = %self.id,
            socks_port = self.socks_port,
            control_port = self.control_port,
            "Starting tor process"
        );

        tokio::fs::create_dir_all(&self.data_dir).await?;

        let torrc = instance_torrc(&self.torrc, &self.data_dir, self.socks_port, self.control_port);
        let torrc_path = self.data_dir.join("torrc");
        tokio::fs::write(&torrc_path, render_torrc(&torrc)).await?;

        let mut child = match self.build_command(&torrc_path).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(instance_id = %self.id, error = %e, "Failed to spawn tor process");
                self.release_ports().await;
                return Err(TorletError::Startup(format!("failed to spawn tor: {}", e)));
            }
        };

        debug!(
            instance_id = %self.id,
            pid = child.id().unwrap_or(0),
            "Tor process spawned, probing control port"
        );

        for _ in 0..self.probe_attempts {
            if let Some(status) = child.try_wait()? {
                self.release_ports().await;
                return Err(TorletError::Startup(format!(
                    "tor exited during startup with {}",
                    status
                )));
            }

            match ControlClient::connect(self.control_port).await {
                Ok(client) => match client.authenticate(None).await {
                    Ok(()) => {
                        info!(instance_id = %self.id, "Tor process ready");
                        *self.control.lock().await = Some(client);
                        *self.child.lock().await = Some(child);
                        return Ok(());
                    }
                    Err(e) => {
                        debug!(instance_id = %self.id, error = %e, "Authentication not ready yet");
                    }
                },
                Err(_) => {}
            }

            tokio::time::sleep(self.probe_interval).await;
        }

        let _ = child.kill().await;
        self.release_ports().await;
        Err(TorletError::Startup(format!(
            "control port {} never became ready",
            self.control_port
        )))
    }

    async fn exit(&self) -> TorletResult<()> {
        info!(instance_id = %self.id, "Stopping tor process");

        if let Some(control) = self.control.lock().await.take() {
            if let Err(e) = control.signal("SHUTDOWN").await {
                warn!(instance_id = %self.id, error = %e, "SHUTDOWN signal failed");
            }
            let _ = control.quit().await;
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(instance_id = %self.id, status = %status, "Tor process exited");
                }
                _ => {
                    warn!(instance_id = %self.id, "Tor process did not exit, killing");
                    let _ = child.kill().await;
                }
            }
        }

        self.release_ports().await;
        Ok(())
    }

    async fn new_identity(&self) -> TorletResult<()> {
        let guard = self.control.lock().await;
        self.control_of(&guard)?.signal("NEWNYM").await?;
        debug!(instance_id = %self.id, "Circuit rotation requested");
        Ok(())
    }

    async fn get_config(&self, keyword: &str) -> TorletResult<Vec<String>> {
        let guard = self.control.lock().await;
        self.control_of(&guard)?.get_conf(keyword).await
    }

    async fn set_config(&self, keyword: &str, value: &str) -> TorletResult<()> {
        let guard = self.control.lock().await;
        self.control_of(&guard)?.set_conf(keyword, value).await
    }

    async fn signal(&self, signal: &str) -> TorletResult<()> {
        let guard = self.control.lock().await;
        self.control_of(&guard)?.signal(signal).await
    }

    fn socks_port(&self) -> u16 {
        self.socks_port
    }

    fn control_port(&self) -> u16 {
        self.control_port
    }

    fn runtime(&self) -> &'static str {
        "tor-process"
    }
}

/// Inject the per-instance keys into an instance's merged torrc.
///
/// DataDirectory, SocksPort, and ControlPort are owned by the runtime and
/// always win over pool defaults and instance overrides.
fn instance_torrc(base: &TorrcMap, data_dir: &Path, socks_port: u16, control_port: u16) -> TorrcMap {
    let mut torrc = base.clone();
    torrc.insert(
        "DataDirectory".to_string(),
        Value::String(data_dir.display().to_string()),
    );
    torrc.insert("SocksPort".to_string(), Value::from(socks_port));
    torrc.insert("ControlPort".to_string(), Value::from(control_port));
    torrc
}
