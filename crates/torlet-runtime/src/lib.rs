//! torlet-runtime: Instance runtime abstraction
//!
//! This crate provides the handle and launcher traits the pool drives, plus
//! their implementations:
//! - Process-based runtime spawning local tor daemons
//! - Control-port client for configuration and signals
//! - Mock runtime for tests

pub mod control;
pub mod mock;
pub mod process;
pub mod traits;

pub use control::ControlClient;
pub use mock::{MockHandle, MockLauncher};
pub use process::{ProcessLauncherConfig, TorProcess, TorProcessLauncher};
pub use traits::{InstanceHandle, InstanceLauncher};
