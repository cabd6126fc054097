//! torlet-pool: The instance pool manager
//!
//! This crate is the core of torlet:
//! - `TorPool`: lifecycle, selection, grouping, and batched control
//!   forwarding over a fleet of tor instances
//! - Load-balance strategies (round-robin, weighted)
//! - Live group views derived from instance labels

pub mod balancer;
pub mod group;
pub mod instance;
pub mod pool;

pub use balancer::{effective_weight, rotate, WeightedSelection, DEFAULT_WEIGHT};
pub use group::GroupView;
pub use instance::Instance;
pub use pool::{PoolEvent, TorPool};
