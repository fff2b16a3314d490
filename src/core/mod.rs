/// Session logic for cyclerig
///
/// This module contains everything that does not touch a port directly:
/// - The cycle session record and its arithmetic
/// - The controller state machine
/// - Messages between the controller and its frontend
/// - Configuration loading
pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;

pub use bus::SessionUpdate;
pub use config::{DiscoveryConfig, RigConfig};
pub use controller::CycleController;
pub use error::SessionError;
pub use session::{CycleSession, LifecycleState, Progress, MAX_TARGET_COUNT};
