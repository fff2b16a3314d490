//! cyclerig: drive a repetitive-cycle rig over a serial link
//!
//! The device receives a target cycle count when a job starts and answers with
//! one `done` line per finished cycle. This crate keeps the count state for such
//! a job while staying responsive to port hot-plug, pause and cancellation:
//!
//! - [`protocol::discovery`] polls the host for serial ports in the background;
//! - [`protocol::worker`] owns the connection and decodes device lines;
//! - [`core::controller`] reconciles target and completed cycles.
//!
//! The `cyclerig` binary is a thin terminal frontend over [`CycleController`].

#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod core;
pub mod protocol;
pub mod utils;

pub use crate::core::{
    CycleController, CycleSession, LifecycleState, Progress, RigConfig, SessionError,
    SessionUpdate,
};
pub use protocol::{DeviceEvent, PortEnumerator, PortSet, SerialConnector};
