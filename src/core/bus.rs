use serde::Serialize;

use super::{
    error::SessionError,
    session::{LifecycleState, Progress},
};
use crate::protocol::{codec::DeviceEvent, discovery::PortSet};

/// Messages delivered into the controller from its background contexts.
/// Only the controller's own thread drains them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CoreEvent {
    /// Port discovery published a new port set.
    PortsChanged(PortSet),
    /// A worker decoded a device line (or lost its link). Tagged with the
    /// session that spawned the worker so late events can be discarded.
    Device { session: u64, event: DeviceEvent },
    /// A worker dropped its connection handle.
    WorkerReleased { session: u64 },
}

/// Messages sent from the controller to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Sent on every `done_count` change and when a job starts.
    Progress(Progress),
    /// The target count changed; `remaining` is `target - done`.
    TargetChanged { target: u8, remaining: u8 },
    StateChanged { state: LifecycleState },
    PauseChanged { paused: bool },
    PortsChanged {
        ports: PortSet,
        selected: Option<String>,
    },
    PortSelected { port: Option<String> },
    /// A device line the controller does not act on.
    DeviceMessage { line: String },
    DiscoveryChanged { running: bool },
    /// An error the user should see.
    Notice {
        #[serde(serialize_with = "as_display")]
        error: SessionError,
    },
}

fn as_display<S: serde::Serializer>(error: &SessionError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}
