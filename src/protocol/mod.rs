pub mod codec;
pub mod discovery;
pub mod runtime;
pub mod tty;
pub mod worker;

pub use codec::DeviceEvent;
pub use discovery::{PortDiscovery, PortEnumerator, PortSet};
pub use runtime::{ParityMode, SerialConfig, SerialConnector, SerialLink, SystemConnector};
pub use worker::DeviceWorker;
