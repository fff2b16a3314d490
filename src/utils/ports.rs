use anyhow::{Context, Result};
use serde::Serialize;

use crate::protocol::discovery::{PortEnumerator, PortSet};

/// One enumerated port, as printed by `--list-ports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    pub port_name: String,
    pub port_type: String,
}

/// Return the sorted list of available ports.
pub fn enumerate_ports() -> Result<Vec<PortEntry>> {
    let ports = crate::protocol::tty::available_ports_sorted()
        .context("failed to enumerate serial ports")?;
    Ok(ports
        .into_iter()
        .map(|p| PortEntry {
            port_name: p.port_name,
            port_type: describe_port_type(&p.port_type),
        })
        .collect())
}

fn describe_port_type(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(info) => match &info.product {
            Some(product) => format!("USB {:04x}:{:04x} {product}", info.vid, info.pid),
            None => format!("USB {:04x}:{:04x}", info.vid, info.pid),
        },
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::Unknown => "Unknown".to_string(),
    }
}

/// Enumerator backed by the host's serial port list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortEnumerator;

impl PortEnumerator for SystemPortEnumerator {
    fn enumerate(&self) -> Result<PortSet> {
        Ok(enumerate_ports()?.into_iter().map(|p| p.port_name).collect())
    }
}
