use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashSet;

use super::port_priority;

/// Return the list of available serial ports sorted/deduped for Unix.
pub fn available_ports_sorted() -> serialport::Result<Vec<SerialPortInfo>> {
    let raw_ports = serialport::available_ports()?;
    Ok(sort_and_dedup_ports(raw_ports))
}

pub(crate) fn sort_and_dedup_ports(raw_ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ports: Vec<SerialPortInfo> = Vec::new();

    // Enumeration can repeat a name; keep one entry per case-insensitive path
    // (plus vid/pid for USB). Distinct paths to one device are both kept.
    for p in raw_ports.into_iter() {
        let key = match &p.port_type {
            SerialPortType::UsbPort(info) => format!(
                "{}:vid={:04x}:pid={:04x}",
                p.port_name.to_lowercase(),
                info.vid,
                info.pid
            ),
            _ => p.port_name.to_lowercase(),
        };

        if seen.insert(key) {
            ports.push(p);
        }
    }

    ports.sort_by_key(|p| (port_priority(&p.port_name), p.port_name.clone()));

    ports
}
