// Platform-dispatched TTY helpers

#[cfg(unix)]
mod tty_unix;
#[cfg(unix)]
pub use tty_unix::available_ports_sorted;

/// Ordering rank of a port name: USB adapters, then ACM modems, then
/// on-board UARTs, then everything else.
pub fn port_priority(name: &str) -> u8 {
    let n = name.to_lowercase();
    if n.contains("usb") {
        0
    } else if n.contains("acm") {
        1
    } else if n.contains("ttys") || n.contains("serial") {
        2
    } else {
        10
    }
}

// Other platforms get the raw enumeration, already unique per port name
#[cfg(not(unix))]
pub fn available_ports_sorted() -> serialport::Result<Vec<serialport::SerialPortInfo>> {
    let mut ports = serialport::available_ports()?;
    ports.sort_by_key(|p| (port_priority(&p.port_name), p.port_name.clone()));
    ports.dedup_by(|a, b| a.port_name == b.port_name);
    Ok(ports)
}
