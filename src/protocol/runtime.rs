use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    io::{Read, Write},
    time::Duration,
};

use serialport::{DataBits, Parity, StopBits};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParityMode {
    #[default]
    None,
    Odd,
    Even,
}

impl From<ParityMode> for Parity {
    fn from(mode: ParityMode) -> Self {
        match mode {
            ParityMode::None => Parity::None,
            ParityMode::Odd => Parity::Odd,
            ParityMode::Even => Parity::Even,
        }
    }
}

/// Line settings used when the worker opens its port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: ParityMode,
    /// Per-read timeout of the read loop. Bounds how long a stopped worker
    /// keeps the handle before releasing it.
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: ParityMode::None,
            read_timeout_ms: 200,
        }
    }
}

impl SerialConfig {
    pub fn apply_builder(&self, b: serialport::SerialPortBuilder) -> serialport::SerialPortBuilder {
        let b = b.data_bits(match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        });
        let b = b.stop_bits(match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        });
        b.parity(self.parity.into())
            .timeout(Duration::from_millis(self.read_timeout_ms))
    }
}

/// Byte stream the worker reads device lines from and writes the header to.
pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> SerialLink for T {}

/// Opens links by port name. The controller and worker only see this seam, so a
/// session can run over anything that behaves like a serial port.
pub trait SerialConnector: Send + Sync {
    fn open(&self, port_name: &str, config: &SerialConfig) -> Result<Box<dyn SerialLink>>;
}

/// Connector backed by the host's serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

impl SerialConnector for SystemConnector {
    fn open(&self, port_name: &str, config: &SerialConfig) -> Result<Box<dyn SerialLink>> {
        let builder = config.apply_builder(serialport::new(port_name, config.baud_rate));
        let handle = builder
            .open()
            .with_context(|| format!("failed to open serial port {port_name}"))?;
        log::info!(
            "Opened {port_name} at {} baud ({}{}{})",
            config.baud_rate,
            config.data_bits,
            match config.parity {
                ParityMode::None => 'N',
                ParityMode::Odd => 'O',
                ParityMode::Even => 'E',
            },
            config.stop_bits
        );
        Ok(Box::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_maps_onto_serialport() {
        assert_eq!(Parity::from(ParityMode::None), Parity::None);
        assert_eq!(Parity::from(ParityMode::Even), Parity::Even);
        assert_eq!(ParityMode::Odd.to_string(), "odd");
    }

    #[test]
    fn default_line_settings_are_9600_8n1() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.data_bits, 8);
        assert_eq!(cfg.stop_bits, 1);
        assert_eq!(cfg.parity, ParityMode::None);
    }
}
