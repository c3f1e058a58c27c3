// src/hal/serial_driver.rs
//! Serial port byte source for the EMG shield

use crate::config::SerialConfig;
use crate::error::{EmgError, Result};
use crate::hal::traits::ByteSource;
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{self, Read};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One entry of the serial port enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescription {
    pub name: String,
    /// USB manufacturer/product, when the port is a USB adapter
    pub usb_product: Option<String>,
}

/// Enumerate serial ports visible to the OS
pub fn list_ports() -> Result<Vec<PortDescription>> {
    let ports = serialport::available_ports().map_err(|source| EmgError::Connection {
        port: "<enumeration>".to_string(),
        source,
    })?;
    Ok(ports
        .into_iter()
        .map(|info| {
            let usb_product = match info.port_type {
                SerialPortType::UsbPort(usb) => {
                    let parts: Vec<String> = [usb.manufacturer, usb.product]
                        .into_iter()
                        .flatten()
                        .collect();
                    (!parts.is_empty()).then(|| parts.join(" "))
                }
                _ => None,
            };
            PortDescription { name: info.port_name, usb_product }
        })
        .collect())
}

/// Serial connection to the acquisition board
pub struct SerialByteSource {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    baud_rate: u32,
}

impl SerialByteSource {
    /// Open the configured port. Read timeouts surface as
    /// `ErrorKind::TimedOut`, which the frame parser treats as "no data yet".
    pub fn open(config: &SerialConfig) -> Result<Self> {
        if config.port_name.trim().is_empty() {
            return Err(EmgError::config("serial", "port name cannot be empty"));
        }

        match list_ports() {
            Ok(ports) if !ports.iter().any(|p| p.name == config.port_name) => {
                let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
                warn!(
                    port = %config.port_name,
                    available = ?names,
                    "port not in enumeration, trying anyway"
                );
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "port enumeration failed"),
        }

        let port = serialport::new(config.port_name.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|source| EmgError::Connection {
                port: config.port_name.clone(),
                source,
            })?;

        info!(port = %config.port_name, baud = config.baud_rate, "serial port opened");
        Ok(Self {
            port: Some(port),
            port_name: config.port_name.clone(),
            baud_rate: config.baud_rate,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl ByteSource for SerialByteSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.as_mut() {
            Some(port) => port.read(buf),
            // A closed port reads as end of stream
            None => Ok(0),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port_mut()?
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}
