//! Serial port discovery.
//!
//! Lists the ports the OS knows about and checks whether each one can be opened.
//! Probing only opens and closes a port; nothing is written to the device.

use crate::error::{AppResult, LoggerError};
use serialport::{SerialPortInfo, SerialPortType};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// One port as reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Path or name used to open the port (e.g. "/dev/ttyUSB0", "COM3")
    pub device_name: String,
    /// Product or port kind
    pub description: String,
    /// "USB VID:PID=xxxx:xxxx SER=..." for USB adapters, the port kind otherwise
    pub hardware_id: String,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (description, hardware_id) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let description = usb
                    .product
                    .clone()
                    .or_else(|| usb.manufacturer.clone())
                    .unwrap_or_else(|| "USB serial device".to_string());
                let mut hardware_id = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
                if let Some(serial) = usb.serial_number {
                    hardware_id.push_str(" SER=");
                    hardware_id.push_str(&serial);
                }
                (description, hardware_id)
            }
            SerialPortType::PciPort => ("PCI serial port".to_string(), "PCI".to_string()),
            SerialPortType::BluetoothPort => {
                ("Bluetooth serial port".to_string(), "BLUETOOTH".to_string())
            }
            SerialPortType::Unknown => ("n/a".to_string(), "n/a".to_string()),
        };

        Self {
            device_name: info.port_name,
            description,
            hardware_id,
        }
    }
}

/// Result of trying to open a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The port opened and was released again.
    Connected,
    /// Opening failed with this message.
    Failed(String),
}

impl ProbeResult {
    /// Whether the port could be opened.
    pub fn is_connected(&self) -> bool {
        matches!(self, ProbeResult::Connected)
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Connected => write!(f, "connected"),
            ProbeResult::Failed(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// List serial ports known to the OS.
pub fn enumerate_ports() -> AppResult<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| LoggerError::Discovery(e.to_string()))?;
    debug!("Found {} serial ports", ports.len());

    Ok(ports
        .into_iter()
        // On macOS, only list the /dev/cu.* (calling unit) side of each device
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(PortInfo::from)
        .collect())
}

/// Open and immediately close `port_name`.
pub fn probe_port(port_name: &str, baud_rate: u32, data_bits: u8) -> ProbeResult {
    let result = serialport::new(port_name, baud_rate)
        .data_bits(to_serialport_data_bits(data_bits))
        .timeout(Duration::from_millis(500))
        .open();

    match result {
        Ok(port) => {
            drop(port);
            info!("Connection test on {} succeeded", port_name);
            ProbeResult::Connected
        }
        Err(e) => {
            info!("Connection test on {} failed: {}", port_name, e);
            ProbeResult::Failed(e.to_string())
        }
    }
}

/// Probe every enumerated port.
pub fn probe_all(baud_rate: u32, data_bits: u8) -> AppResult<Vec<(PortInfo, ProbeResult)>> {
    Ok(enumerate_ports()?
        .into_iter()
        .map(|port| {
            let result = probe_port(&port.device_name, baud_rate, data_bits);
            (port, result)
        })
        .collect())
}

fn to_serialport_data_bits(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}
