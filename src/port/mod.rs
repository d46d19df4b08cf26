#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
use linux::is_port_open;
#[cfg(target_os = "macos")]
use macos::is_port_open;

pub use serialport::SerialPort;

use core::time::Duration;
use log::{debug, warn};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use thiserror::Error;

use crate::protocol::apt::{AptProtocol, DriverConfig};
use crate::protocol::Result;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn is_port_open(_port_name: &str) -> bool {
    false
}

pub const DEFAULT_PORT: &str =
    "/dev/serial/by-id/usb-Thorlabs_Stepper_Controller_26001411-if00-port0";
pub const DEFAULT_BAUDRATE: u32 = 115200;

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
    #[error("can't open {port_name:?}: {source}")]
    Open {
        port_name: String,
        source: serialport::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortConfig {
    pub port_name: String,
    pub baudrate: u32,
    /// Upper bound on a single blocking read. Homing a long stage can take a while.
    pub timeout: Duration,
    /// Skip the check for other processes holding the port.
    pub force: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            port_name: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            timeout: Duration::from_secs(60),
            force: false,
        }
    }
}

impl PortConfig {
    pub fn new(port_name: &str) -> Self {
        PortConfig {
            port_name: port_name.to_string(),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Opens the controller port as 8N1 without flow control.
pub fn open_port(config: &PortConfig) -> Result<Box<dyn SerialPort>> {
    let port_name = &config.port_name;

    if !config.force && is_port_open(port_name) {
        return Err(OpenPortError::PortBusy {
            port_name: port_name.clone(),
        }
        .into());
    }

    let port = serialport::new(port_name, config.baudrate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.timeout)
        .open()
        .map_err(|source| OpenPortError::Open {
            port_name: port_name.clone(),
            source,
        })?;

    debug!("open_port OK: {} @ {} baud", port_name, config.baudrate);
    warn!("{} is open, close it before exiting", port_name);
    Ok(port)
}

/// Opens the port and wraps it in a driver.
pub fn open(
    config: &PortConfig,
    driver: DriverConfig,
) -> Result<AptProtocol<Box<dyn SerialPort>>> {
    Ok(AptProtocol::with_config(open_port(config)?, driver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    #[test]
    fn defaults() {
        let config = PortConfig::default();
        assert_eq!(config.port_name, DEFAULT_PORT);
        assert_eq!(config.baudrate, 115200);
        assert!(!config.force);
    }

    #[test]
    fn builder() {
        let config = PortConfig::new("/dev/ttyUSB3")
            .timeout(Duration::from_millis(250))
            .force(true);
        assert_eq!(config.port_name, "/dev/ttyUSB3");
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.force);
        assert_eq!(config.baudrate, DEFAULT_BAUDRATE);
    }

    #[test]
    fn missing_port_is_transport_error() {
        let config = PortConfig::new("/dev/does-not-exist-apt-jig").force(true);
        let err = open_port(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("does-not-exist-apt-jig"));
    }
}
