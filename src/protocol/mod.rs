pub mod apt;

use std::{fmt::Display, io};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use thiserror::Error;

use crate::port::OpenPortError;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// APT message identifiers used by the jig.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum MessageId {
    ModIdentify = 0x0223,
    SetBacklash = 0x043a,
    MoveHome = 0x0443,
    MoveHomed = 0x0444,
    MoveRelative = 0x0448,
    MoveAbsolute = 0x0453,
    MoveCompleted = 0x0464,
}

impl MessageId {
    pub fn to_le_bytes(self) -> [u8; 2] {
        (self as u16).to_le_bytes()
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageId::ModIdentify => "MGMSG_MOD_IDENTIFY",
            MessageId::SetBacklash => "MGMSG_MOT_SET_GENMOVEPARAMS",
            MessageId::MoveHome => "MGMSG_MOT_MOVE_HOME",
            MessageId::MoveHomed => "MGMSG_MOT_MOVE_HOMED",
            MessageId::MoveRelative => "MGMSG_MOT_MOVE_RELATIVE",
            MessageId::MoveAbsolute => "MGMSG_MOT_MOVE_ABSOLUTE",
            MessageId::MoveCompleted => "MGMSG_MOT_MOVE_COMPLETED",
        }
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), *self as u16)
    }
}

/// Renders a raw response id, naming it when it is a known message.
pub(crate) fn describe_id(id: u16) -> String {
    match MessageId::from_u16(id) {
        Some(known) => known.to_string(),
        None => format!("{:#06x}", id),
    }
}

/// Destination/source byte pair carried in every frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Address {
    pub destination: u8,
    pub source: u8,
}

impl Address {
    /// Set on the destination byte of frames followed by a data packet.
    pub const DATA_FLAG: u8 = 0x80;

    /// Generic USB controller.
    pub const GENERIC_USB: u8 = 0x50;
    pub const HOST: u8 = 0x01;
}

impl Default for Address {
    fn default() -> Self {
        Address {
            destination: Address::GENERIC_USB,
            source: Address::HOST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Timeout,
    Controller,
    Encoding,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("serial port is closed")]
    PortClosed,
    #[error(transparent)]
    Port(#[from] OpenPortError),
    #[error("serial i/o failed: {0}")]
    Io(io::Error),
    #[error("timed out waiting for controller response")]
    TimedOut,
    #[error(
        "controller responded with {actual:#06x} instead of {expected}, response: {}",
        hex::encode(.raw)
    )]
    Controller {
        expected: MessageId,
        actual: u16,
        raw: Vec<u8>,
    },
    #[error("{expected} response truncated: {}", hex::encode(.raw))]
    Truncated { expected: MessageId, raw: Vec<u8> },
    #[error("data packet of {0} bytes does not fit the 16-bit length field")]
    PayloadTooLong(usize),
    #[error("{value} mm scales to {scaled} counts, outside the 32-bit encoder range")]
    Encoding { value: f64, scaled: f64 },
    #[error("invalid scale factor {0}")]
    InvalidScale(f64),
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::PortClosed | ProtocolError::Port(_) | ProtocolError::Io(_) => {
                ErrorKind::Transport
            }
            ProtocolError::TimedOut => ErrorKind::Timeout,
            ProtocolError::Controller { .. } | ProtocolError::Truncated { .. } => {
                ErrorKind::Controller
            }
            ProtocolError::Encoding { .. }
            | ProtocolError::PayloadTooLong(_)
            | ProtocolError::InvalidScale(_) => ErrorKind::Encoding,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProtocolError::TimedOut,
            _ => ProtocolError::Io(err),
        }
    }
}

/// Reported by the controller once homing finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeStatus {
    pub channel: u8,
}

/// Payload of a move-completed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveStatus {
    pub channel: u16,
    /// Position in encoder counts.
    pub position: i32,
    pub encoder_count: i32,
    pub status_bits: u32,
}

/// Blocking command set of a single-axis stepper controller.
///
/// Motion commands return once the controller reports completion.
/// Configuration commands return as soon as the frame is written.
pub trait Motor {
    /// Flash the controller front panel.
    fn identify(&mut self) -> Result<()>;
    fn home(&mut self) -> Result<HomeStatus>;
    /// Move to `position` millimeters from home.
    fn move_absolute(&mut self, position: f64) -> Result<MoveStatus>;
    /// Move by `distance` millimeters.
    fn move_relative(&mut self, distance: f64) -> Result<MoveStatus>;
    /// Move by `counts` encoder counts.
    fn step(&mut self, counts: i32) -> Result<MoveStatus>;
    fn set_backlash(&mut self, distance: f64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_bytes_are_little_endian() {
        assert_eq!(MessageId::ModIdentify.to_le_bytes(), [0x23, 0x02]);
        assert_eq!(MessageId::MoveHome.to_le_bytes(), [0x43, 0x04]);
        assert_eq!(MessageId::MoveHomed.to_le_bytes(), [0x44, 0x04]);
        assert_eq!(MessageId::MoveAbsolute.to_le_bytes(), [0x53, 0x04]);
        assert_eq!(MessageId::MoveRelative.to_le_bytes(), [0x48, 0x04]);
        assert_eq!(MessageId::MoveCompleted.to_le_bytes(), [0x64, 0x04]);
        assert_eq!(MessageId::SetBacklash.to_le_bytes(), [0x3a, 0x04]);
    }

    #[test]
    fn describe_known_and_unknown_ids() {
        assert_eq!(describe_id(0x0444), "MGMSG_MOT_MOVE_HOMED (0x0444)");
        assert_eq!(describe_id(0x0401), "0x0401");
    }

    #[test]
    fn timeouts_are_classified_separately() {
        let err: ProtocolError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err: ProtocolError = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert_eq!(err.kind(), ErrorKind::Transport);

        assert_eq!(ProtocolError::PortClosed.kind(), ErrorKind::Transport);
    }

    #[test]
    fn controller_error_message_carries_hex() {
        let err = ProtocolError::Controller {
            expected: MessageId::MoveHomed,
            actual: 0x0401,
            raw: vec![0x01, 0x04, 0x00, 0x00, 0x01, 0x50],
        };
        let msg = err.to_string();
        assert!(msg.contains("010400000150"));
        assert!(msg.contains("MGMSG_MOT_MOVE_HOMED"));
        assert_eq!(err.kind(), ErrorKind::Controller);
    }
}
