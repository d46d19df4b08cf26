use std::io::{Read, Write};

use log::{debug, info, warn};

use super::{
    describe_id, Address, HomeStatus, MessageId, Motor, MoveStatus, ProtocolError, Result,
};
use crate::units::Scale;

const SHORT_FRAME_LEN: usize = 6;
const HEADER_LEN: usize = 6;

const HOMED_LEN: usize = 6;
const MOVE_COMPLETED_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverConfig {
    pub address: Address,
    pub scale: Scale,
    /// Channel identifier placed in position payloads.
    pub channel: u16,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            address: Address::default(),
            scale: Scale::ZFS,
            channel: 0,
        }
    }
}

/// Header-only frame: message id, two parameter bytes, address pair.
pub fn encode_short(
    id: MessageId,
    param1: u8,
    param2: u8,
    address: Address,
) -> [u8; SHORT_FRAME_LEN] {
    let id = id.to_le_bytes();
    [
        id[0],
        id[1],
        param1,
        param2,
        address.destination,
        address.source,
    ]
}

/// Header followed by a data packet of `data.len()` bytes.
pub fn encode_long(id: MessageId, address: Address, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > u16::MAX as usize {
        return Err(ProtocolError::PayloadTooLong(data.len()));
    }

    let mut buffer = Vec::with_capacity(HEADER_LEN + data.len());
    buffer.extend_from_slice(&id.to_le_bytes());
    buffer.extend_from_slice(&(data.len() as u16).to_le_bytes());
    buffer.push(address.destination | Address::DATA_FLAG);
    buffer.push(address.source);
    buffer.extend_from_slice(data);
    Ok(buffer)
}

/// Channel identifier followed by a signed position, both little-endian.
pub fn encode_position(
    id: MessageId,
    address: Address,
    channel: u16,
    counts: i32,
) -> Result<Vec<u8>> {
    let mut data = [0u8; 6];
    data[0..2].copy_from_slice(&channel.to_le_bytes());
    data[2..6].copy_from_slice(&counts.to_le_bytes());
    encode_long(id, address, &data)
}

/// Succeeds iff the response starts with `expected`.
pub fn check_status(expected: MessageId, raw: &[u8]) -> Result<()> {
    let actual = match raw {
        [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
        [lo] => *lo as u16,
        [] => 0,
    };

    if raw.len() < 2 || actual != expected as u16 {
        return Err(ProtocolError::Controller {
            expected,
            actual,
            raw: raw.to_vec(),
        });
    }
    Ok(())
}

fn decode_homed(raw: &[u8]) -> Result<HomeStatus> {
    check_status(MessageId::MoveHomed, raw)?;
    Ok(HomeStatus {
        channel: raw.get(2).copied().unwrap_or_default(),
    })
}

fn decode_move_completed(raw: &[u8]) -> Result<MoveStatus> {
    check_status(MessageId::MoveCompleted, raw)?;
    if raw.len() < MOVE_COMPLETED_LEN {
        return Err(ProtocolError::Truncated {
            expected: MessageId::MoveCompleted,
            raw: raw.to_vec(),
        });
    }

    let data = &raw[HEADER_LEN..MOVE_COMPLETED_LEN];
    Ok(MoveStatus {
        channel: u16::from_le_bytes(data[0..2].try_into().unwrap()),
        position: i32::from_le_bytes(data[2..6].try_into().unwrap()),
        encoder_count: i32::from_le_bytes(data[6..10].try_into().unwrap()),
        status_bits: u32::from_le_bytes(data[10..14].try_into().unwrap()),
    })
}

/// APT driver over a single serial channel.
///
/// The port is owned by the driver. After [`AptProtocol::close`] every
/// command fails with [`ProtocolError::PortClosed`] without touching the wire.
pub struct AptProtocol<P> {
    port: Option<P>,
    config: DriverConfig,
}

impl<P: Read + Write> AptProtocol<P> {
    pub fn new(port: P) -> Self {
        Self::with_config(port, DriverConfig::default())
    }

    pub fn with_config(port: P, config: DriverConfig) -> Self {
        Self {
            port: Some(port),
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Flushes and releases the port.
    pub fn close(&mut self) -> Result<()> {
        match self.port.take() {
            Some(mut port) => {
                port.flush()?;
                debug!("port closed");
                Ok(())
            }
            None => Err(ProtocolError::PortClosed),
        }
    }

    /// Gives the port back, or `None` if it was already closed.
    pub fn into_inner(self) -> Option<P> {
        self.port
    }

    fn port(&mut self) -> Result<&mut P> {
        self.port.as_mut().ok_or(ProtocolError::PortClosed)
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let port = self.port()?;
        debug!("send {:02x?}", frame);
        port.write_all(frame)?;
        port.flush()?;
        Ok(())
    }

    fn recv(&mut self, len: usize) -> Result<Vec<u8>> {
        let port = self.port()?;
        let mut buffer = vec![0u8; len];
        port.read_exact(&mut buffer)?;
        debug!("recv {:02x?}", buffer);
        Ok(buffer)
    }

    fn transact(&mut self, frame: &[u8], response_len: usize) -> Result<Vec<u8>> {
        self.send(frame)?;
        self.recv(response_len)
    }

    fn position_command(&mut self, id: MessageId, counts: i32) -> Result<MoveStatus> {
        let frame = encode_position(id, self.config.address, self.config.channel, counts)?;

        info!("{} {} counts, waiting for completion", id.name(), counts);
        let raw = self.transact(&frame, MOVE_COMPLETED_LEN)?;

        let status = decode_move_completed(&raw).map_err(|e| {
            warn!(
                "{} failed, controller sent {}: {}",
                id.name(),
                describe_id(u16::from_le_bytes([raw[0], raw[1]])),
                hex::encode(&raw)
            );
            e
        })?;
        info!(
            "positioning completed at {} counts ({:.6} mm)",
            status.position,
            self.config.scale.to_mm(status.position)
        );
        Ok(status)
    }
}

impl<P: Read + Write> Motor for AptProtocol<P> {
    fn identify(&mut self) -> Result<()> {
        let frame = encode_short(MessageId::ModIdentify, 0, 0, self.config.address);
        info!("{}", MessageId::ModIdentify.name());
        self.send(&frame)
    }

    fn home(&mut self) -> Result<HomeStatus> {
        let frame = encode_short(MessageId::MoveHome, 0, 0, self.config.address);

        info!("{}, waiting for completion", MessageId::MoveHome.name());
        let raw = self.transact(&frame, HOMED_LEN)?;

        let status = decode_homed(&raw).map_err(|e| {
            warn!("homing failed: {}", hex::encode(&raw));
            e
        })?;
        info!("homing completed");
        Ok(status)
    }

    fn move_absolute(&mut self, position: f64) -> Result<MoveStatus> {
        self.port()?;
        let counts = self.config.scale.to_counts(position)?;
        self.position_command(MessageId::MoveAbsolute, counts)
    }

    fn move_relative(&mut self, distance: f64) -> Result<MoveStatus> {
        self.port()?;
        let counts = self.config.scale.to_counts(distance)?;
        self.position_command(MessageId::MoveRelative, counts)
    }

    fn step(&mut self, counts: i32) -> Result<MoveStatus> {
        self.position_command(MessageId::MoveRelative, counts)
    }

    fn set_backlash(&mut self, distance: f64) -> Result<()> {
        self.port()?;
        let counts = self.config.scale.to_counts(distance)?;
        let frame = encode_position(
            MessageId::SetBacklash,
            self.config.address,
            self.config.channel,
            counts,
        )?;

        info!("{} {} counts", MessageId::SetBacklash.name(), counts);
        self.send(&frame)
    }
}
