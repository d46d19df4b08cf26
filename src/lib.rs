pub mod port;
pub mod protocol;
pub mod units;

pub use port::{open, open_port, PortConfig};
pub use protocol::apt::{AptProtocol, DriverConfig};
pub use protocol::{
    Address, ErrorKind, HomeStatus, MessageId, Motor, MoveStatus, ProtocolError, Result,
};
pub use units::Scale;
