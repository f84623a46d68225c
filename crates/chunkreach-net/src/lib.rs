//! Client side of the auxiliary chunk server protocol: framing, message
//! codec, address parsing, socket setup, reconnect backoff, and the
//! connection itself.

pub mod address;
pub mod connection;
pub mod framing;
pub mod messages;
pub mod reconnection;
pub mod socket;

pub use address::{AddressError, DEFAULT_PORT, ServerAddress};
pub use connection::{
    AuxLink, ConnectionEvent, ConnectionState, ConnectionStateWatch, DisconnectReason,
    ProtocolConnection,
};
pub use framing::{FrameConfig, FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use messages::{InboundMessage, MessageError, OutboundMessage};
pub use reconnection::{ReconnectConfig, ReconnectState};
pub use socket::{SocketConfig, configure_stream};
