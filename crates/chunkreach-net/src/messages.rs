//! Message types exchanged with the auxiliary chunk server.
//!
//! Each frame payload is one message: a type byte followed by a body whose
//! extent is the rest of the frame. There are no inner length fields.
//!
//! | Direction | Type | Body |
//! |-----------|------|------|
//! | outbound | 0 | `timestamp_ms: i64` + serialized chunk |
//! | outbound | 1 | UTF-8 text |
//! | outbound | 2 | repeated `x: i32, z: i32` |
//! | inbound  | 0 | serialized chunk |
//! | inbound  | 1 | UTF-8 text |

use chunkreach_chunk::{ChunkData, ChunkSerError, WireError, WireReader};
use chunkreach_coords::Pos2;

pub const SEND_CHUNK_DATA: u8 = 0;
pub const SEND_STRING_MSG: u8 = 1;
pub const SEND_CHUNKS_REQUEST: u8 = 2;

pub const RECV_CHUNK_DATA: u8 = 0;
pub const RECV_STATUS_MSG: u8 = 1;

/// Bytes per position in a chunk request.
const POS_BYTES: usize = 8;

/// Errors produced while decoding a message payload.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The frame had no type byte.
    #[error("empty frame")]
    EmptyFrame,
    /// A chunk push carried no chunk bytes.
    #[error("chunk message without chunk data")]
    EmptyChunk,
    /// The type byte is not known for this direction.
    #[error("unknown message type {0}")]
    UnknownType(u8),
    /// A chunk request body is not a whole number of positions.
    #[error("chunk request body of {0} bytes is not a multiple of 8")]
    RequestLength(usize),
    /// A string body is not valid UTF-8.
    #[error("invalid UTF-8 in string message: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// A fixed-width field was cut short.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The chunk body failed to decode.
    #[error("chunk decode failed: {0}")]
    Chunk(#[from] ChunkSerError),
}

/// Messages this client sends to the auxiliary server.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// One of the client's own game chunks, already redacted.
    ChunkData { timestamp_ms: i64, data: ChunkData },
    /// A `key=value` announcement.
    StringMessage(String),
    /// Positions the client wants pushed, nearest first.
    ChunksRequest(Vec<Pos2>),
}

impl OutboundMessage {
    pub fn type_id(&self) -> u8 {
        match self {
            Self::ChunkData { .. } => SEND_CHUNK_DATA,
            Self::StringMessage(_) => SEND_STRING_MSG,
            Self::ChunksRequest(_) => SEND_CHUNKS_REQUEST,
        }
    }

    /// Encode into a frame payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.type_id()];
        match self {
            Self::ChunkData { timestamp_ms, data } => {
                buf.extend_from_slice(&timestamp_ms.to_be_bytes());
                data.serialize_into(&mut buf);
            }
            Self::StringMessage(text) => buf.extend_from_slice(text.as_bytes()),
            Self::ChunksRequest(positions) => {
                buf.reserve(positions.len() * POS_BYTES);
                for pos in positions {
                    buf.extend_from_slice(&pos.x.to_be_bytes());
                    buf.extend_from_slice(&pos.z.to_be_bytes());
                }
            }
        }
        buf
    }

    /// Decode a frame payload as the server would.
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let (&type_id, body) = payload.split_first().ok_or(MessageError::EmptyFrame)?;
        match type_id {
            SEND_CHUNK_DATA => {
                let mut r = WireReader::new(body);
                let timestamp_ms = r.read_i64()?;
                let data = ChunkData::deserialize(r.rest())?;
                Ok(Self::ChunkData { timestamp_ms, data })
            }
            SEND_STRING_MSG => Ok(Self::StringMessage(String::from_utf8(body.to_vec())?)),
            SEND_CHUNKS_REQUEST => decode_positions(body).map(Self::ChunksRequest),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

/// Messages the auxiliary server sends to this client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// An extra chunk outside the game server's radius.
    ChunkData(ChunkData),
    /// Human-readable server status.
    StatusMessage(String),
}

impl InboundMessage {
    pub fn type_id(&self) -> u8 {
        match self {
            Self::ChunkData(_) => RECV_CHUNK_DATA,
            Self::StatusMessage(_) => RECV_STATUS_MSG,
        }
    }

    /// Encode into a frame payload as the server would.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.type_id()];
        match self {
            Self::ChunkData(data) => data.serialize_into(&mut buf),
            Self::StatusMessage(text) => buf.extend_from_slice(text.as_bytes()),
        }
        buf
    }

    /// Decode a frame payload received from the server.
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let (&type_id, body) = payload.split_first().ok_or(MessageError::EmptyFrame)?;
        match type_id {
            RECV_CHUNK_DATA if body.is_empty() => Err(MessageError::EmptyChunk),
            RECV_CHUNK_DATA => Ok(Self::ChunkData(ChunkData::deserialize(body)?)),
            RECV_STATUS_MSG => Ok(Self::StatusMessage(
                String::from_utf8_lossy(body).into_owned(),
            )),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

fn decode_positions(body: &[u8]) -> Result<Vec<Pos2>, MessageError> {
    if body.len() % POS_BYTES != 0 {
        return Err(MessageError::RequestLength(body.len()));
    }
    let mut r = WireReader::new(body);
    let mut positions = Vec::with_capacity(body.len() / POS_BYTES);
    while !r.is_empty() {
        let x = r.read_i32()?;
        let z = r.read_i32()?;
        positions.push(Pos2::new(x, z));
    }
    Ok(positions)
}
