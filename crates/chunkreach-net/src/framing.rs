//! Length-prefixed framing for the auxiliary server stream.
//!
//! Every message on the wire is a length-prefixed frame:
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   payload          |
//! | u32 big-endian    |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The length does **not** include the 4 prefix bytes themselves and never
//! exceeds [`MAX_FRAME_LEN`]. The payload is one message: a type byte
//! followed by its body.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload length the protocol can represent.
pub const MAX_FRAME_LEN: u32 = 0x0FFF_FFFF;

/// Frame size limit. Lowering it bounds how much a single frame may make
/// the reader allocate.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Default: [`MAX_FRAME_LEN`].
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_FRAME_LEN,
        }
    }
}

/// Transport-level framing failures. Any of these ends the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: u32 },

    /// EOF at or inside a frame.
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl FrameConfig {
    fn check(&self, size: usize) -> Result<u32, FrameError> {
        match u32::try_from(size) {
            Ok(len) if len <= self.max_payload_size => Ok(len),
            _ => Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            }),
        }
    }
}

fn eof_as_closed(e: io::Error) -> FrameError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read the next complete frame and return its payload.
///
/// Never yields a partial frame: a stream that ends mid-frame reports
/// [`FrameError::ConnectionClosed`]. A length prefix above the cap is
/// rejected without reading further. The payload buffer grows as bytes
/// arrive, so a large prefix alone does not reserve its full length.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let len = reader.read_u32().await.map_err(eof_as_closed)?;
    let len = config.check(len as usize)? as usize;

    let mut payload = Vec::new();
    let read = (&mut *reader)
        .take(len as u64)
        .read_to_end(&mut payload)
        .await
        .map_err(eof_as_closed)?;
    if read < len {
        return Err(FrameError::ConnectionClosed);
    }
    Ok(payload)
}

/// Write `payload` as one frame and flush it. Prefix and payload go out in
/// a single write.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = config.check(payload.len())?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
