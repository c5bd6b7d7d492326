// src/link/frame.rs

//! Length-prefixed framing for the Orchestrator link.
//!
//! ```text
//! +------+----------------+-------------------+
//! | 0xB7 | len: u32 (BE)  | payload: len bytes |
//! +------+----------------+-------------------+
//! ```

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// First byte of every frame.
pub const FRAME_MARKER: u8 = 0xB7;

#[derive(Error, Debug)]
pub enum FrameError {
    /// The declared length exceeded the limit. The payload has been skipped
    /// and the stream is positioned at the next frame boundary.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the session can keep reading after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::TooLarge { .. })
    }
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary. Bytes
/// other than the marker at a boundary are skipped until the next marker.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut skipped = 0usize;
    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof && skipped == 0 => {
                return Ok(None);
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(skipped, "stream ended while resynchronising");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if byte == FRAME_MARKER {
            break;
        }
        skipped += 1;
    }

    if skipped > 0 {
        warn!(skipped, "discarded bytes before frame marker");
    }

    let len = reader.read_u32().await? as usize;
    if len > max_len {
        skip_exact(reader, len).await?;
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = Vec::with_capacity(payload.len() + 5);
    buf.push(FRAME_MARKER);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn skip_exact<R>(reader: &mut R, len: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let copied = tokio::io::copy(&mut reader.take(len as u64), &mut tokio::io::sink()).await?;
    if copied < len as u64 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}
