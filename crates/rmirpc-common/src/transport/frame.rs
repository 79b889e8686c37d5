//! Length-prefixed framing
//!
//! Wire format: `[4-byte length as u32 big-endian] + [payload]`.
//!
//! A declared length of zero is invalid, as is a length above the reader's
//! configured maximum. Both are reported as `Codec` errors and the caller is
//! expected to close the connection, since the stream position can no longer
//! be trusted.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on one frame's payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Builds one complete frame in memory.
///
/// # Example
///
/// ```
/// use rmirpc_common::transport::frame::encode_frame;
///
/// let frame = encode_frame(b"hi").unwrap();
/// assert_eq!(frame, vec![0, 0, 0, 2, b'h', b'i']);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = payload_len(payload)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Validates a length prefix and returns the payload size it declares.
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE], max_frame_size: usize) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;

    if len == 0 {
        return Err(RpcError::Codec("frame declares an empty payload".to_string()));
    }

    if len > max_frame_size {
        return Err(RpcError::Codec(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, max_frame_size
        )));
    }

    Ok(len)
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;

    writer
        .write_all(&frame)
        .await
        .map_err(|e| map_io_error(e, "writing frame"))?;

    writer
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between
/// frames. A stream that ends inside a frame is a transport error.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;

    while filled < LENGTH_PREFIX_SIZE {
        let n = reader
            .read(&mut prefix[filled..])
            .await
            .map_err(|e| map_io_error(e, "reading length prefix"))?;

        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(RpcError::Transport(
                "connection closed inside a length prefix".to_string(),
            ));
        }

        filled += n;
    }

    let len = decode_length(prefix, max_frame_size)?;

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| map_io_error(e, "reading frame payload"))?;

    Ok(Some(payload))
}

fn payload_len(payload: &[u8]) -> Result<u32> {
    if payload.is_empty() {
        return Err(RpcError::Codec("refusing to send an empty frame".to_string()));
    }

    u32::try_from(payload.len())
        .map_err(|_| RpcError::Codec(format!("payload of {} bytes does not fit a frame", payload.len())))
}

/// Maps IO errors onto the error taxonomy.
///
/// - Lost or half-closed connections -> `Transport`
/// - Everything else -> `Io`
pub fn map_io_error(err: std::io::Error, context: &str) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => {
            RpcError::Transport(format!("{}: connection lost", context))
        }
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            RpcError::Transport(format!("{}: timed out", context))
        }
        _ => RpcError::Io(err),
    }
}
