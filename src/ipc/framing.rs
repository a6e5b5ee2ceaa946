//! Length-prefixed message framing for the estimator TCP protocol.
//!
//! # Wire Format
//!
//! Requests carry a message type ahead of the length:
//!
//! ```text
//! +----------------+------------------+-----------------+
//! | type (u32, BE) | length (u32, BE) | payload (bytes) |
//! +----------------+------------------+-----------------+
//! ```
//!
//! Responses are untagged:
//!
//! ```text
//! +------------------+-----------------+
//! | length (u32, BE) | payload (bytes) |
//! +------------------+-----------------+
//! ```
//!
//! A response length of zero means the server has nothing to report yet.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of every header field on the wire.
pub const HEADER_SIZE: usize = 4;

/// Maximum payload size (100MB) to prevent OOM from malicious/buggy servers.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Request message types understood by the estimator server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Submission = 0,
    Query = 1,
}

impl MessageType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Submission => "Submission",
            MessageType::Query => "Query",
        }
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Submission),
            1 => Ok(MessageType::Query),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Framing errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown message type {0}")]
    UnknownMessageType(u32),

    #[error("frame truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("frame declares {declared} payload bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("message size {0} exceeds maximum {max} bytes", max = MAX_MESSAGE_SIZE)]
    TooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a length or message type as a 4-byte big-endian header field.
pub fn pack_int(value: u32) -> [u8; HEADER_SIZE] {
    value.to_be_bytes()
}

/// Parse a 4-byte big-endian header field.
pub fn decode_header(header: [u8; HEADER_SIZE]) -> u32 {
    u32::from_be_bytes(header)
}

/// Encode a request frame: `type ++ length ++ payload`.
pub fn encode(message_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let length = checked_length(payload.len())?;

    let mut frame = Vec::with_capacity(2 * HEADER_SIZE + payload.len());
    frame.extend_from_slice(&pack_int(message_type.as_u32()));
    frame.extend_from_slice(&pack_int(length));
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a complete request frame produced by [`encode`].
pub fn decode(frame: &[u8]) -> Result<(MessageType, Vec<u8>), ProtocolError> {
    const FRAME_HEADER_SIZE: usize = 2 * HEADER_SIZE;

    if frame.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::Truncated {
            expected: FRAME_HEADER_SIZE,
            actual: frame.len(),
        });
    }

    let (type_bytes, rest) = split_header(frame);
    let (length_bytes, payload) = split_header(rest);

    let message_type = MessageType::try_from(decode_header(type_bytes))?;
    let declared = decode_header(length_bytes) as usize;

    if declared != payload.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    Ok((message_type, payload.to_vec()))
}

// Callers check that `bytes` holds at least HEADER_SIZE bytes.
fn split_header(bytes: &[u8]) -> ([u8; HEADER_SIZE], &[u8]) {
    let (head, rest) = bytes.split_at(HEADER_SIZE);
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(head);
    (header, rest)
}

fn checked_length(len: usize) -> Result<u32, ProtocolError> {
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }
    // MAX_MESSAGE_SIZE fits in a u32
    Ok(len as u32)
}

/// Write one request frame to the stream and flush it.
pub async fn write_request<W>(
    writer: &mut W,
    message_type: MessageType,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message_type, payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one response frame from the stream.
///
/// Returns `None` when the server answered with a zero length, which means
/// "no response yet".
///
/// # Errors
///
/// Returns an error if:
/// - The stream closes before the header or body is complete
/// - The declared length exceeds [`MAX_MESSAGE_SIZE`]
pub async fn read_response<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let size = decode_header(header) as usize;
    if size == 0 {
        return Ok(None);
    }
    if size > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(size));
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Write one untagged response frame. Used by servers and test doubles.
pub async fn write_response<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let length = checked_length(payload.len())?;
    writer.write_all(&pack_int(length)).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one tagged request frame. Used by servers and test doubles.
pub async fn read_request<R>(reader: &mut R) -> Result<(MessageType, Vec<u8>), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let message_type = MessageType::try_from(decode_header(header))?;

    reader.read_exact(&mut header).await?;
    let size = decode_header(header) as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(size));
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok((message_type, body))
}
