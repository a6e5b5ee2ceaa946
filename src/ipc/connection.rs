//! One-shot TCP exchanges with the estimator server.
//!
//! Every logical operation opens a fresh connection, writes exactly one
//! request frame, reads exactly one response frame and closes the
//! connection again. Nothing is pooled or reused.

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::ipc::framing::{read_response, write_request, MessageType, ProtocolError};

/// Transport-level failures.
///
/// These never reach callers of [`perform`]; they are logged and folded into
/// an absent response.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Failed to connect to the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// Protocol-level error (framing, short reads, closed stream).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => IpcError::ConnectionFailed(err),
            _ => IpcError::Io(err),
        }
    }
}

/// Send one frame to `address:port` and return the server's answer.
///
/// Returns `None` both when the server answered with an empty payload and
/// when the exchange failed at the transport level. Failures are logged.
pub async fn perform(
    address: &str,
    port: u16,
    message_type: MessageType,
    payload: &[u8],
) -> Option<Vec<u8>> {
    match exchange(address, port, message_type, payload).await {
        Ok(response) => response,
        Err(e) => {
            report_failure(address, port, &e);
            None
        }
    }
}

/// Log a transport failure the caller is about to treat as "no response".
pub fn report_failure(address: &str, port: u16, error: &IpcError) {
    warn!(
        "Error connecting to {}:{} : {}. Please ensure the server is running and \
         that the server address / port is correct.",
        address, port, error
    );
}

/// Perform the exchange and surface transport failures.
pub async fn exchange(
    address: &str,
    port: u16,
    message_type: MessageType,
    payload: &[u8],
) -> Result<Option<Vec<u8>>, IpcError> {
    info!("Attempting connection to {}:{}", address, port);

    let mut stream = TcpStream::connect((address, port))
        .await
        .map_err(IpcError::ConnectionFailed)?;

    debug!("Connected to {}:{}", address, port);

    stream.set_nodelay(true)?;

    write_request(&mut stream, message_type, payload).await?;

    debug!(
        "Sent {} frame ({} bytes) to {}:{}, waiting for a response",
        message_type.as_str(),
        payload.len(),
        address,
        port
    );

    let response = read_response(&mut stream).await?;

    info!(
        "Received response from server of length {}",
        response.as_ref().map_or(0, Vec::len)
    );

    // The server closing first is fine; the response has been read in full.
    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown after response failed: {}", e);
    }

    Ok(response)
}
