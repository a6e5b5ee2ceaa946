//! TCP transport between the client and a property estimator server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐     one TCP connection      ┌──────────────────────┐
//! │ PropertyEstimatorClient │ ◄─────── per request ──────►│ estimator server     │
//! │   (submit / query)      │    length-prefixed frames   │ (calculation layers) │
//! └─────────────────────────┘                             └──────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Requests are `u32 type ++ u32 length ++ payload`, responses are
//! `u32 length ++ payload`, all big-endian. See [`framing`] for details.

pub mod connection;
pub mod framing;

pub use connection::{exchange, perform, report_failure, IpcError};
pub use framing::{
    decode, decode_header, encode, pack_int, read_request, read_response, write_request,
    write_response, MessageType, ProtocolError, MAX_MESSAGE_SIZE,
};
