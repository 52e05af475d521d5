// error.rs -- error taxonomy for the protocol client
//
// Mirrors the teacher's ERR_FATAL/ERR_DROP split in myq2-common::common,
// but expressed as typed Results instead of Com_Error's print-then-panic
// (or print-and-continue) behavior, so decode failures never tear down
// a live connection.

use std::io;
use thiserror::Error;

/// Failure to decode a single field or opcode out of a message payload.
/// Always recoverable: the decoder aborts the current payload and keeps
/// the connection alive.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated message: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("fragment out of order or overflowing")]
    BadFragment,

    #[error("zlib inflate failed: {0}")]
    Inflate(String),

    #[error("unsupported protocol version {0}")]
    UnsupportedProtocol(i32),
}

/// Socket-layer failure. Fatal for the current connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to send datagram: {0}")]
    Send(#[source] io::Error),

    #[error("failed to receive datagram: {0}")]
    Recv(#[source] io::Error),
}

/// Top-level client error, mirroring spec's error taxonomy:
/// TransportError, HandshakeRejected, ReconnectExhausted, MonitorTimeout.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("reconnect attempts exhausted ({attempts} tried)")]
    ReconnectExhausted { attempts: u32 },

    #[error("status query timed out")]
    MonitorTimeout,
}
