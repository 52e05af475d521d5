// lib.rs -- q2-spectator-client: a Quake 2 protocol client for spectating
// and console-message consumption, without rendering, sound, or prediction.

pub mod client;
pub mod compression;
pub mod config;
pub mod decoder;
pub mod entity;
pub mod error;
pub mod events;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod monitor;
pub mod net_chan;
pub mod oob;
pub mod player;
pub mod protocol;
pub mod socket;

pub use client::Q2Client;
pub use config::ClientConfig;
pub use entity::EntityState;
pub use error::{ClientError, DecodeError, TransportError};
pub use events::{Event, EventPayload};
pub use handshake::HandshakeState;
pub use player::PlayerState;
pub use protocol::ProtocolVersion;
