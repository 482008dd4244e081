//! Arcus: a length-prefixed, JSON-payload TCP protocol between a game server
//! process and an orchestration agent, plus the façades that speak it from
//! each side.
//!
//! The wire layer (`header`, `codec`, `message`, `opcode`, `payload`) and the
//! single-threaded connection core (`connection`) are the part embedders
//! should be able to trust blind: non-blocking, allocation-bounded, and
//! driven entirely by repeated calls to `update()`. `server`/`client` are the
//! two façades built on top of it; `ffi` exposes the `Server` façade to C.

pub mod accumulator;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod ffi;
pub mod header;
pub mod health;
pub mod message;
pub mod opcode;
pub mod payload;
pub mod ring;
pub mod server;
pub mod socket;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::{Error, Result};
pub use message::Message;
pub use opcode::Opcode;
pub use payload::Payload;
pub use server::{ApplicationInstanceStatus, Server};
