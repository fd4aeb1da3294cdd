//! Networking: a client/server channel for log and command messages.
//!
//! A game client ships its log ring to a headless server and accepts
//! commands back (`restart` above all); browsers connect through WebSocket
//! framing, native builds over plain TCP. Single-threaded: one non-blocking
//! poll per frame.

pub mod node;
pub mod wire;
pub mod ws;

pub use node::{NetConfig, NetMode, Networking, NodeState};
