//! Core logic for the telephony-to-voice-agent gateway: configuration,
//! shared state, the WebSocket bridge, and routing. The `gateway` binary
//! is a thin wrapper around this crate.

pub mod audio;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
