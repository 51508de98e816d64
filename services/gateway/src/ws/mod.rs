//! WebSocket Session Bridging
//!
//! Everything needed to relay one phone call between the telephony
//! provider and the hosted voice agent, one submodule per concern:
//!
//! - `twilio`: the inbound envelope protocol (JSON over WebSocket, base64 audio).
//! - `deepgram`: the outbound agent link (binary audio plus JSON events).
//! - `session`: the call lifecycle, from agent handshake to joint teardown.

pub mod deepgram;
pub mod session;
pub mod twilio;

pub use session::ws_handler;
