//! Defines the WebSocket envelope protocol spoken by the telephony media stream.
//!
//! Every frame on this socket is a JSON envelope discriminated by its
//! `event` field. Audio rides inside `media` envelopes as base64 text;
//! the stream identifier arrives once, in the `start` envelope, and must
//! be echoed on everything we send back.

use crate::audio;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Envelopes exchanged with the telephony provider. Unknown `event`
/// values collapse into `Other` so new envelope kinds never break a call.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Envelope {
    /// Protocol preamble, sent once before `start`. Carries nothing we need.
    Connected,
    /// The stream is live; captures the identifier for outbound envelopes.
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    /// One chunk of base64 mu-law audio.
    Media {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    /// The caller hung up or the provider ended the stream.
    Stop,
    #[serde(other)]
    Other,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MediaPayload {
    pub payload: String,
}

/// What the bridge actually reacts to, with audio already decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyEvent {
    Connected,
    Start { stream_sid: String },
    Audio(Bytes),
    Stop,
}

/// Splits an accepted telephony socket into its two directions.
pub fn split(socket: WebSocket) -> (TelephonySender, TelephonyReceiver) {
    let (sink, stream) = socket.split();
    (
        TelephonySender {
            sink: Arc::new(Mutex::new(sink)),
            closed: Arc::new(AtomicBool::new(false)),
        },
        TelephonyReceiver { stream },
    )
}

/// Write half of the telephony socket, shared between the bridge tasks.
#[derive(Clone)]
pub struct TelephonySender {
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    closed: Arc<AtomicBool>,
}

impl TelephonySender {
    /// Wraps raw agent audio in a `media` envelope tagged with the stream id.
    pub async fn send_audio(&self, stream_sid: &str, audio: &[u8]) -> Result<()> {
        let envelope = Envelope::Media {
            stream_sid: Some(stream_sid.to_string()),
            media: MediaPayload {
                payload: audio::encode_payload(audio),
            },
        };
        let serialized = serde_json::to_string(&envelope)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(serialized.into()))
            .await?;
        Ok(())
    }

    /// Closes the socket. Safe to call from several places; only the first
    /// call sends the close frame.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.sink.lock().await.close().await {
                debug!(error = ?e, "telephony socket already gone on close");
            }
        }
    }
}

/// Read half of the telephony socket.
pub struct TelephonyReceiver {
    stream: SplitStream<WebSocket>,
}

impl TelephonyReceiver {
    /// Next decoded event, or `None` once the peer is gone. Undecodable
    /// frames are logged and skipped; they never end the call.
    pub async fn next_event(&mut self) -> Option<TelephonyEvent> {
        while let Some(frame) = self.stream.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = ?e, "error receiving from telephony socket");
                    return None;
                }
            };
            match message {
                Message::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => {
                        if let Some(event) = decode_envelope(envelope) {
                            return Some(event);
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping undecodable telephony envelope"),
                },
                Message::Binary(_) => warn!("unexpected binary frame from telephony side"),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        None
    }
}

/// Maps an envelope to a bridge event. `None` means the envelope carries
/// nothing actionable and the caller should keep reading.
fn decode_envelope(envelope: Envelope) -> Option<TelephonyEvent> {
    match envelope {
        Envelope::Connected => Some(TelephonyEvent::Connected),
        Envelope::Start { stream_sid } => Some(TelephonyEvent::Start { stream_sid }),
        Envelope::Media { media, .. } => match audio::decode_payload(&media.payload) {
            Ok(audio) => Some(TelephonyEvent::Audio(audio)),
            Err(e) => {
                warn!(error = %e, "skipping media envelope with undecodable payload");
                None
            }
        },
        Envelope::Stop => Some(TelephonyEvent::Stop),
        Envelope::Other => {
            debug!("ignoring unhandled telephony envelope");
            None
        }
    }
}
