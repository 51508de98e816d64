//! Handles the outbound WebSocket connection to the hosted voice agent.
//!
//! The agent multiplexes two kinds of frames on one socket: binary frames
//! carrying raw mu-law audio, and text frames carrying JSON events
//! discriminated by their `type` field. The first thing sent after
//! connecting must be the opaque `Settings` payload; the agent answers
//! with `Welcome` and the conversation runs from there.

use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, client::IntoClientRequest, http::HeaderValue, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

type AgentStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failures while establishing or speaking to the agent link.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid agent credentials: {0}")]
    Credentials(#[from] tungstenite::http::header::InvalidHeaderValue),
    #[error("agent websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("could not encode agent payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// JSON events exchanged with the agent. Unhandled `type` values collapse
/// into `Other` so protocol additions never break a call.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// The agent accepted our settings and opened the session.
    Welcome {
        #[serde(default)]
        request_id: Option<String>,
    },
    /// A transcript line, from either side of the conversation.
    ConversationText { role: String, content: String },
    /// The agent wants a function executed on its behalf.
    FunctionCallRequest {
        function_name: String,
        function_call_id: String,
        #[serde(default)]
        input: Value,
    },
    /// Our answer to a `FunctionCallRequest`; the id is echoed verbatim.
    FunctionCallResponse {
        function_call_id: String,
        output: String,
    },
    /// The agent is formulating a response.
    AgentThinking,
    /// The agent reported a problem with the session or the last input.
    Error {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// One frame off the agent socket.
#[derive(Debug, Clone)]
pub enum AgentFrame {
    Audio(Bytes),
    Event(AgentEvent),
}

/// Connects to the agent and splits the socket into its two directions.
///
/// No retry: if the agent cannot be reached the call it was meant to
/// serve cannot proceed, and the caller decides what to tear down.
pub async fn connect(url: &str, api_key: &str) -> Result<(AgentSender, AgentReceiver), AgentError> {
    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Token {}", api_key))?,
    );

    let (stream, _) = connect_async(request).await?;
    info!("connected to voice agent");

    let (sink, stream) = stream.split();
    Ok((
        AgentSender {
            sink: Arc::new(Mutex::new(sink)),
            closed: Arc::new(AtomicBool::new(false)),
        },
        AgentReceiver { stream },
    ))
}

/// Write half of the agent socket, shared between the bridge tasks.
#[derive(Clone)]
pub struct AgentSender {
    sink: Arc<Mutex<SplitSink<AgentStream, WsMessage>>>,
    closed: Arc<AtomicBool>,
}

impl AgentSender {
    /// Sends the opaque `Settings` handshake payload.
    pub async fn send_settings(&self, settings: &Value) -> Result<(), AgentError> {
        let serialized = serde_json::to_string(settings)?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(serialized.into()))
            .await?;
        Ok(())
    }

    /// Forwards one chunk of caller audio as a binary frame.
    pub async fn send_audio(&self, audio: Bytes) -> Result<(), AgentError> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Binary(audio))
            .await?;
        Ok(())
    }

    /// Sends a JSON event, e.g. a `FunctionCallResponse`.
    pub async fn send_event(&self, event: &AgentEvent) -> Result<(), AgentError> {
        let serialized = serde_json::to_string(event)?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(serialized.into()))
            .await?;
        Ok(())
    }

    /// Closes the socket. Safe to call from several places; only the first
    /// call sends the close frame.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.sink.lock().await.close().await {
                debug!(error = ?e, "agent socket already gone on close");
            }
        }
    }
}

/// Read half of the agent socket.
pub struct AgentReceiver {
    stream: SplitStream<AgentStream>,
}

impl AgentReceiver {
    /// Next frame, or `None` once the agent is gone. Undecodable text
    /// frames are logged and skipped; they never end the call.
    pub async fn next_frame(&mut self) -> Option<AgentFrame> {
        while let Some(frame) = self.stream.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = ?e, "error receiving from agent socket");
                    return None;
                }
            };
            match message {
                WsMessage::Binary(audio) => return Some(AgentFrame::Audio(audio)),
                WsMessage::Text(text) => match serde_json::from_str::<AgentEvent>(&text) {
                    Ok(event) => return Some(AgentFrame::Event(event)),
                    Err(e) => warn!(error = %e, "skipping undecodable agent event"),
                },
                WsMessage::Close(_) => return None,
                _ => {}
            }
        }
        None
    }
}
