//! Manages the lifecycle of one bridged call.
//!
//! Each accepted telephony socket gets its own agent connection and a pair
//! of pump tasks, one per direction. The pumps share a `CallSession` that
//! tracks the call phase and the stream id, and a watch channel that lets
//! whichever side finishes first wind the other down cooperatively. The
//! supervisor at the bottom of `handle_call` owns teardown: both pumps are
//! joined and both sockets closed on every exit path, including pump
//! panics.

use super::{
    deepgram::{self, AgentEvent, AgentFrame, AgentReceiver, AgentSender},
    twilio::{self, TelephonyEvent, TelephonyReceiver, TelephonySender},
};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use switchboard_skills::SkillRegistry;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinError;
use tracing::{Instrument, debug, error, info, instrument, warn};

/// Lifecycle of one bridged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Telephony socket accepted, agent link not yet ready.
    Connecting,
    /// Agent link open and settings delivered.
    ConfigSent,
    /// The conversation is live.
    Active,
    /// One side has ended the call; pumps are winding down.
    Closing,
    /// Both pumps joined and both sockets closed.
    Closed,
}

/// Mutable per-call state shared by the two pump tasks.
#[derive(Debug)]
pub struct CallSession {
    phase: Phase,
    stream_sid: Option<String>,
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Connecting,
            stream_sid: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Settings are on the wire; the agent may speak at any moment.
    pub fn config_sent(&mut self) {
        if self.phase == Phase::Connecting {
            self.phase = Phase::ConfigSent;
        }
    }

    /// First sign of life from either side makes the session active.
    pub fn activate(&mut self, reason: &str) {
        if self.phase == Phase::ConfigSent {
            debug!(reason, "session active");
            self.phase = Phase::Active;
        }
    }

    /// Records the telephony stream id and activates the session.
    pub fn start_stream(&mut self, stream_sid: String) {
        if matches!(self.phase, Phase::Closing | Phase::Closed) {
            warn!("ignoring stream start while closing");
            return;
        }
        self.stream_sid = Some(stream_sid);
        self.activate("telephony start");
    }

    /// One side is done; nothing new may be forwarded.
    pub fn begin_closing(&mut self, reason: &str) {
        if !matches!(self.phase, Phase::Closing | Phase::Closed) {
            info!(reason, "closing session");
            self.phase = Phase::Closing;
        }
    }

    /// Terminal state, entered exactly once teardown has finished.
    pub fn closed(&mut self) {
        self.phase = Phase::Closed;
    }

    /// Caller audio is forwarded only inside a started, still-open stream.
    pub fn may_forward_caller_audio(&self) -> bool {
        self.stream_sid.is_some() && !matches!(self.phase, Phase::Closing | Phase::Closed)
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Upgrades the telephony HTTP request into the bridged WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_call(socket, state, peer))
}

/// Entry point for one call: agent setup, then the bridged pump pair.
#[instrument(name = "call", skip_all, fields(call_id, peer = %peer))]
async fn handle_call(socket: WebSocket, state: Arc<AppState>, peer: SocketAddr) {
    let call_id: u32 = rand::random();
    tracing::Span::current().record("call_id", &call_id.to_string());
    info!("new call connected");

    let session = Arc::new(Mutex::new(CallSession::new()));
    let config = &state.config;

    // Without the agent there is no call to bridge. No retry here: the
    // caller hears silence either way, so fail fast and let them redial.
    let (agent_sender, agent_receiver) =
        match deepgram::connect(&config.agent_url, &config.deepgram_api_key).await {
            Ok(link) => link,
            Err(e) => {
                error!(error = %e, "cannot reach voice agent, refusing call");
                close_unbridged(socket, &session).await;
                return;
            }
        };

    // The settings handshake must complete before any audio flows.
    if let Err(e) = agent_sender.send_settings(&state.agent_settings).await {
        error!(error = %e, "could not deliver agent settings, refusing call");
        agent_sender.close().await;
        close_unbridged(socket, &session).await;
        return;
    }
    session.lock().await.config_sent();
    info!("agent settings delivered");

    let (telephony_sender, telephony_receiver) = twilio::split(socket);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut telephony_pump = tokio::spawn(
        pump_caller_audio(
            telephony_receiver,
            agent_sender.clone(),
            session.clone(),
            shutdown_rx.clone(),
        )
        .instrument(tracing::info_span!("telephony_pump")),
    );
    let mut agent_pump = tokio::spawn(
        pump_agent_frames(
            agent_receiver,
            telephony_sender.clone(),
            agent_sender.clone(),
            session.clone(),
            state.skills.clone(),
            config.early_media_buffer,
            shutdown_rx,
        )
        .instrument(tracing::info_span!("agent_pump")),
    );

    // Whichever pump returns first, tell the other to stop, then join it.
    // Pumps are never aborted: a dispatch in flight runs to completion.
    tokio::select! {
        result = &mut telephony_pump => {
            log_pump_exit("telephony", result);
            let _ = shutdown_tx.send(true);
            log_pump_exit("agent", (&mut agent_pump).await);
        }
        result = &mut agent_pump => {
            log_pump_exit("agent", result);
            let _ = shutdown_tx.send(true);
            log_pump_exit("telephony", (&mut telephony_pump).await);
        }
    }

    agent_sender.close().await;
    telephony_sender.close().await;
    session.lock().await.closed();
    info!("call session ended");
}

/// Setup never completed: close the caller's socket and mark the session.
async fn close_unbridged(mut socket: WebSocket, session: &Arc<Mutex<CallSession>>) {
    let _ = socket.send(Message::Close(None)).await;
    let mut session = session.lock().await;
    session.begin_closing("setup failed");
    session.closed();
}

fn log_pump_exit(side: &str, result: Result<Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => debug!(side, "pump finished"),
        Ok(Err(e)) => error!(side, error = ?e, "pump failed"),
        Err(e) => error!(side, error = ?e, "pump task did not finish cleanly"),
    }
}

/// Telephony to agent: envelopes in, binary audio out.
async fn pump_caller_audio(
    mut receiver: TelephonyReceiver,
    agent: AgentSender,
    session: Arc<Mutex<CallSession>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("shutdown signalled");
                break;
            }
            event = receiver.next_event() => {
                let Some(event) = event else {
                    session.lock().await.begin_closing("caller disconnected");
                    break;
                };
                match event {
                    TelephonyEvent::Connected => debug!("telephony preamble received"),
                    TelephonyEvent::Start { stream_sid } => {
                        info!(stream_sid = %stream_sid, "stream started");
                        session.lock().await.start_stream(stream_sid);
                    }
                    TelephonyEvent::Audio(audio) => {
                        let forward = session.lock().await.may_forward_caller_audio();
                        if !forward {
                            warn!("dropping caller audio outside an active stream");
                            continue;
                        }
                        agent
                            .send_audio(audio)
                            .await
                            .context("forwarding caller audio to agent")?;
                    }
                    TelephonyEvent::Stop => {
                        info!("caller ended the stream");
                        session.lock().await.begin_closing("stop envelope");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Agent to telephony: audio gets wrapped in `media` envelopes, events get
/// handled in place. A function call blocks only this pump; caller audio
/// keeps flowing through the other one meanwhile.
async fn pump_agent_frames(
    mut receiver: AgentReceiver,
    telephony: TelephonySender,
    agent: AgentSender,
    session: Arc<Mutex<CallSession>>,
    skills: Arc<SkillRegistry>,
    early_media_limit: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    // Audio the agent produced before the telephony `start` arrived. Only
    // kept when configured; the default is to drop such frames.
    let mut early_media: VecDeque<Bytes> = VecDeque::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("shutdown signalled");
                break;
            }
            frame = receiver.next_frame() => {
                let Some(frame) = frame else {
                    session.lock().await.begin_closing("agent disconnected");
                    break;
                };
                match frame {
                    AgentFrame::Audio(audio) => {
                        let stream_sid = session.lock().await.stream_sid().map(str::to_string);
                        match stream_sid {
                            Some(sid) => {
                                for held in early_media.drain(..) {
                                    telephony
                                        .send_audio(&sid, &held)
                                        .await
                                        .context("flushing held agent audio")?;
                                }
                                telephony
                                    .send_audio(&sid, &audio)
                                    .await
                                    .context("forwarding agent audio")?;
                            }
                            None if early_media_limit > 0 => {
                                if early_media.len() >= early_media_limit {
                                    warn!("early media buffer full, dropping oldest frame");
                                    early_media.pop_front();
                                }
                                early_media.push_back(audio);
                            }
                            None => warn!("dropping agent audio before stream start"),
                        }
                    }
                    AgentFrame::Event(event) => {
                        handle_agent_event(event, &agent, &session, &skills).await?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Reacts to one agent event. Only `FunctionCallRequest` writes anything
/// back to the agent; everything else is session state or observability.
async fn handle_agent_event(
    event: AgentEvent,
    agent: &AgentSender,
    session: &Arc<Mutex<CallSession>>,
    skills: &Arc<SkillRegistry>,
) -> Result<()> {
    match event {
        AgentEvent::Welcome { request_id } => {
            info!(request_id = ?request_id, "agent session established");
            session.lock().await.activate("agent welcome");
        }
        AgentEvent::ConversationText { role, content } => {
            info!(role = %role, content = %content, "conversation");
        }
        AgentEvent::FunctionCallRequest {
            function_name,
            function_call_id,
            input,
        } => {
            info!(function = %function_name, id = %function_call_id, "function call requested");
            let output = skills.dispatch(&function_name, input);
            agent
                .send_event(&AgentEvent::FunctionCallResponse {
                    function_call_id,
                    output,
                })
                .await
                .context("returning function call result")?;
        }
        AgentEvent::AgentThinking => debug!("agent is thinking"),
        AgentEvent::Error { description, code } => {
            // The agent stays connected after reporting an error, so the
            // session keeps going too.
            error!(code = ?code, description = ?description, "agent reported an error");
        }
        AgentEvent::FunctionCallResponse { .. } => {
            warn!("unexpected function call response from agent");
        }
        AgentEvent::Other => debug!("unhandled agent event"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_connecting() {
        let session = CallSession::new();
        assert_eq!(session.phase(), Phase::Connecting);
        assert_eq!(session.stream_sid(), None);
        assert!(!session.may_forward_caller_audio());
    }

    #[test]
    fn test_config_sent_moves_out_of_connecting() {
        let mut session = CallSession::new();
        session.config_sent();
        assert_eq!(session.phase(), Phase::ConfigSent);
    }

    #[test]
    fn test_start_activates_and_records_stream() {
        let mut session = CallSession::new();
        session.config_sent();
        session.start_stream("MZ42".to_string());

        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.stream_sid(), Some("MZ42"));
        assert!(session.may_forward_caller_audio());
    }

    #[test]
    fn test_welcome_activates_without_stream() {
        let mut session = CallSession::new();
        session.config_sent();
        session.activate("agent welcome");

        assert_eq!(session.phase(), Phase::Active);
        // Active but not started: caller audio still may not flow.
        assert!(!session.may_forward_caller_audio());
    }

    #[test]
    fn test_activate_requires_config_sent() {
        let mut session = CallSession::new();
        session.activate("agent welcome");
        assert_eq!(session.phase(), Phase::Connecting);
    }

    #[test]
    fn test_closing_stops_forwarding() {
        let mut session = CallSession::new();
        session.config_sent();
        session.start_stream("MZ42".to_string());
        session.begin_closing("stop envelope");

        assert_eq!(session.phase(), Phase::Closing);
        assert!(!session.may_forward_caller_audio());
    }

    #[test]
    fn test_begin_closing_is_idempotent() {
        let mut session = CallSession::new();
        session.config_sent();
        session.begin_closing("caller disconnected");
        session.begin_closing("agent disconnected");
        assert_eq!(session.phase(), Phase::Closing);
    }

    #[test]
    fn test_start_ignored_while_closing() {
        let mut session = CallSession::new();
        session.config_sent();
        session.begin_closing("agent disconnected");
        session.start_stream("MZ42".to_string());

        assert_eq!(session.stream_sid(), None);
        assert_eq!(session.phase(), Phase::Closing);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut session = CallSession::new();
        session.config_sent();
        session.start_stream("MZ42".to_string());
        session.begin_closing("stop envelope");
        session.closed();

        assert_eq!(session.phase(), Phase::Closed);
        assert!(!session.may_forward_caller_audio());
    }
}
