//! The interview session orchestrator.
//!
//! One task owns the session: the live client, the capture adapter, the
//! playback sink and every piece of per-session state. The UI talks to it
//! through an [`InterviewHandle`] (commands in, [`OrchestratorEvent`]s and a
//! watched [`SessionState`] out), so no session state is ever shared.

use crate::assembly::{AssemblyOptions, CONCLUDE_TOOL, assemble};
use crate::error::{ConnectionFailure, SessionError};
use crate::frame_queue::FrameQueue;
use crate::plan::InterviewPlan;
use crate::state::SessionState;
use crate::transcript::Transcript;
use clofii_audio::{CaptureStream, MediaCapture, MediaError, MediaFrame, MediaRequest, PlaybackSink};
use config::Settings;
use llm::{LiveError, LiveEvent, LiveMessage, LiveSession, SessionConfig, ToolRegistry};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, error, info, warn};

/// Slack past `disconnect_timeout` so a client's own bounded close always
/// finishes before the orchestrator gives up on it.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Frames held while the transport is saturated
    pub media_queue_capacity: usize,
    pub disconnect_timeout: Duration,
    /// Time the farewell may keep playing after `conclude_interview`
    pub conclude_grace: Duration,
    /// Retry interval for sends refused with backpressure
    pub flush_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            media_queue_capacity: 8,
            disconnect_timeout: Duration::from_secs(3),
            conclude_grace: Duration::from_millis(2_500),
            flush_interval: Duration::from_millis(20),
        }
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            media_queue_capacity: settings.media_queue_capacity,
            disconnect_timeout: settings.disconnect_timeout(),
            conclude_grace: settings.conclude_grace(),
            ..Self::default()
        }
    }
}

/// What the UI hears from the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    ConnectionStateChanged(SessionState),
    /// The agent called a declared tool
    ToolCalled { name: String },
    /// A tool call was answered with a failure; the session continues.
    /// Always carries `SessionError::ToolDispatch`.
    ToolDispatchFailed(SessionError),
    /// Agent text as it streams in
    Transcript { text: String },
    /// The agent finished a turn; `text` is the turn's full text, if any
    TurnComplete { text: Option<String> },
    /// The candidate interrupted the agent
    Interrupted,
    /// A non-fatal error reported by the agent
    AgentError { message: String },
    /// The session moved to `Error`
    Failed(SessionError),
}

/// Counters for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    /// Evicted from the media queue while the transport was saturated
    pub frames_dropped: u64,
    /// Video frames not forwarded because video input is off
    pub frames_skipped: u64,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Start {
        plan: InterviewPlan,
        reply: Reply<()>,
    },
    Connect {
        reply: Reply<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Reconfigure {
        config: SessionConfig,
        reply: Reply<()>,
    },
    SendText {
        text: String,
        reply: Reply<()>,
    },
}

/// How a connection attempt ended.
enum Attempt {
    Finished(Result<(), SessionError>),
    Restart(SessionConfig),
    Cancelled(Option<oneshot::Sender<()>>),
}

/// UI-side handle to a running orchestrator.
///
/// Dropping the handle tears the session down and ends the task.
pub struct InterviewHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_rx: mpsc::UnboundedReceiver<OrchestratorEvent>,
    state_rx: watch::Receiver<SessionState>,
    stats_rx: watch::Receiver<SessionStats>,
    #[allow(dead_code)]
    processor_handle: JoinHandle<()>,
}

impl InterviewHandle {
    /// Start the orchestrator task.
    ///
    /// Tools in `tools` are declared to the agent after `conclude_interview`
    /// and answered with their handler's result.
    pub fn spawn(
        mut session: Box<dyn LiveSession>,
        capture: Box<dyn MediaCapture>,
        playback: Box<dyn PlaybackSink>,
        tools: ToolRegistry,
        mut assembly: AssemblyOptions,
        options: OrchestratorOptions,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (stats_tx, stats_rx) = watch::channel(SessionStats::default());

        for declaration in tools.declarations() {
            if declaration.name == CONCLUDE_TOOL {
                warn!("Ignoring registered tool that shadows {}", CONCLUDE_TOOL);
                continue;
            }
            if !assembly.extra_tools.iter().any(|t| t.name == declaration.name) {
                assembly.extra_tools.push(declaration);
            }
        }

        let live_events = session.subscribe();
        let orchestrator = Orchestrator {
            queue: FrameQueue::new(options.media_queue_capacity),
            session,
            capture,
            playback,
            tools,
            assembly,
            options,
            live_events,
            frames: None,
            control: VecDeque::new(),
            prepared: None,
            video_input: false,
            transcript: Transcript::new(),
            conclude_deadline: None,
            stats: SessionStats::default(),
            state: SessionState::Idle,
            state_tx,
            stats_tx,
            event_tx,
        };

        let processor_handle = tokio::spawn(orchestrator.run(cmd_rx));

        Self {
            cmd_tx,
            event_rx,
            state_rx,
            stats_rx,
            processor_handle,
        }
    }

    async fn request(&self, make: impl FnOnce(Reply<()>) -> Command) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply))
            .map_err(|_| SessionError::NotConnected)?;
        rx.await.map_err(|_| SessionError::NotConnected)?
    }

    /// Build the session configuration from `plan` and connect.
    ///
    /// Returns once the session is `Connecting`; the outcome arrives as
    /// state changes and events.
    pub async fn start_interview(&self, plan: InterviewPlan) -> Result<(), SessionError> {
        self.request(|reply| Command::Start { plan, reply }).await
    }

    /// Connect with the configuration set by [`reconfigure`](Self::reconfigure).
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Connect { reply }).await
    }

    /// Hard abort: release everything and return to `Idle`. Safe to call in
    /// any state, any number of times.
    pub async fn stop_interview(&self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stop { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Replace the prepared configuration. Legal while `Idle` or
    /// `Connecting`; a pending handshake restarts with the new configuration.
    pub async fn reconfigure(&self, config: SessionConfig) -> Result<(), SessionError> {
        self.request(|reply| Command::Reconfigure { config, reply })
            .await
    }

    /// Send a complete user turn as text.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::SendText { text, reply }).await
    }

    pub fn try_recv(&mut self) -> Option<OrchestratorEvent> {
        self.event_rx.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<OrchestratorEvent> {
        self.event_rx.recv().await
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats_rx.borrow()
    }

    pub fn watch_stats(&self) -> watch::Receiver<SessionStats> {
        self.stats_rx.clone()
    }
}

struct Orchestrator {
    session: Box<dyn LiveSession>,
    capture: Box<dyn MediaCapture>,
    playback: Box<dyn PlaybackSink>,
    tools: ToolRegistry,
    assembly: AssemblyOptions,
    options: OrchestratorOptions,
    live_events: mpsc::UnboundedReceiver<LiveEvent>,
    frames: Option<CaptureStream>,
    queue: FrameQueue<LiveMessage>,
    /// Tool responses and text turns waiting on backpressure; sent before media
    control: VecDeque<LiveMessage>,
    prepared: Option<SessionConfig>,
    video_input: bool,
    transcript: Transcript,
    conclude_deadline: Option<Instant>,
    stats: SessionStats,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    stats_tx: watch::Sender<SessionStats>,
    event_tx: mpsc::UnboundedSender<OrchestratorEvent>,
}

async fn next_frame(frames: &mut Option<CaptureStream>) -> Option<Result<MediaFrame, MediaError>> {
    match frames {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Ask for devices, then open the connection. Devices are only started by
/// the caller once this succeeds.
async fn establish(
    capture: &mut dyn MediaCapture,
    session: &mut dyn LiveSession,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    capture
        .request_access(MediaRequest::with_video(config.video_input()))
        .await
        .map_err(SessionError::MediaAcquisition)?;
    session
        .connect(config)
        .await
        .map_err(|e| SessionError::Connection(ConnectionFailure::from(e)))
}

fn invalid(operation: &'static str, state: SessionState) -> SessionError {
    SessionError::InvalidState { operation, state }
}

fn tool_result(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => json!({ "result": other }),
    }
}

impl Orchestrator {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let flush_due = !self.control.is_empty() || !self.queue.is_empty();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut commands).await,
                    None => break,
                },
                Some(event) = self.live_events.recv() => self.handle_live_event(event).await,
                frame = next_frame(&mut self.frames) => self.handle_frame(frame).await,
                _ = sleep(self.options.flush_interval), if flush_due => self.flush_outbound(),
                _ = deadline(self.conclude_deadline) => {
                    info!("Farewell grace elapsed");
                    self.finish_conclusion().await;
                }
            }
        }

        if self.state.is_live() {
            self.release().await;
            self.set_state(SessionState::Idle);
        }
        debug!("Orchestrator stopped");
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        info!("Session {} -> {}", self.state, state);
        self.state = state;
        // Event first, so a watcher that sees the new state finds it queued
        self.emit(OrchestratorEvent::ConnectionStateChanged(state));
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    fn publish_stats(&mut self) {
        self.stats.frames_dropped = self.queue.dropped();
        self.stats_tx.send_replace(self.stats);
    }

    async fn handle_command(
        &mut self,
        command: Command,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) {
        match command {
            Command::Start { plan, reply } => {
                if !self.state.can_start() {
                    let _ = reply.send(Err(invalid("start an interview", self.state)));
                    return;
                }
                info!(
                    "Starting interview with {} question(s)",
                    plan.questions.len()
                );
                let config = assemble(&plan, None, &self.assembly);
                self.prepared = Some(config.clone());
                self.clear_failure();
                self.set_state(SessionState::Connecting);
                let _ = reply.send(Ok(()));
                self.connect_phase(config, commands).await;
            }
            Command::Connect { reply } => {
                if !self.state.can_start() {
                    let _ = reply.send(Err(invalid("connect", self.state)));
                    return;
                }
                let Some(config) = self.prepared.clone() else {
                    let _ = reply.send(Err(invalid("connect without a configuration", self.state)));
                    return;
                };
                self.clear_failure();
                self.set_state(SessionState::Connecting);
                let _ = reply.send(Ok(()));
                self.connect_phase(config, commands).await;
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::Reconfigure { config, reply } => {
                // Connecting is handled inside connect_phase
                let result = match self.state {
                    SessionState::Idle => {
                        debug!("Prepared configuration replaced");
                        self.prepared = Some(config);
                        Ok(())
                    }
                    state => Err(invalid("reconfigure", state)),
                };
                let _ = reply.send(result);
            }
            Command::SendText { text, reply } => {
                if self.state != SessionState::Active {
                    let _ = reply.send(Err(SessionError::NotConnected));
                    return;
                }
                self.send_control(LiveMessage::ClientContent {
                    text,
                    turn_complete: true,
                });
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Drive one connection attempt while still answering commands.
    ///
    /// A stop drops the attempt future, which abandons the handshake.
    async fn connect_phase(
        &mut self,
        mut config: SessionConfig,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) {
        loop {
            // Nothing from a previous connection belongs to this one
            while self.live_events.try_recv().is_ok() {}

            let outcome = {
                let attempt = establish(&mut *self.capture, &mut *self.session, &config);
                tokio::pin!(attempt);
                loop {
                    tokio::select! {
                        result = &mut attempt => break Attempt::Finished(result),
                        command = commands.recv() => match command {
                            None => break Attempt::Cancelled(None),
                            Some(Command::Stop { reply }) => break Attempt::Cancelled(Some(reply)),
                            Some(Command::Reconfigure { config, reply }) => {
                                let _ = reply.send(Ok(()));
                                break Attempt::Restart(config);
                            }
                            Some(Command::SendText { reply, .. }) => {
                                let _ = reply.send(Err(SessionError::NotConnected));
                            }
                            Some(Command::Start { reply, .. }) => {
                                let _ = reply.send(Err(invalid("start an interview", SessionState::Connecting)));
                            }
                            Some(Command::Connect { reply }) => {
                                let _ = reply.send(Err(invalid("connect", SessionState::Connecting)));
                            }
                        },
                    }
                }
            };

            match outcome {
                Attempt::Finished(Ok(())) => {
                    self.activate(config).await;
                    return;
                }
                Attempt::Finished(Err(err)) => {
                    self.fail(err).await;
                    return;
                }
                Attempt::Restart(next) => {
                    info!("Configuration changed while connecting; restarting handshake");
                    self.session.disconnect().await;
                    self.prepared = Some(next.clone());
                    config = next;
                }
                Attempt::Cancelled(reply) => {
                    info!("Connection attempt cancelled");
                    self.release().await;
                    self.set_state(SessionState::Idle);
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    return;
                }
            }
        }
    }

    async fn activate(&mut self, config: SessionConfig) {
        match self.capture.start().await {
            Ok(stream) => {
                self.frames = Some(stream);
                self.video_input = config.video_input();
                self.queue = FrameQueue::new(self.options.media_queue_capacity);
                self.stats = SessionStats::default();
                self.transcript.clear();
                self.publish_stats();
                info!(
                    "Connected to {} with {} tool(s)",
                    config.model(),
                    config.tools().len()
                );
                self.set_state(SessionState::Active);
            }
            Err(e) => self.fail(SessionError::MediaAcquisition(e)).await,
        }
    }

    /// Stop media, then close the connection. Each is released at most once
    /// per session since both calls are no-ops when already released.
    async fn release(&mut self) {
        self.frames = None;
        self.capture.stop().await;
        self.queue.clear();
        self.control.clear();
        self.conclude_deadline = None;
        let limit = self.options.disconnect_timeout + DISCONNECT_GRACE;
        if timeout(limit, self.session.disconnect()).await.is_err() {
            warn!("Disconnect did not finish within {:?}", limit);
        }
    }

    async fn fail(&mut self, err: SessionError) {
        error!("Interview failed: {}", err);
        let kind = err.kind();
        self.release().await;
        self.playback.flush();
        self.emit(OrchestratorEvent::Failed(err));
        self.set_state(SessionState::Error(kind));
    }

    async fn stop(&mut self) {
        match self.state {
            SessionState::Idle => debug!("Stop requested while idle"),
            SessionState::Concluding => self.finish_conclusion().await,
            SessionState::Active => {
                info!("Interview stopped");
                self.release().await;
                self.playback.flush();
                self.transcript.clear();
                self.set_state(SessionState::Idle);
            }
            SessionState::Error(_) => self.clear_failure(),
            // Stops while connecting are taken by connect_phase
            SessionState::Connecting => {}
        }
    }

    /// Leave `Error` for `Idle` with the failed session's leftovers cleared.
    /// Everything else was already released when the session failed.
    fn clear_failure(&mut self) {
        if let SessionState::Error(_) = self.state {
            self.transcript.clear();
            self.set_state(SessionState::Idle);
        }
    }

    async fn finish_conclusion(&mut self) {
        info!("Interview concluded");
        self.release().await;
        self.transcript.clear();
        self.set_state(SessionState::Idle);
    }

    async fn handle_live_event(&mut self, event: LiveEvent) {
        if !matches!(self.state, SessionState::Active | SessionState::Concluding) {
            debug!("Dropping {:?} received while {}", event, self.state);
            return;
        }

        match event {
            LiveEvent::AudioChunk { data, sample_rate } => {
                if let Err(e) = self.playback.enqueue(&data, sample_rate) {
                    warn!("Playback rejected audio: {}", e);
                }
            }
            LiveEvent::TextDelta { text } => {
                self.transcript.push_delta(&text);
                self.emit(OrchestratorEvent::Transcript { text });
            }
            LiveEvent::TurnComplete => {
                let text = self.transcript.complete_turn();
                self.emit(OrchestratorEvent::TurnComplete { text });
            }
            LiveEvent::Interrupted => {
                self.playback.flush();
                self.emit(OrchestratorEvent::Interrupted);
            }
            LiveEvent::Error { kind, message } => {
                warn!("Agent reported {:?}: {}", kind, message);
                self.emit(OrchestratorEvent::AgentError { message });
            }
            LiveEvent::ToolCall {
                name,
                args,
                call_id,
            } => self.dispatch_tool(name, args, call_id).await,
            LiveEvent::Closed { code } => {
                if self.state == SessionState::Concluding {
                    info!("Agent closed the session after concluding");
                    self.finish_conclusion().await;
                } else {
                    self.fail(SessionError::UnexpectedClose { code }).await;
                }
            }
        }
    }

    async fn dispatch_tool(&mut self, name: String, args: Value, call_id: String) {
        if self.state != SessionState::Active {
            debug!("Ignoring tool call '{}' ({}) while {}", name, call_id, self.state);
            return;
        }

        if name == CONCLUDE_TOOL {
            info!("Agent concluded the interview ({})", call_id);
            // No more candidate media once the agent has wrapped up
            self.queue.clear();
            self.send_control(LiveMessage::ToolResponse {
                call_id,
                name: name.clone(),
                result: json!({ "success": true }),
            });
            self.emit(OrchestratorEvent::ToolCalled { name });
            self.set_state(SessionState::Concluding);
            self.conclude_deadline = Some(Instant::now() + self.options.conclude_grace);
            return;
        }

        if !self.tools.has_tool(&name) {
            warn!("Agent called unknown tool '{}'", name);
            self.reject_tool(call_id, name, "unknown tool".to_string());
            return;
        }

        debug!("Calling tool '{}' with {}", name, args);
        match self.tools.call(&name, args).await {
            Ok(value) => {
                self.send_control(LiveMessage::ToolResponse {
                    call_id,
                    name: name.clone(),
                    result: tool_result(value),
                });
                self.emit(OrchestratorEvent::ToolCalled { name });
            }
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                self.reject_tool(call_id, name, e.to_string());
            }
        }
    }

    fn reject_tool(&mut self, call_id: String, name: String, reason: String) {
        self.send_control(LiveMessage::ToolResponse {
            call_id,
            name: name.clone(),
            result: json!({ "error": reason }),
        });
        self.emit(OrchestratorEvent::ToolDispatchFailed(
            SessionError::ToolDispatch { name, reason },
        ));
    }

    async fn handle_frame(&mut self, frame: Option<Result<MediaFrame, MediaError>>) {
        match frame {
            Some(Ok(frame)) => {
                if self.state != SessionState::Active {
                    return;
                }
                if frame.is_video() && !self.video_input {
                    self.stats.frames_skipped += 1;
                    self.publish_stats();
                    return;
                }
                let (mime_type, data) = frame.into_parts();
                if self
                    .queue
                    .push(LiveMessage::MediaChunk { mime_type, data })
                    .is_some()
                {
                    debug!(
                        "Transport saturated; {} frame(s) dropped so far",
                        self.queue.dropped()
                    );
                }
                self.flush_outbound();
            }
            Some(Err(e)) => {
                self.frames = None;
                if self.state == SessionState::Active {
                    self.fail(SessionError::MediaAcquisition(e)).await;
                } else {
                    debug!("Capture error after conclusion: {}", e);
                }
            }
            None => {
                warn!("Capture stream ended");
                self.frames = None;
            }
        }
    }

    fn send_control(&mut self, message: LiveMessage) {
        self.control.push_back(message);
        self.flush_outbound();
    }

    /// Send queued control messages, then queued media, stopping at the first
    /// backpressure refusal. Refused messages keep their place.
    fn flush_outbound(&mut self) {
        while let Some(message) = self.control.pop_front() {
            match self.session.send(message.clone()) {
                Ok(()) => {}
                Err(LiveError::Backpressure) => {
                    self.control.push_front(message);
                    return;
                }
                Err(e) => warn!("Could not send control message: {}", e),
            }
        }

        let mut sent = 0;
        while let Some(message) = self.queue.pop_front() {
            match self.session.send(message.clone()) {
                Ok(()) => sent += 1,
                Err(LiveError::Backpressure) => {
                    self.queue.restore_front(message);
                    break;
                }
                Err(e) => {
                    debug!("Dropping queued media: {}", e);
                    self.queue.clear();
                    break;
                }
            }
        }
        self.stats.frames_sent += sent;
        self.publish_stats();
    }
}
