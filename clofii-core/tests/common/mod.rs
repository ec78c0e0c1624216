//! In-memory stand-ins for the live agent, shared by the orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use clofii_audio::{
    CAPTURE_SAMPLE_RATE, ChannelMediaController, ChannelPlayback, PlaybackProbe,
    create_channel_backend,
};
use clofii_core::{
    AssemblyOptions, InterviewHandle, OrchestratorEvent, OrchestratorOptions, SessionState,
};
use llm::{EventFanout, LiveError, LiveEvent, LiveMessage, LiveSession, SessionConfig, ToolRegistry};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct AgentState {
    connected: bool,
    hang_connect: bool,
    fail_next: Option<LiveError>,
    saturated: bool,
    disconnect_delay: Option<Duration>,
    connects: usize,
    disconnects: usize,
    configs: Vec<SessionConfig>,
    sent: Vec<LiveMessage>,
}

/// Test-side controls for a [`FakeSession`].
#[derive(Clone, Default)]
pub struct FakeAgent {
    state: Arc<Mutex<AgentState>>,
    fanout: EventFanout,
}

impl FakeAgent {
    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap()
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            agent: self.clone(),
        }
    }

    pub fn emit(&self, event: LiveEvent) {
        self.fanout.emit(event);
    }

    /// The agent drops the connection.
    pub fn close(&self, code: Option<u16>) {
        self.lock().connected = false;
        self.fanout.emit(LiveEvent::Closed { code });
    }

    pub fn call_tool(&self, name: &str, call_id: &str) {
        self.emit(LiveEvent::ToolCall {
            name: name.to_string(),
            args: serde_json::json!({}),
            call_id: call_id.to_string(),
        });
    }

    pub fn fail_next_connect(&self, error: LiveError) {
        self.lock().fail_next = Some(error);
    }

    /// Make `connect` wait forever until the future is dropped.
    pub fn hang_connect(&self, hang: bool) {
        self.lock().hang_connect = hang;
    }

    /// Make `disconnect` take `delay` before it lets go of the connection.
    pub fn slow_disconnect(&self, delay: Duration) {
        self.lock().disconnect_delay = Some(delay);
    }

    pub fn set_saturated(&self, saturated: bool) {
        self.lock().saturated = saturated;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub fn configs(&self) -> Vec<SessionConfig> {
        self.lock().configs.clone()
    }

    pub fn sent(&self) -> Vec<LiveMessage> {
        self.lock().sent.clone()
    }

    pub fn media_sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                LiveMessage::MediaChunk { mime_type, data } => Some((mime_type, data)),
                _ => None,
            })
            .collect()
    }

    pub fn tool_responses(&self) -> Vec<(String, String, serde_json::Value)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                LiveMessage::ToolResponse {
                    call_id,
                    name,
                    result,
                } => Some((call_id, name, result)),
                _ => None,
            })
            .collect()
    }
}

/// `LiveSession` whose remote end is a [`FakeAgent`].
pub struct FakeSession {
    agent: FakeAgent,
}

#[async_trait]
impl LiveSession for FakeSession {
    fn subscribe(&mut self) -> tokio::sync::mpsc::UnboundedReceiver<LiveEvent> {
        self.agent.fanout.subscribe()
    }

    async fn connect(&mut self, config: &SessionConfig) -> Result<(), LiveError> {
        let hang = {
            let mut state = self.agent.lock();
            state.connects += 1;
            state.configs.push(config.clone());
            if state.connected {
                return Err(LiveError::AlreadyConnected);
            }
            state.hang_connect
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.agent.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state.connected = true;
        Ok(())
    }

    fn send(&self, message: LiveMessage) -> Result<(), LiveError> {
        let mut state = self.agent.lock();
        if !state.connected {
            return Err(LiveError::NotConnected);
        }
        if state.saturated {
            return Err(LiveError::Backpressure);
        }
        state.sent.push(message);
        Ok(())
    }

    async fn disconnect(&mut self) {
        let delay = self.agent.lock().disconnect_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        let mut state = self.agent.lock();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
        }
    }

    fn is_connected(&self) -> bool {
        self.agent.lock().connected
    }
}

pub struct Harness {
    pub handle: InterviewHandle,
    pub agent: FakeAgent,
    pub media: ChannelMediaController,
    pub playback: PlaybackProbe,
}

pub fn test_options() -> OrchestratorOptions {
    OrchestratorOptions {
        media_queue_capacity: 8,
        disconnect_timeout: Duration::from_millis(200),
        conclude_grace: Duration::from_secs(30),
        flush_interval: Duration::from_millis(5),
    }
}

pub fn harness() -> Harness {
    harness_with(
        AssemblyOptions::new("models/test-live"),
        ToolRegistry::new(),
        test_options(),
    )
}

pub fn harness_with(
    assembly: AssemblyOptions,
    tools: ToolRegistry,
    options: OrchestratorOptions,
) -> Harness {
    let agent = FakeAgent::default();
    let (media, capture) = create_channel_backend(CAPTURE_SAMPLE_RATE, 16);
    let (sink, playback) = ChannelPlayback::new();
    let handle = InterviewHandle::spawn(
        Box::new(agent.session()),
        Box::new(capture),
        Box::new(sink),
        tools,
        assembly,
        options,
    );
    Harness {
        handle,
        agent,
        media,
        playback,
    }
}

pub async fn wait_for_state(handle: &InterviewHandle, want: SessionState) {
    let mut states = handle.watch_state();
    let reached = timeout(WAIT, states.wait_for(|state| *state == want)).await;
    assert!(
        matches!(reached, Ok(Ok(_))),
        "never reached {:?}, stuck in {:?}",
        want,
        handle.state()
    );
}

/// Poll `check` until it holds or the wait expires.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let polled = timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {}", what);
}

/// Read events until one satisfies `pred`. False if the wait expires first.
pub async fn next_matching(
    handle: &mut InterviewHandle,
    pred: impl Fn(&OrchestratorEvent) -> bool,
) -> bool {
    timeout(WAIT, async {
        while let Some(event) = handle.next_event().await {
            if pred(&event) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false)
}

pub fn drain(handle: &mut InterviewHandle) -> Vec<OrchestratorEvent> {
    std::iter::from_fn(|| handle.try_recv()).collect()
}

pub fn states(events: &[OrchestratorEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::ConnectionStateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}
