use super::live_api::{ClientFrame, ServerFrame};
use crate::live::{EventFanout, LiveError, LiveEvent, LiveEventKind, LiveMessage, LiveSession, SessionConfig};
use crate::traffic_log;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

const LIVE_PATH: &str =
    "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Close code servers use to reject credentials during setup.
const POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Clone)]
pub struct LiveClientOptions {
    pub base_url: String,
    pub api_key: String,
    /// Capacity of the outbound frame queue; a full queue is backpressure.
    pub outbound_buffer: usize,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
}

impl LiveClientOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "wss://generativelanguage.googleapis.com".to_string(),
            api_key: api_key.into(),
            outbound_buffer: 32,
            connect_timeout: Duration::from_secs(15),
            disconnect_timeout: Duration::from_secs(3),
        }
    }

    pub fn from_settings(settings: &config::Settings, api_key: impl Into<String>) -> Self {
        Self {
            base_url: settings.live_base_url.clone(),
            api_key: api_key.into(),
            outbound_buffer: settings.outbound_buffer.max(1),
            connect_timeout: settings.connect_timeout(),
            disconnect_timeout: settings.disconnect_timeout(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}{}?key={}",
            self.base_url.trim_end_matches('/'),
            LIVE_PATH,
            self.api_key
        )
    }
}

/// A live connection's tasks and the flags they share.
struct Connection {
    model: String,
    outbound: mpsc::Sender<Message>,
    connected: Arc<AtomicBool>,
    /// Set before a local close so the reader does not report `Closed`.
    closing: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Aborts a closing connection's tasks when dropped, so cancelling `close`
/// never leaves them running. Aborting a finished task does nothing.
struct AbortOnDrop([AbortHandle; 2]);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Gemini Live over WebSocket.
pub struct GeminiLiveClient {
    options: LiveClientOptions,
    fanout: EventFanout,
    connection: Option<Connection>,
}

impl GeminiLiveClient {
    pub fn new(options: LiveClientOptions) -> Self {
        Self {
            options,
            fanout: EventFanout::new(),
            connection: None,
        }
    }

    async fn open(&self, config: &SessionConfig) -> Result<Connection, LiveError> {
        let (mut ws, _response) = tokio_tungstenite::connect_async(self.options.url())
            .await
            .map_err(map_connect_error)?;

        let setup = ClientFrame::from(config);
        traffic_log::log_live_outbound(config.model(), &setup);
        let setup_json =
            serde_json::to_string(&setup).map_err(|e| LiveError::Protocol(e.to_string()))?;
        ws.send(Message::Text(setup_json))
            .await
            .map_err(|e| LiveError::Network(e.to_string()))?;

        loop {
            let raw = match ws.next().await {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(frame))) => return Err(map_handshake_close(frame)),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(LiveError::Network(e.to_string())),
                None => {
                    return Err(LiveError::Handshake(
                        "connection ended before setup completed".to_string(),
                    ));
                }
            };
            match ServerFrame::parse(&raw) {
                Ok(frame) if frame.is_setup_complete() => break,
                Ok(_) => debug!("Ignoring frame received before setupComplete"),
                Err(e) => return Err(LiveError::Handshake(format!("bad setup reply: {}", e))),
            }
        }

        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::channel(self.options.outbound_buffer);
        let connected = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let writer = tokio::spawn(write_loop(sink, outbound_rx, shutdown.clone()));
        let reader = tokio::spawn(read_loop(
            stream,
            self.fanout.clone(),
            config.model().to_string(),
            connected.clone(),
            closing.clone(),
            shutdown.clone(),
        ));

        Ok(Connection {
            model: config.model().to_string(),
            outbound,
            connected,
            closing,
            shutdown,
            reader,
            writer,
        })
    }

    async fn close(&self, connection: Connection) {
        connection.closing.store(true, Ordering::SeqCst);
        connection.connected.store(false, Ordering::SeqCst);
        connection.shutdown.notify_one();

        let _abort = AbortOnDrop([
            connection.reader.abort_handle(),
            connection.writer.abort_handle(),
        ]);
        let reader = connection.reader;
        let writer = connection.writer;
        let joined = tokio::time::timeout(self.options.disconnect_timeout, async move {
            let _ = writer.await;
            let _ = reader.await;
        })
        .await;

        if joined.is_err() {
            warn!(
                "Live connection did not close within {:?}; aborting",
                self.options.disconnect_timeout
            );
        }
    }
}

#[async_trait]
impl LiveSession for GeminiLiveClient {
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<LiveEvent> {
        self.fanout.subscribe()
    }

    async fn connect(&mut self, config: &SessionConfig) -> Result<(), LiveError> {
        if self.is_connected() {
            return Err(LiveError::AlreadyConnected);
        }
        // A remote close leaves finished tasks behind.
        if let Some(stale) = self.connection.take() {
            stale.reader.abort();
            stale.writer.abort();
        }

        info!("Opening live session with {}", config.model());
        let timeout = self.options.connect_timeout;
        let connection = tokio::time::timeout(timeout, self.open(config))
            .await
            .map_err(|_| LiveError::Timeout(timeout))??;
        info!("Live session ready");

        self.connection = Some(connection);
        Ok(())
    }

    fn send(&self, message: LiveMessage) -> Result<(), LiveError> {
        let connection = match &self.connection {
            Some(c) if c.connected.load(Ordering::SeqCst) => c,
            _ => return Err(LiveError::NotConnected),
        };

        let frame = ClientFrame::from(&message);
        if !message.is_media() {
            traffic_log::log_live_outbound(&connection.model, &frame);
        }
        let json = serde_json::to_string(&frame).map_err(|e| LiveError::Protocol(e.to_string()))?;

        connection
            .outbound
            .try_send(Message::Text(json))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => LiveError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => LiveError::NotConnected,
            })
    }

    async fn disconnect(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        info!("Closing live session");
        self.close(connection).await;
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.connected.load(Ordering::SeqCst))
    }
}

impl Drop for GeminiLiveClient {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.closing.store(true, Ordering::SeqCst);
            connection.reader.abort();
            connection.writer.abort();
        }
    }
}

fn map_connect_error(error: tungstenite::Error) -> LiveError {
    match error {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                LiveError::AuthRejected(format!("HTTP {}", status))
            } else {
                LiveError::Handshake(format!("HTTP {}", status))
            }
        }
        other => LiveError::Network(other.to_string()),
    }
}

fn map_handshake_close(frame: Option<CloseFrame<'_>>) -> LiveError {
    match frame {
        Some(frame) if u16::from(frame.code) == POLICY_VIOLATION => {
            LiveError::AuthRejected(frame.reason.to_string())
        }
        Some(frame) => LiveError::Handshake(format!(
            "closed during setup ({}): {}",
            u16::from(frame.code),
            frame.reason
        )),
        None => LiveError::Handshake("closed during setup".to_string()),
    }
}

async fn write_loop<S>(mut sink: S, mut outbound: mpsc::Receiver<Message>, shutdown: Arc<Notify>)
where
    S: futures::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(frame).await {
                    warn!("Live send failed: {}", e);
                    break;
                }
            }
            _ = shutdown.notified() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })))
                    .await;
                break;
            }
        }
    }
    debug!("Live writer stopped");
}

async fn read_loop<S>(
    mut stream: S,
    fanout: EventFanout,
    model: String,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) where
    S: futures::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut close_code = None;

    while let Some(message) = stream.next().await {
        let raw = match message {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(frame)) => {
                close_code = frame.map(|f| u16::from(f.code));
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                if !closing.load(Ordering::SeqCst) {
                    warn!("Live connection error: {}", e);
                }
                break;
            }
        };

        match ServerFrame::parse(&raw) {
            Ok(frame) => {
                if frame.is_loggable() {
                    traffic_log::log_live_inbound(&model, &frame);
                }
                for event in frame.into_events() {
                    fanout.emit(event);
                }
            }
            Err(e) => {
                warn!("Unparsable live frame: {}", e);
                fanout.emit(LiveEvent::Error {
                    kind: LiveEventKind::Protocol,
                    message: e,
                });
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    shutdown.notify_one();
    if !closing.load(Ordering::SeqCst) {
        info!("Live connection closed by remote (code {:?})", close_code);
        fanout.emit(LiveEvent::Closed { code: close_code });
    }
}
