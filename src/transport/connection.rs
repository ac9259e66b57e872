//! WebSocket connection and event loop.
//!
//! This module handles the WebSocket connection to a page's DevTools
//! endpoint, including command/response correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the browser (responses, events)
//! - Outgoing commands from Rust API
//! - Command/response correlation by numeric id
//! - Event handler callbacks, strictly in arrival order

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Command, Event, Response};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending commands before rejecting new ones.
const MAX_PENDING_COMMANDS: usize = 1000;

/// Timeout for the WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of command IDs to response channels.
type CorrelationMap = FxHashMap<CommandId, oneshot::Sender<Result<Response>>>;

/// Event handler callback type.
///
/// Called on the event loop task for each event, in arrival order.
pub type EventHandler = Box<dyn Fn(Event) + Send + Sync>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a command and wait for response.
    Send {
        command: Command,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(CommandId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to a DevTools endpoint.
///
/// Handles command/response correlation and event routing.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// All operations are non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event handler (shared with event loop).
    event_handler: Arc<Mutex<Option<EventHandler>>>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            event_handler: Arc::clone(&self.event_handler),
        }
    }
}

impl Connection {
    /// Opens a WebSocket connection to `ws_url`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake does not finish within 30s
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(ws_url: &str) -> Result<Self> {
        debug!(url = ws_url, "Connecting to DevTools endpoint");

        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(ws_url))
            .await
            .map_err(|_| Error::connection_timeout(duration_millis(CONNECT_TIMEOUT)))??;

        debug!(url = ws_url, "DevTools connection established");

        Ok(Self::new(ws_stream))
    }

    /// Creates a new connection from a WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new(ws_stream: WsStream) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let event_handler: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(None));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&event_handler),
        ));

        Self {
            command_tx,
            correlation,
            event_handler,
        }
    }

    /// Sets the event handler callback.
    pub fn set_event_handler(&self, handler: EventHandler) {
        let mut guard = self.event_handler.lock();
        *guard = Some(handler);
    }

    /// Clears the event handler.
    pub fn clear_event_handler(&self) {
        let mut guard = self.event_handler.lock();
        *guard = None;
    }

    /// Sends a command and waits for response with default timeout (30s).
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connection is closed
    /// - [`Error::CommandTimeout`] if response not received within timeout
    /// - [`Error::Protocol`] if too many pending commands
    pub async fn send(&self, command: Command) -> Result<Response> {
        self.send_with_timeout(command, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and waits for response with custom timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connection is closed
    /// - [`Error::CommandTimeout`] if response not received within timeout
    /// - [`Error::Protocol`] if too many pending commands
    pub async fn send_with_timeout(
        &self,
        command: Command,
        command_timeout: Duration,
    ) -> Result<Response> {
        let command_id = command.id;
        let method = command.method.clone();

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_COMMANDS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_COMMANDS,
                    "Too many pending commands"
                );
                return Err(Error::protocol(format!(
                    "Too many pending commands: {}/{}",
                    correlation.len(),
                    MAX_PENDING_COMMANDS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                command,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(command_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(command_id));

                Err(Error::command_timeout(
                    command_id,
                    method,
                    duration_millis(command_timeout),
                ))
            }
        }
    }

    /// Returns the number of pending commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Returns `true` while the event loop is running.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Shuts down the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop already ended.
    pub fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Shutdown)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        event_handler: Arc<Mutex<Option<EventHandler>>>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &event_handler);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { command, response_tx }) => {
                            Self::handle_send_command(
                                command,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(command_id)) => {
                            correlation.lock().remove(&command_id);
                            debug!(%command_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Stops further sends from queueing behind a dead loop.
        command_rx.close();
        Self::fail_pending_commands(&correlation);

        debug!("Event loop terminated");
    }

    /// Handles an incoming text message from the browser.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        event_handler: &Arc<Mutex<Option<EventHandler>>>,
    ) {
        if let Ok(response) = from_str::<Response>(text) {
            let tx = correlation.lock().remove(&response.id);

            if let Some(tx) = tx {
                let _ = tx.send(Ok(response));
            } else {
                warn!(id = %response.id, "Response for unknown command");
            }

            return;
        }

        if let Ok(event) = from_str::<Event>(text) {
            trace!(method = %event.method, "Event received");
            let handler = event_handler.lock();
            if let Some(ref handler) = *handler {
                handler(event);
            }
            return;
        }

        warn!(text = %text, "Failed to parse incoming message");
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command(
        command: Command,
        response_tx: oneshot::Sender<Result<Response>>,
        ws_write: &mut SplitSink<WsStream, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let command_id = command.id;

        let json = match to_string(&command) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(command_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            if let Some(tx) = correlation.lock().remove(&command_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
            return;
        }

        trace!(%command_id, method = %command.method, "Command sent");
    }

    /// Fails all pending commands with ConnectionClosed error.
    fn fail_pending_commands(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on shutdown");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Milliseconds in `duration`, saturating at `u64::MAX`.
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Accepts one client, answers every command with `{"echo": method}`
    /// and follows each reply with a `Page.loadEventFired` event.
    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");

            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let command: Value = serde_json::from_str(&text).expect("command json");
                let reply = json!({
                    "id": command["id"],
                    "result": { "echo": command["method"] }
                });
                let event = json!({"method": "Page.loadEventFired", "params": {"timestamp": 1.0}});

                if ws.send(Message::Text(reply.to_string().into())).await.is_err()
                    || ws.send(Message::Text(event.to_string().into())).await.is_err()
                {
                    break;
                }
            }
        });

        format!("ws://127.0.0.1:{port}")
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_COMMANDS, 1000);
        assert_eq!(CONNECT_TIMEOUT.as_secs(), 30);
    }

    #[tokio::test]
    async fn test_command_round_trip_and_events() {
        let url = echo_server().await;
        let connection = Connection::connect(&url).await.expect("connect");

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        connection.set_event_handler(Box::new(move |event| {
            let _ = event_tx.send(event.method);
        }));

        let response = connection
            .send(Command::enable("Network"))
            .await
            .expect("response");
        let result = response.into_result("Network.enable").expect("success");
        assert_eq!(result["echo"], "Network.enable");
        assert_eq!(connection.pending_count(), 0);

        let method = event_rx.recv().await.expect("event delivered");
        assert_eq!(method, "Page.loadEventFired");

        connection.shutdown().expect("shutdown");
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let url = echo_server().await;
        let connection = Connection::connect(&url).await.expect("connect");

        connection.shutdown().expect("shutdown");
        while connection.is_open() {
            tokio::task::yield_now().await;
        }

        let result = connection.send(Command::enable("Page")).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(connection.shutdown().is_err());
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_in_flight_command_fails_when_peer_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let connection = Connection::connect(&format!("ws://127.0.0.1:{port}"))
            .await
            .expect("connect");

        let err = connection
            .send(Command::enable("Network"))
            .await
            .expect_err("peer closed before replying");
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(err.is_connection_error());
        assert_eq!(connection.pending_count(), 0);
    }
}
