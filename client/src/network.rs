//! Connection lifecycle shared by every client role
//!
//! One reusable module replaces the per-role reconnect loops the UIs would
//! otherwise each carry. A client runs the state machine
//! `Connecting -> Open -> Closed/Errored -> Reconnecting -> ...` with a
//! fixed delay between attempts; once the attempt cap is hit it degrades to
//! pull-based polling of `/poll` indefinitely. On every (re)connect it
//! requests a fresh snapshot first, then flushes messages queued while
//! disconnected, in original order.

use crate::state::ClientState;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use shared::{
    ClientMessage, Role, ServerMessage, MAX_RECONNECT_ATTEMPTS, POLL_INTERVAL_SECS,
    RECONNECT_DELAY_SECS,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Transport-level failure of one connection attempt.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closed,
    Errored,
    Reconnecting,
    Polling,
}

/// Handle for queueing outbound messages from outside the drive loop.
#[derive(Clone)]
pub struct ClientSender {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl ClientSender {
    /// Queues a message. Delivered immediately while the connection is
    /// open, otherwise after the next successful reconnect.
    pub fn send(&self, message: ClientMessage) {
        let _ = self.tx.send(message);
    }
}

pub struct Client {
    server: String,
    role: Role,
    phase: ConnectionPhase,
    state: ClientState,
    /// Messages whose delivery failed, retried ahead of the channel backlog.
    outbox: VecDeque<ClientMessage>,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    reconnect_attempts: u32,
}

impl Client {
    pub fn new(server: &str, role: Role) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            server: server.to_string(),
            role,
            phase: ConnectionPhase::Connecting,
            state: ClientState::new(),
            outbox: VecDeque::new(),
            cmd_tx,
            cmd_rx,
            reconnect_attempts: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn sender(&self) -> ClientSender {
        ClientSender {
            tx: self.cmd_tx.clone(),
        }
    }

    pub fn websocket_url(&self) -> String {
        format!("ws://{}/ws?type={}", self.server, self.role)
    }

    pub fn poll_url(&self) -> String {
        format!("http://{}/poll?type={}", self.server, self.role)
    }

    /// Runs the connection lifecycle forever: duplex while it lasts,
    /// fixed-delay reconnects up to the cap, then polling indefinitely.
    pub async fn run(&mut self) {
        loop {
            match self.drive_connection().await {
                Ok(()) => info!("Connection closed by server"),
                Err(e) => error!("Connection error: {}", e),
            }

            self.reconnect_attempts += 1;
            if self.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
                warn!("Max reconnection attempts reached, falling back to polling");
                return self.run_polling().await;
            }

            self.phase = ConnectionPhase::Reconnecting;
            info!(
                "Attempting to reconnect ({}/{})...",
                self.reconnect_attempts, MAX_RECONNECT_ATTEMPTS
            );
            sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
        }
    }

    /// One full connection: dial, sync, pump frames until the connection
    /// drops. Ok means the server closed cleanly; Err means transport
    /// failure. Public so hosts (and tests) can drive a single session.
    pub async fn drive_connection(&mut self) -> Result<(), ClientError> {
        self.phase = ConnectionPhase::Connecting;
        let url = self.websocket_url();
        info!("Connecting to {}", url);

        let (socket, _response) = match connect_async(url.as_str()).await {
            Ok(connection) => connection,
            Err(e) => {
                self.phase = ConnectionPhase::Errored;
                return Err(e.into());
            }
        };
        let (mut sink, stream) = socket.split();

        self.phase = ConnectionPhase::Open;
        self.reconnect_attempts = 0;
        info!("Connected to server as {}", self.role);

        // Converge on current truth first, then flush the backlog in order
        send_json(&mut sink, &ClientMessage::GetInitialData).await?;
        while let Some(message) = self.outbox.pop_front() {
            if let Err(e) = send_json(&mut sink, &message).await {
                self.outbox.push_front(message);
                self.phase = ConnectionPhase::Errored;
                return Err(e);
            }
        }

        self.pump(sink, stream).await
    }

    async fn pump(&mut self, mut sink: WsSink, mut stream: WsStream) -> Result<(), ClientError> {
        loop {
            tokio::select! {
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Close(_))) | None => {
                            self.phase = ConnectionPhase::Closed;
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.phase = ConnectionPhase::Errored;
                            return Err(e.into());
                        }
                    }
                },
                queued = self.cmd_rx.recv() => {
                    if let Some(message) = queued {
                        if let Err(e) = send_json(&mut sink, &message).await {
                            // Keep it for the next connection
                            self.outbox.push_back(message);
                            self.phase = ConnectionPhase::Errored;
                            return Err(e);
                        }
                    }
                },
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed server message: {}", e);
                return;
            }
        };

        match &message {
            ServerMessage::MarketEvent {
                event, new_price, ..
            } => {
                info!("Market event: {} (new price {:.2})", event, new_price);
            }
            ServerMessage::GameStarted { .. } => info!("Game started"),
            ServerMessage::GameEnded => info!("Game ended"),
            ServerMessage::GameReset { .. } => info!("Game reset"),
            ServerMessage::OrderRejected { order, reason } => {
                warn!("Order for {} rejected: {}", order.player_name, reason);
            }
            _ => {}
        }

        self.state.apply(&message);
    }

    /// Pull-based fallback: refresh the full snapshot on a fixed interval.
    /// Never returns; outbound messages stay queued because only the duplex
    /// channel can deliver them.
    async fn run_polling(&mut self) {
        self.phase = ConnectionPhase::Polling;
        let url = self.poll_url();
        let http = reqwest::Client::new();
        let mut poll_interval = interval(Duration::from_secs(POLL_INTERVAL_SECS));

        loop {
            poll_interval.tick().await;
            match self.poll_once_with(&http, &url).await {
                Ok(()) => {}
                Err(e) => warn!("Polling error: {}", e),
            }
        }
    }

    /// One snapshot fetch over HTTP, folded into the local mirror.
    pub async fn poll_once(&mut self) -> Result<(), reqwest::Error> {
        let url = self.poll_url();
        let http = reqwest::Client::new();
        self.poll_once_with(&http, &url).await
    }

    async fn poll_once_with(
        &mut self,
        http: &reqwest::Client,
        url: &str,
    ) -> Result<(), reqwest::Error> {
        let snapshot = http.get(url).send().await?.json::<ServerMessage>().await?;
        self.state.apply(&snapshot);
        Ok(())
    }
}

async fn send_json(sink: &mut WsSink, message: &ClientMessage) -> Result<(), ClientError> {
    let frame = serde_json::to_string(message)?;
    sink.send(Message::Text(frame)).await?;
    Ok(())
}
