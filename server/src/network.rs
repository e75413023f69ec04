//! HTTP/WebSocket front end and game-loop coordination
//!
//! Connection handlers never touch game state directly. Every socket
//! forwards typed commands over one mpsc channel into `run_game_loop`,
//! which owns the [`Game`] and the [`SessionRegistry`] outright. All
//! mutation therefore happens on one task, interleaved turn by turn, and
//! needs no locking.

use crate::game::Game;
use crate::sessions::{Outbound, SessionRegistry};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use shared::{ClientMessage, Role, ServerMessage};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// Commands sent from connection handlers to the game loop.
#[derive(Debug)]
pub enum GameCommand {
    Register {
        role: Role,
        tx: Outbound,
        reply: oneshot::Sender<u64>,
    },
    Unregister {
        session_id: u64,
    },
    Inbound {
        session_id: u64,
        role: Role,
        message: ClientMessage,
    },
    Snapshot {
        reply: oneshot::Sender<ServerMessage>,
    },
}

#[derive(Clone)]
struct AppState {
    cmd_tx: mpsc::Sender<GameCommand>,
}

/// Connection parameters: `?type=admin|public|player`, defaulting to
/// public. Unknown values also fall back to public.
#[derive(Debug, Deserialize)]
struct ConnectParams {
    #[serde(rename = "type")]
    client_type: Option<String>,
}

impl ConnectParams {
    fn role(&self) -> Role {
        match &self.client_type {
            None => Role::Public,
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!("Unknown client type '{}', treating as public", value);
                Role::Public
            }),
        }
    }
}

/// Builds the HTTP surface: the duplex channel at `/ws`, the pull-based
/// fallback at `/poll`, and a liveness probe at `/health`.
pub fn router(cmd_tx: mpsc::Sender<GameCommand>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/poll", get(poll_handler))
        .route("/health", get(health_handler))
        .with_state(AppState { cmd_tx })
}

/// Serves the HTTP surface on an already-bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    cmd_tx: mpsc::Sender<GameCommand>,
) -> std::io::Result<()> {
    axum::serve(listener, router(cmd_tx)).await
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Polling fallback: the same `initialData` shape the socket would push.
async fn poll_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (reply_tx, reply_rx) = oneshot::channel();
    let request = GameCommand::Snapshot { reply: reply_tx };

    if state.cmd_tx.send(request).await.is_err() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    match reply_rx.await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let role = params.role();
    ws.on_upgrade(move |socket| handle_socket(socket, role, state))
}

/// Drives one WebSocket connection: registers it with the game loop, then
/// pumps frames both ways until either side closes.
async fn handle_socket(socket: WebSocket, role: Role, state: AppState) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (reply_tx, reply_rx) = oneshot::channel();

    let register = GameCommand::Register {
        role,
        tx,
        reply: reply_tx,
    };
    if state.cmd_tx.send(register).await.is_err() {
        return;
    }
    let Ok(session_id) = reply_rx.await else {
        return;
    };

    let (mut sink, mut stream) = socket.split();

    // Outbound: drain the session channel into the socket. The registry
    // dropping our sender (replacement, sweep, shutdown) ends this loop,
    // and the close frame tells the peer it was superseded.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Inbound: parse frames and forward them to the game loop. Malformed
    // frames are logged and dropped; the connection stays open.
    let cmd_tx = state.cmd_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => {
                        let inbound = GameCommand::Inbound {
                            session_id,
                            role,
                            message,
                        };
                        if cmd_tx.send(inbound).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Malformed message from session {}: {}", session_id, e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error on session {}: {}", session_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let _ = state
        .cmd_tx
        .send(GameCommand::Unregister { session_id })
        .await;
    debug!("Connection for session {} closed", session_id);
}

/// Main server loop: owns all mutable state and interleaves connection
/// commands with the price and countdown clocks.
pub async fn run_game_loop(
    mut game: Game,
    mut sessions: SessionRegistry,
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    tick_secs: u64,
) {
    let mut price_interval = interval(Duration::from_secs(tick_secs));
    price_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut countdown_interval = interval(Duration::from_secs(1));
    countdown_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick of each timer since it fires immediately
    price_interval.tick().await;
    countdown_interval.tick().await;

    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                match command {
                    Some(command) => process_command(&mut game, &mut sessions, command),
                    None => {
                        info!("Command channel closed, stopping game loop");
                        break;
                    }
                }
            },
            _ = price_interval.tick() => {
                for message in game.price_tick() {
                    sessions.broadcast(&message);
                }
            },
            _ = countdown_interval.tick() => {
                game.countdown();
            },
        }
    }
}

/// Applies one command to the game state and fans out whatever it changed.
pub fn process_command(game: &mut Game, sessions: &mut SessionRegistry, command: GameCommand) {
    match command {
        GameCommand::Register { role, tx, reply } => {
            let session_id = sessions.register(role, tx);
            let _ = reply.send(session_id);
            // Late joiners converge immediately instead of waiting a tick
            sessions.send_to(session_id, &game.snapshot());
        }
        GameCommand::Unregister { session_id } => {
            sessions.unregister(session_id);
        }
        GameCommand::Snapshot { reply } => {
            let _ = reply.send(game.snapshot());
        }
        GameCommand::Inbound {
            session_id,
            role,
            message,
        } => {
            handle_message(game, sessions, session_id, role, message);
        }
    }
}

fn handle_message(
    game: &mut Game,
    sessions: &mut SessionRegistry,
    session_id: u64,
    role: Role,
    message: ClientMessage,
) {
    debug!("Session {} ({}) sent {:?}", session_id, role, message);

    match message {
        ClientMessage::GetInitialData => {
            let snapshot = game.snapshot();
            sessions.send_to(session_id, &snapshot);
        }
        ClientMessage::StartGame => {
            broadcast_all(game.start(), sessions);
        }
        ClientMessage::EndGame => {
            broadcast_all(game.end(), sessions);
        }
        ClientMessage::ResetGame => {
            broadcast_all(game.reset(), sessions);
        }
        ClientMessage::UpdatePhase {
            phase,
            time_remaining,
        } => {
            broadcast_all(game.set_phase(phase, time_remaining), sessions);
        }
        ClientMessage::MarketEvent {
            event_type,
            fund_id,
        } => {
            broadcast_all(game.market_event(&event_type, &fund_id), sessions);
        }
        ClientMessage::NewOrder { order } => match game.submit_order(order.clone()) {
            Ok(notification) => sessions.send_to_admin(&notification),
            Err(e) => {
                warn!("Rejected order from session {}: {}", session_id, e);
                let rejection = ServerMessage::OrderRejected {
                    order,
                    reason: e.to_string(),
                };
                sessions.send_to(session_id, &rejection);
            }
        },
        ClientMessage::PlayerUpdate { player } => {
            broadcast_all(game.upsert_player(player), sessions);
        }
        ClientMessage::SettleOrder { order } => match game.settle_order(&order) {
            Ok(messages) => broadcast_all(messages, sessions),
            Err(e) => {
                warn!("Settlement failed for {}: {}", order.player_name, e);
                // Player UIs filter rejections by name; there is no
                // per-player identity binding without auth
                let rejection = ServerMessage::OrderRejected {
                    order,
                    reason: e.to_string(),
                };
                sessions.broadcast(&rejection);
            }
        },
        ClientMessage::RejectOrder { order } => match game.reject_order(&order) {
            Ok(message) => sessions.broadcast(&message),
            Err(e) => warn!("Cannot reject order for {}: {}", order.player_name, e),
        },
    }
}

fn broadcast_all(messages: Vec<ServerMessage>, sessions: &mut SessionRegistry) {
    for message in &messages {
        sessions.broadcast(message);
    }
}
