//! Local mirror of the authoritative game state
//!
//! Clients never compute game logic; they fold every inbound message into
//! this mirror so the view converges on whatever the server last said.
//! `initialData` replaces the mirror wholesale, everything else patches it.

use shared::{Fund, Phase, Player, ServerMessage, DEFAULT_TIME_REMAINING};

#[derive(Debug, Clone)]
pub struct ClientState {
    pub phase: Phase,
    pub time_remaining: u32,
    pub funds: Vec<Fund>,
    pub players: Vec<Player>,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Setup,
            time_remaining: 0,
            funds: Vec::new(),
            players: Vec::new(),
        }
    }

    /// True once a full snapshot has arrived.
    pub fn is_synced(&self) -> bool {
        !self.funds.is_empty()
    }

    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::InitialData {
                phase,
                time_remaining,
                funds,
                players,
            } => {
                self.phase = *phase;
                self.time_remaining = *time_remaining;
                self.funds = funds.clone();
                self.players = players.clone();
            }
            ServerMessage::FundsUpdate { funds } => {
                self.funds = funds.clone();
            }
            ServerMessage::PlayerUpdate { player } => {
                self.upsert_player(player);
            }
            ServerMessage::PhaseUpdate {
                phase,
                time_remaining,
            } => {
                self.phase = *phase;
                self.time_remaining = *time_remaining;
            }
            ServerMessage::MarketEvent {
                fund_id, new_price, ..
            } => {
                if let Some(fund) = self.funds.iter_mut().find(|f| &f.id == fund_id) {
                    fund.price = *new_price;
                }
            }
            ServerMessage::GameStarted {
                phase,
                time_remaining,
                funds,
            } => {
                self.phase = *phase;
                self.time_remaining = *time_remaining;
                self.funds = funds.clone();
            }
            ServerMessage::GameEnded => {
                self.phase = Phase::Ended;
            }
            ServerMessage::GameReset { funds } => {
                self.phase = Phase::MarketsClosed;
                self.time_remaining = DEFAULT_TIME_REMAINING;
                self.funds = funds.clone();
            }
            // Notifications with no bearing on the mirrored state
            ServerMessage::NewOrder { .. } | ServerMessage::OrderRejected { .. } => {}
        }
    }

    fn upsert_player(&mut self, player: &Player) {
        match self.players.iter_mut().find(|p| p.name == player.name) {
            Some(existing) => *existing = player.clone(),
            None => self.players.push(player.clone()),
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
