//! Authoritative game state and the phase/timer state machine
//!
//! Every mutation of the shared state happens through the methods here, and
//! each mutating method hands back the broadcast messages the caller must
//! fan out. That keeps the "mutate, then immediately broadcast" discipline
//! in one place instead of scattered across handlers.

use crate::events;
use crate::orders::{self, OrderError};
use crate::pricing::PriceEngine;
use log::info;
use shared::{default_funds, Fund, Order, Phase, Player, ServerMessage, DEFAULT_TIME_REMAINING};
use std::collections::{BTreeMap, VecDeque};

/// The aggregate root. Owned exclusively by the game-loop task; handlers
/// reach it only through the command channel, so access is single-threaded
/// and turn-based.
pub struct Game {
    phase: Phase,
    time_remaining: u32,
    funds: Vec<Fund>,
    players: BTreeMap<String, Player>,
    pending_orders: VecDeque<Order>,
    /// Market events received during Setup, applied in order by `start()`.
    pending_impacts: Vec<(String, String)>,
    ticking: bool,
    engine: PriceEngine,
}

impl Game {
    pub fn new() -> Self {
        Self::with_engine(PriceEngine::new())
    }

    pub fn with_engine(engine: PriceEngine) -> Self {
        Self {
            phase: Phase::Setup,
            time_remaining: DEFAULT_TIME_REMAINING,
            funds: default_funds(),
            players: BTreeMap::new(),
            pending_orders: VecDeque::new(),
            pending_impacts: Vec::new(),
            ticking: false,
            engine,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn funds(&self) -> &[Fund] {
        &self.funds
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn pending_order_count(&self) -> usize {
        self.pending_orders.len()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    /// Full-state snapshot, pushed to new sessions and served by `/poll`.
    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::InitialData {
            phase: self.phase,
            time_remaining: self.time_remaining,
            funds: self.funds.clone(),
            players: self.players.values().cloned().collect(),
        }
    }

    /// Leaves Setup: folds in any market impacts accumulated while setting
    /// up, opens the market, and starts the price clock.
    pub fn start(&mut self) -> Vec<ServerMessage> {
        info!("Starting game");

        let impacts = std::mem::take(&mut self.pending_impacts);
        for (event_id, fund_id) in &impacts {
            if let Some((spec, fund)) = events::resolve(event_id, fund_id, &mut self.funds) {
                let new_price = events::apply(spec, fund);
                info!(
                    "Applied deferred market impact '{}' to {}: new price {:.2}",
                    event_id, fund_id, new_price
                );
            }
        }

        self.phase = Phase::MarketsClosed;
        self.time_remaining = DEFAULT_TIME_REMAINING;
        self.ticking = true;

        vec![ServerMessage::GameStarted {
            phase: self.phase,
            time_remaining: self.time_remaining,
            funds: self.funds.clone(),
        }]
    }

    /// Explicit admin-driven phase/timer assignment. The core never cycles
    /// phases on its own.
    pub fn set_phase(&mut self, phase: Phase, time_remaining: u32) -> Vec<ServerMessage> {
        info!("Phase set to {} ({}s)", phase, time_remaining);
        self.phase = phase;
        self.time_remaining = time_remaining;

        vec![ServerMessage::PhaseUpdate {
            phase: self.phase,
            time_remaining: self.time_remaining,
        }]
    }

    /// Terminal transition: stops the price clock and closes the game.
    /// Orders arriving afterwards are rejected, not dropped.
    pub fn end(&mut self) -> Vec<ServerMessage> {
        info!("Ending game");
        self.stop_ticking();
        self.phase = Phase::Ended;

        vec![ServerMessage::GameEnded]
    }

    /// Returns the game to a fresh round: prices back to their initial
    /// values, markets closed, queues drained. The player roster survives.
    pub fn reset(&mut self) -> Vec<ServerMessage> {
        info!("Resetting game");
        self.stop_ticking();
        self.phase = Phase::MarketsClosed;
        self.time_remaining = DEFAULT_TIME_REMAINING;
        self.pending_impacts.clear();
        self.pending_orders.clear();
        for fund in &mut self.funds {
            fund.price = fund.initial_price;
        }

        vec![ServerMessage::GameReset {
            funds: self.funds.clone(),
        }]
    }

    /// Idempotent: stopping an already-stopped clock is a no-op.
    fn stop_ticking(&mut self) {
        self.ticking = false;
    }

    /// One step of the countdown clock, driven once per second while the
    /// game is running. Floors at zero.
    pub fn countdown(&mut self) {
        if self.ticking {
            self.time_remaining = self.time_remaining.saturating_sub(1);
        }
    }

    /// One price-evolution step. Only effective while the clock is running
    /// and markets are closed (trading phases freeze valuation). Portfolio
    /// values move with prices, so every player is re-broadcast too.
    pub fn price_tick(&mut self) -> Vec<ServerMessage> {
        if !self.ticking || self.phase != Phase::MarketsClosed {
            return Vec::new();
        }

        self.engine.tick(&mut self.funds);

        let mut messages = vec![ServerMessage::FundsUpdate {
            funds: self.funds.clone(),
        }];
        for player in self.players.values() {
            messages.push(ServerMessage::PlayerUpdate {
                player: player.clone(),
            });
        }
        messages
    }

    /// Applies a named shock to its target fund. During Setup the impact is
    /// deferred and folded in by `start()`; otherwise it takes effect
    /// immediately. Unknown ids are validated and ignored in both cases.
    pub fn market_event(&mut self, event_id: &str, fund_id: &str) -> Vec<ServerMessage> {
        if self.phase == Phase::Setup {
            if events::resolve(event_id, fund_id, &mut self.funds).is_some() {
                info!("Deferring market impact '{}' until game start", event_id);
                self.pending_impacts
                    .push((event_id.to_string(), fund_id.to_string()));
            }
            return Vec::new();
        }

        let Some((spec, fund)) = events::resolve(event_id, fund_id, &mut self.funds) else {
            return Vec::new();
        };

        let new_price = events::apply(spec, fund);
        info!(
            "Market event '{}' on {}: {} -> new price {:.2}",
            event_id, fund_id, spec.headline, new_price
        );

        vec![
            ServerMessage::MarketEvent {
                event: spec.headline.to_string(),
                fund_id: fund_id.to_string(),
                new_price,
            },
            ServerMessage::FundsUpdate {
                funds: self.funds.clone(),
            },
        ]
    }

    /// Queues a validated order for manual settlement and returns the
    /// notification to forward to the admin session.
    pub fn submit_order(&mut self, order: Order) -> Result<ServerMessage, OrderError> {
        if self.phase == Phase::Ended {
            return Err(OrderError::GameEnded);
        }
        orders::validate(&order, &self.funds)?;

        info!(
            "Queued order: {} {} {} x{}",
            order.player_name, order.side, order.fund_id, order.shares
        );
        self.pending_orders.push_back(order.clone());

        Ok(ServerMessage::NewOrder { order })
    }

    /// Settles a queued order at the fund's current price. Returns the
    /// broadcasts to emit on success; on failure the state is untouched and
    /// the error carries the rejection reason.
    pub fn settle_order(&mut self, order: &Order) -> Result<Vec<ServerMessage>, OrderError> {
        if self.phase == Phase::Ended {
            return Err(OrderError::GameEnded);
        }

        let position = self
            .pending_orders
            .iter()
            .position(|pending| pending == order)
            .ok_or(OrderError::NotPending)?;

        let player = orders::settle(order, &self.funds, &mut self.players)?;
        self.pending_orders.remove(position);

        info!(
            "Settled order: {} {} {} x{} (cash now {:.2})",
            order.player_name, order.side, order.fund_id, order.shares, player.cash
        );

        Ok(vec![ServerMessage::PlayerUpdate { player }])
    }

    /// Drops a queued order with no state change.
    pub fn reject_order(&mut self, order: &Order) -> Result<ServerMessage, OrderError> {
        let position = self
            .pending_orders
            .iter()
            .position(|pending| pending == order)
            .ok_or(OrderError::NotPending)?;
        self.pending_orders.remove(position);

        info!(
            "Rejected order: {} {} {} x{}",
            order.player_name, order.side, order.fund_id, order.shares
        );

        Ok(ServerMessage::OrderRejected {
            order: order.clone(),
            reason: "rejected by admin".to_string(),
        })
    }

    /// Replaces or inserts a player record wholesale and re-broadcasts it.
    /// Kept for admin tooling that edits players directly.
    pub fn upsert_player(&mut self, player: Player) -> Vec<ServerMessage> {
        self.players.insert(player.name.clone(), player.clone());

        vec![ServerMessage::PlayerUpdate { player }]
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
