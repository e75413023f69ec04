use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const PRICE_FLOOR: f64 = 0.01;
pub const STARTING_CASH: f64 = 100_000.0;
pub const DEFAULT_TIME_REMAINING: u32 = 60;
pub const PRICE_TICK_SECS: u64 = 5;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const RECONNECT_DELAY_SECS: u64 = 5;
pub const POLL_INTERVAL_SECS: u64 = 5;

/// A tradable synthetic asset. Prices drift by `trend` and jitter by
/// `volatility` while markets are closed; `initial_price` is what a game
/// reset restores.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fund {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(rename = "initialPrice")]
    pub initial_price: f64,
    pub trend: f64,
    pub volatility: f64,
    #[serde(default)]
    pub frozen: bool,
}

impl Fund {
    pub fn new(id: &str, name: &str, price: f64, trend: f64, volatility: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            price,
            initial_price: price,
            trend,
            volatility,
            frozen: false,
        }
    }
}

/// The fund roster every game starts from.
pub fn default_funds() -> Vec<Fund> {
    vec![
        Fund::new("trump_coin", "Trump Coin", 100.0, 0.02, 0.2),
        Fund::new("checkpoint", "Checkpoint Therapeutics", 50.0, -0.01, 0.1),
        Fund::new("boeing", "Boeing Co.", 200.0, -0.005, 0.05),
        Fund::new("luigi", "Luigi Mangione Legal Fund", 75.0, 0.015, 0.08),
        Fund::new("taylor", "Taylor Swift's Eras Tour Treasury", 150.0, 0.03, 0.05),
    ]
}

/// A participant, keyed by name. Created lazily with starting cash on first
/// reference; holdings map fund id to share count.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub name: String,
    pub cash: f64,
    #[serde(default)]
    pub holdings: HashMap<String, u32>,
}

impl Player {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cash: STARTING_CASH,
            holdings: HashMap::new(),
        }
    }

    /// Cash plus holdings valued at current fund prices. Shares in funds
    /// missing from `funds` value at zero.
    pub fn portfolio_value(&self, funds: &[Fund]) -> f64 {
        let holdings_value: f64 = self
            .holdings
            .iter()
            .filter_map(|(fund_id, shares)| {
                funds
                    .iter()
                    .find(|f| &f.id == fund_id)
                    .map(|f| f.price * *shares as f64)
            })
            .sum();
        self.cash + holdings_value
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// A pending trade request. Transient: lives in the server's queue from
/// submission until settlement or rejection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub player_name: String,
    #[serde(rename = "orderType")]
    pub side: OrderSide,
    pub fund_id: String,
    pub shares: u32,
}

/// Trading mode for the whole game. Prices only move while markets are
/// closed; the buying/selling cycle trades against frozen valuations.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    #[serde(rename = "Markets Closed")]
    MarketsClosed,
    Buying,
    Selling,
    Ended,
}

impl Phase {
    pub fn is_running(self) -> bool {
        matches!(self, Phase::MarketsClosed | Phase::Buying | Phase::Selling)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => write!(f, "Setup"),
            Phase::MarketsClosed => write!(f, "Markets Closed"),
            Phase::Buying => write!(f, "Buying"),
            Phase::Selling => write!(f, "Selling"),
            Phase::Ended => write!(f, "Ended"),
        }
    }
}

/// Connection role, passed as the `type` query parameter at connect time.
/// Admin and public are singleton slots on the server; players accumulate.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Public,
    Player,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Public => "public",
            Role::Player => "player",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "public" => Ok(Role::Public),
            "player" => Ok(Role::Player),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Messages a client may send to the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    GetInitialData,
    StartGame,
    EndGame,
    ResetGame,
    #[serde(rename_all = "camelCase")]
    UpdatePhase { phase: Phase, time_remaining: u32 },
    #[serde(rename_all = "camelCase")]
    MarketEvent { event_type: String, fund_id: String },
    NewOrder { order: Order },
    PlayerUpdate { player: Player },
    SettleOrder { order: Order },
    RejectOrder { order: Order },
}

/// Messages the server pushes to clients. `NewOrder` goes to the admin
/// session only; everything else fans out to all live sessions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    InitialData {
        phase: Phase,
        time_remaining: u32,
        funds: Vec<Fund>,
        players: Vec<Player>,
    },
    FundsUpdate {
        funds: Vec<Fund>,
    },
    PlayerUpdate {
        player: Player,
    },
    #[serde(rename_all = "camelCase")]
    PhaseUpdate {
        phase: Phase,
        time_remaining: u32,
    },
    NewOrder {
        order: Order,
    },
    OrderRejected {
        order: Order,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    MarketEvent {
        event: String,
        fund_id: String,
        new_price: f64,
    },
    #[serde(rename_all = "camelCase")]
    GameStarted {
        phase: Phase,
        time_remaining: u32,
        funds: Vec<Fund>,
    },
    GameEnded,
    GameReset {
        funds: Vec<Fund>,
    },
}
