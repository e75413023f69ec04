//! Order validation and live-price settlement
//!
//! All order handling funnels through this module: the same validation runs
//! at submission and at settlement, and settlement always re-resolves the
//! fund's current price rather than the price at submission time. A buy
//! that was affordable when queued can therefore fail settlement after the
//! market moves; that surfaces as `InsufficientFunds`, never a crash.

use shared::{Fund, Order, OrderSide, Player};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    #[error("order is missing a player name")]
    MissingPlayerName,
    #[error("share count must be a positive integer")]
    ZeroShares,
    #[error("unknown fund: {0}")]
    UnknownFund(String),
    #[error("insufficient funds: cost ${needed:.2}, available ${available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: u32, held: u32 },
    #[error("order is not in the pending queue")]
    NotPending,
    #[error("the game has ended")]
    GameEnded,
}

/// Shape validation shared by submission and settlement. Checks the player
/// name, the share count, and that the fund exists.
pub fn validate(order: &Order, funds: &[Fund]) -> Result<(), OrderError> {
    if order.player_name.trim().is_empty() {
        return Err(OrderError::MissingPlayerName);
    }
    if order.shares == 0 {
        return Err(OrderError::ZeroShares);
    }
    if !funds.iter().any(|f| f.id == order.fund_id) {
        return Err(OrderError::UnknownFund(order.fund_id.clone()));
    }
    Ok(())
}

/// Settles an order against the fund's current price, mutating the player's
/// cash and holdings. The player is created on first reference. Returns the
/// updated player on success; on failure nothing changes.
pub fn settle(
    order: &Order,
    funds: &[Fund],
    players: &mut BTreeMap<String, Player>,
) -> Result<Player, OrderError> {
    validate(order, funds)?;

    let fund = funds
        .iter()
        .find(|f| f.id == order.fund_id)
        .ok_or_else(|| OrderError::UnknownFund(order.fund_id.clone()))?;

    let cost = fund.price * order.shares as f64;

    // Check the business rules before touching (or creating) the record so
    // a failed settlement leaves no trace
    match order.side {
        OrderSide::Buy => {
            let available = players
                .get(&order.player_name)
                .map_or(shared::STARTING_CASH, |p| p.cash);
            if available < cost {
                return Err(OrderError::InsufficientFunds {
                    needed: cost,
                    available,
                });
            }
        }
        OrderSide::Sell => {
            let held = players
                .get(&order.player_name)
                .and_then(|p| p.holdings.get(&order.fund_id))
                .copied()
                .unwrap_or(0);
            if held < order.shares {
                return Err(OrderError::InsufficientShares {
                    requested: order.shares,
                    held,
                });
            }
        }
    }

    let player = players
        .entry(order.player_name.clone())
        .or_insert_with(|| Player::new(&order.player_name));

    match order.side {
        OrderSide::Buy => {
            player.cash -= cost;
            *player.holdings.entry(order.fund_id.clone()).or_insert(0) += order.shares;
        }
        OrderSide::Sell => {
            let held = player.holdings.get(&order.fund_id).copied().unwrap_or(0);
            player.cash += cost;
            player
                .holdings
                .insert(order.fund_id.clone(), held - order.shares);
        }
    }

    Ok(player.clone())
}
