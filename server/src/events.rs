//! Scripted one-shot market shocks applied to specific funds

use log::warn;
use shared::{Fund, PRICE_FLOOR};

/// A scripted price shock. Each event is bound to exactly one target fund
/// and multiplies its price once per application; applying the same event
/// twice compounds twice.
#[derive(Debug)]
pub struct MarketEventSpec {
    pub id: &'static str,
    pub fund_id: &'static str,
    pub headline: &'static str,
    pub multiplier: f64,
}

/// Fixed event catalog. Multipliers encode the headline percentages.
pub const MARKET_EVENTS: &[MarketEventSpec] = &[
    MarketEventSpec {
        id: "trump_executive_order",
        fund_id: "trump_coin",
        headline: "Trump Executive Order (+40%)",
        multiplier: 1.4,
    },
    MarketEventSpec {
        id: "trump_rug_pull",
        fund_id: "trump_coin",
        headline: "Rug Pull (-90%)",
        multiplier: 0.1,
    },
    MarketEventSpec {
        id: "checkpoint_fda_rejection",
        fund_id: "checkpoint",
        headline: "FDA Rejection (-35%)",
        multiplier: 0.65,
    },
    MarketEventSpec {
        id: "boeing_no_chairs",
        fund_id: "boeing",
        headline: "No Chairs (+30%)",
        multiplier: 1.3,
    },
    MarketEventSpec {
        id: "boeing_doors_off",
        fund_id: "boeing",
        headline: "Doors Fall Off (-20%)",
        multiplier: 0.8,
    },
    MarketEventSpec {
        id: "luigi_green_sweater",
        fund_id: "luigi",
        headline: "Green Sweater (+69%)",
        multiplier: 1.69,
    },
    MarketEventSpec {
        id: "taylor_new_dates",
        fund_id: "taylor",
        headline: "New Tour Dates (+40%)",
        multiplier: 1.4,
    },
    MarketEventSpec {
        id: "taylor_engagement",
        fund_id: "taylor",
        headline: "Engagement Rumors (-25%)",
        multiplier: 0.75,
    },
];

pub fn lookup(event_id: &str) -> Option<&'static MarketEventSpec> {
    MARKET_EVENTS.iter().find(|e| e.id == event_id)
}

/// Resolves an event against its target fund. Unknown event ids, unknown
/// fund ids, and events aimed at the wrong fund are all no-ops.
pub fn resolve<'a>(
    event_id: &str,
    fund_id: &str,
    funds: &'a mut [Fund],
) -> Option<(&'static MarketEventSpec, &'a mut Fund)> {
    let Some(spec) = lookup(event_id) else {
        warn!("Ignoring unknown market event '{}'", event_id);
        return None;
    };

    if spec.fund_id != fund_id {
        warn!(
            "Ignoring market event '{}': targets fund '{}', not '{}'",
            event_id, spec.fund_id, fund_id
        );
        return None;
    }

    let Some(fund) = funds.iter_mut().find(|f| f.id == fund_id) else {
        warn!("Ignoring market event '{}': unknown fund '{}'", event_id, fund_id);
        return None;
    };

    Some((spec, fund))
}

/// Multiplies the fund's price by the event's multiplier, keeping the
/// price floor invariant. Returns the new price.
pub fn apply(spec: &MarketEventSpec, fund: &mut Fund) -> f64 {
    fund.price = (fund.price * spec.multiplier).max(PRICE_FLOOR);
    fund.price
}
