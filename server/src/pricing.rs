//! Fund price evolution driven by per-fund trend and volatility

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Fund, PRICE_FLOOR};

/// Evolves fund prices one step at a time. Each tick applies the fund's
/// persistent drift plus a uniform random shock scaled by its volatility,
/// clamped so prices never fall below the floor.
pub struct PriceEngine {
    rng: StdRng,
}

impl PriceEngine {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic engine for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advances every non-frozen fund by one price step:
    /// `delta = price * trend + uniform(-0.5, 0.5) * price * volatility`.
    pub fn tick(&mut self, funds: &mut [Fund]) {
        for fund in funds.iter_mut() {
            if fund.frozen {
                continue;
            }

            let trend_movement = fund.price * fund.trend;
            let random_movement = (self.rng.gen::<f64>() - 0.5) * fund.price * fund.volatility;

            fund.price = (fund.price + trend_movement + random_movement).max(PRICE_FLOOR);
        }
    }
}

impl Default for PriceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::default_funds;

    #[test]
    fn test_prices_never_fall_below_floor() {
        let mut engine = PriceEngine::with_seed(7);
        // A fund with brutal downward drift and huge volatility
        let mut funds = vec![Fund::new("doomed", "Doomed Fund", 0.05, -0.9, 2.0)];

        for _ in 0..1000 {
            engine.tick(&mut funds);
            assert!(funds[0].price >= PRICE_FLOOR);
        }
    }

    #[test]
    fn test_frozen_funds_do_not_move() {
        let mut engine = PriceEngine::with_seed(1);
        let mut funds = default_funds();
        funds[0].frozen = true;
        let frozen_price = funds[0].price;

        for _ in 0..50 {
            engine.tick(&mut funds);
        }

        assert_eq!(funds[0].price, frozen_price);
    }

    #[test]
    fn test_zero_volatility_follows_trend_exactly() {
        let mut engine = PriceEngine::with_seed(3);
        let mut funds = vec![Fund::new("steady", "Steady Fund", 100.0, 0.02, 0.0)];

        engine.tick(&mut funds);

        // No random component, so one tick is exactly price * (1 + trend)
        assert!((funds[0].price - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let mut a = PriceEngine::with_seed(42);
        let mut b = PriceEngine::with_seed(42);
        let mut funds_a = default_funds();
        let mut funds_b = default_funds();

        for _ in 0..10 {
            a.tick(&mut funds_a);
            b.tick(&mut funds_b);
        }

        for (fa, fb) in funds_a.iter().zip(funds_b.iter()) {
            assert_eq!(fa.price, fb.price);
        }
    }

    #[test]
    fn test_tick_moves_every_unfrozen_fund() {
        let mut engine = PriceEngine::with_seed(11);
        let mut funds = default_funds();
        let before: Vec<f64> = funds.iter().map(|f| f.price).collect();

        engine.tick(&mut funds);

        for (fund, old) in funds.iter().zip(before.iter()) {
            assert_ne!(fund.price, *old, "fund {} did not move", fund.id);
        }
    }
}
