//! Interest accrual
//!
//! Borrow rates follow a two-slope utilization curve. Debt grows as simple
//! interest on principal through a pool-wide accumulator
//! (`sum of rate * dt / year`); each position keeps a snapshot of the
//! accumulator and materializes `principal * (current - snapshot)` when it is
//! touched. Lender yield works the same way through `yield_index`.
//!
//! Accrual is lazy: only the pool aggregates and the positions an operation
//! touches are advanced.

use lendpool_core::{CheckedDecimal, PoolError, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{check_range, ParameterError};
use crate::position::{BorrowerPosition, LenderPosition};
use crate::state::PoolState;

/// 365-day year
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Two-slope borrow rate curve, annualized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateModel {
    /// Rate at zero utilization
    #[serde(default = "default_base_rate")]
    pub base_rate: Decimal,

    /// Added linearly up to `optimal_utilization`
    #[serde(default = "default_slope1")]
    pub slope1: Decimal,

    /// Added linearly from `optimal_utilization` to full utilization
    #[serde(default = "default_slope2")]
    pub slope2: Decimal,

    /// The kink
    #[serde(default = "default_optimal_utilization")]
    pub optimal_utilization: Decimal,

    /// Hard cap on the annual rate
    #[serde(default = "default_max_rate")]
    pub max_rate: Decimal,

    /// Share of accrued interest credited to the protocol instead of lenders
    #[serde(default = "default_protocol_fee_share")]
    pub protocol_fee_share: Decimal,
}

fn default_base_rate() -> Decimal {
    Decimal::new(2, 2) // 2%
}

fn default_slope1() -> Decimal {
    Decimal::new(4, 2) // 4%
}

fn default_slope2() -> Decimal {
    Decimal::new(75, 2) // 75%
}

fn default_optimal_utilization() -> Decimal {
    Decimal::new(80, 2) // 80%
}

fn default_max_rate() -> Decimal {
    Decimal::ONE // 100%
}

fn default_protocol_fee_share() -> Decimal {
    Decimal::new(10, 2) // 10%
}

impl Default for RateModel {
    fn default() -> Self {
        Self {
            base_rate: default_base_rate(),
            slope1: default_slope1(),
            slope2: default_slope2(),
            optimal_utilization: default_optimal_utilization(),
            max_rate: default_max_rate(),
            protocol_fee_share: default_protocol_fee_share(),
        }
    }
}

impl RateModel {
    pub fn validate(&self) -> Result<(), ParameterError> {
        let big = Decimal::from(1_000);
        check_range("interest.base_rate", self.base_rate, Decimal::ZERO, big, ">= 0")?;
        check_range("interest.slope1", self.slope1, Decimal::ZERO, big, ">= 0")?;
        check_range("interest.slope2", self.slope2, Decimal::ZERO, big, ">= 0")?;
        check_range("interest.max_rate", self.max_rate, Decimal::ZERO, big, ">= 0")?;
        check_range(
            "interest.protocol_fee_share",
            self.protocol_fee_share,
            Decimal::ZERO,
            Decimal::ONE,
            "between 0 and 1",
        )?;
        if self.optimal_utilization <= Decimal::ZERO || self.optimal_utilization >= Decimal::ONE {
            return Err(ParameterError::new(
                "interest.optimal_utilization",
                self.optimal_utilization,
                "strictly between 0 and 1",
            ));
        }
        Ok(())
    }

    /// Annual borrow rate at `utilization` (clamped to [0, 1])
    pub fn rate(&self, utilization: Decimal) -> Decimal {
        let u = utilization.max(Decimal::ZERO).min(Decimal::ONE);
        let rate = if u <= self.optimal_utilization {
            self.base_rate + (u / self.optimal_utilization) * self.slope1
        } else {
            let excess = (u - self.optimal_utilization) / (Decimal::ONE - self.optimal_utilization);
            self.base_rate + self.slope1 + excess * self.slope2
        };
        rate.min(self.max_rate)
    }
}

/// Applies the rate model to pool aggregates and positions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestAccrualEngine {
    model: RateModel,
}

impl InterestAccrualEngine {
    pub fn new(model: RateModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &RateModel {
        &self.model
    }

    /// Annual borrow rate at the given utilization
    pub fn borrow_rate(&self, utilization: Decimal) -> Decimal {
        self.model.rate(utilization)
    }

    /// Accumulator growth over `elapsed` seconds at `utilization`
    pub fn accumulator_delta(&self, utilization: Decimal, elapsed: u64) -> Decimal {
        if elapsed == 0 {
            return Decimal::ZERO;
        }
        // rate <= 1000 and elapsed < 2^64, so the product fits
        self.borrow_rate(utilization) * Decimal::from(elapsed) / Decimal::from(SECONDS_PER_YEAR)
    }

    /// Advance pool indexes to `now`. Returns the interest accrued.
    ///
    /// Times at or before `last_accrual` are a no-op, as is a pool with nothing
    /// borrowed (only the timestamp moves).
    pub fn accrue_pool(&self, pool: &mut PoolState, now: Timestamp) -> Result<Decimal, PoolError> {
        if now <= pool.last_accrual {
            return Ok(Decimal::ZERO);
        }
        let elapsed = now - pool.last_accrual;

        if pool.total_borrowed.is_zero() {
            pool.last_accrual = now;
            return Ok(Decimal::ZERO);
        }

        let utilization = pool.utilization();
        let delta = self.accumulator_delta(utilization, elapsed);
        let interest = pool.total_borrowed.try_mul(delta, "accrued interest")?;
        let fee = interest * self.model.protocol_fee_share;
        let lender_share = interest - fee;

        let borrow_accumulator = pool.borrow_accumulator.try_add(delta, "borrow accumulator")?;
        // total_borrowed <= total_deposited, so deposits are non-zero here
        let yield_index = if pool.total_deposited.is_zero() {
            pool.yield_index
        } else {
            let per_unit = lender_share.try_div(pool.total_deposited, "yield index")?;
            pool.yield_index.try_add(per_unit, "yield index")?
        };
        let cumulative = pool
            .cumulative_interest_yield
            .try_add(lender_share, "cumulative interest yield")?;
        let fees = pool.protocol_fee_accrued.try_add(fee, "protocol fee")?;

        pool.borrow_accumulator = borrow_accumulator;
        pool.yield_index = yield_index;
        pool.cumulative_interest_yield = cumulative;
        pool.protocol_fee_accrued = fees;
        pool.last_accrual = now;

        debug!(
            elapsed,
            %utilization,
            %delta,
            %interest,
            %fee,
            "pool interest accrued"
        );
        Ok(interest)
    }

    /// Materialize a borrower's interest up to the pool accumulator
    pub fn accrue_borrower(
        &self,
        pool: &PoolState,
        position: &mut BorrowerPosition,
    ) -> Result<(), PoolError> {
        let delta = pool.borrow_accumulator - position.debt_accrual_snapshot;
        if delta > Decimal::ZERO {
            let interest = position.principal_borrowed.try_mul(delta, "accrued interest")?;
            position.accrued_interest = position.accrued_interest.try_add(interest, "accrued interest")?;
        }
        position.debt_accrual_snapshot = pool.borrow_accumulator;
        Ok(())
    }

    /// Materialize a lender's yield up to the pool yield index
    pub fn accrue_lender(
        &self,
        pool: &PoolState,
        position: &mut LenderPosition,
    ) -> Result<(), PoolError> {
        let delta = pool.yield_index - position.accrual_snapshot;
        if delta > Decimal::ZERO {
            let earned = position.principal_deposited.try_mul(delta, "pending yield")?;
            position.pending_yield = position.pending_yield.try_add(earned, "pending yield")?;
        }
        position.accrual_snapshot = pool.yield_index;
        Ok(())
    }

    /// Position-level accrual: the position after `elapsed` seconds at a fixed
    /// `utilization`. Matches the pool path for equal inputs.
    pub fn accrue(
        &self,
        position: &BorrowerPosition,
        utilization: Decimal,
        elapsed: u64,
    ) -> Result<BorrowerPosition, PoolError> {
        let delta = self.accumulator_delta(utilization, elapsed);
        let mut next = position.clone();
        let interest = next.principal_borrowed.try_mul(delta, "accrued interest")?;
        next.accrued_interest = next.accrued_interest.try_add(interest, "accrued interest")?;
        next.debt_accrual_snapshot = next.debt_accrual_snapshot.try_add(delta, "borrow accumulator")?;
        Ok(next)
    }
}
