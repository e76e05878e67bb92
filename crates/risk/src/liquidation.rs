//! Liquidation engine
//!
//! Settles the debt of a position whose health factor fell below 1 by seizing
//! collateral at a freshly verified price. The penalty value actually covered
//! by seized collateral is split between the protocol and the liquidator; debt
//! the collateral cannot cover is written off as bad debt.

use lendpool_core::{CheckedDecimal, PoolError, ReceiptClass, ReceiptId, Timestamp};
use lendpool_ledger::PositionLedger;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LiquidationConfig;
use crate::engine::CollateralRiskEngine;
use crate::gate::VerifiedPrice;

/// What a liquidation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeizureResult {
    pub receipt: ReceiptId,
    pub debt_repaid: Decimal,
    pub collateral_seized: Decimal,
    /// Collateral handed back to the borrower on full settlement
    pub collateral_returned: Decimal,
    /// Protocol share of the penalty, in base-asset units
    pub liquidation_fee: Decimal,
    /// Liquidator share of the penalty, in base-asset units
    pub liquidator_bonus: Decimal,
    pub bad_debt: Decimal,
    pub fully_settled: bool,
    pub price: Decimal,
    /// Health factor before liquidation
    pub health_factor: Decimal,
}

#[derive(Debug, Clone)]
pub struct LiquidationEngine {
    config: LiquidationConfig,
    risk: CollateralRiskEngine,
}

impl LiquidationEngine {
    pub fn new(config: LiquidationConfig, risk: CollateralRiskEngine) -> Self {
        Self { config, risk }
    }

    pub fn config(&self) -> &LiquidationConfig {
        &self.config
    }

    /// Verify the attestation, then liquidate.
    pub fn liquidate(
        &self,
        ledger: &mut PositionLedger,
        receipt: ReceiptId,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<SeizureResult, PoolError> {
        let price = self.risk.verify_price(raw_attestation, now)?;
        self.liquidate_at(ledger, receipt, &price, now)
    }

    pub fn liquidate_at(
        &self,
        ledger: &mut PositionLedger,
        receipt: ReceiptId,
        price: &VerifiedPrice,
        now: Timestamp,
    ) -> Result<SeizureResult, PoolError> {
        let p = price.price();
        let mut tx = ledger.begin(now)?;
        if tx.has_lender(&receipt) {
            return Err(PoolError::receipt_mismatch(receipt, ReceiptClass::Borrower));
        }
        let position = tx
            .borrower(receipt)?
            .ok_or(PoolError::NothingToLiquidate(receipt))?;

        let debt = position.debt();
        if debt.is_zero() {
            return Err(PoolError::NothingToLiquidate(receipt));
        }
        let collateral = position.collateral_posted;
        let health_factor = self.risk.health_factor(position, p)?;
        if health_factor >= Decimal::ONE {
            return Err(PoolError::PositionHealthy {
                receipt,
                health_factor,
            });
        }

        let mut covered = debt * self.config.close_factor;
        let wanted = covered
            .try_mul(Decimal::ONE + self.config.penalty, "seizure")?
            .try_div(p, "seizure")?;
        let seized = wanted.min(collateral);
        let exhausted = seized >= collateral;

        // Out of collateral: nothing is left to back the rest of the debt
        if exhausted {
            covered = debt;
        }
        let seized_value = seized.try_mul(p, "seized value")?;
        let (debt_repaid, bad_debt) = if exhausted {
            let repaid = covered.min(seized_value);
            (repaid, covered - repaid)
        } else {
            (covered, Decimal::ZERO)
        };
        let penalty_value = (seized_value - debt_repaid).max(Decimal::ZERO);
        let liquidation_fee = penalty_value * self.config.protocol_fee_share;
        let liquidator_bonus = penalty_value - liquidation_fee;
        // Settlement pays interest first, so that is what the liquidator's
        // payment covers first
        let interest_collected = debt_repaid.min(position.accrued_interest);

        let principal_settled = position.settle(covered);
        position.collateral_posted -= seized;
        let fully_settled = !position.has_debt();
        let collateral_returned = if fully_settled {
            position.collateral_posted
        } else {
            Decimal::ZERO
        };
        if fully_settled {
            position.close();
        }

        let pool = tx.pool_mut();
        let bad_debt_total = pool.bad_debt.try_add(bad_debt, "bad debt")?;
        let fees = pool
            .protocol_fee_accrued
            .try_add(liquidation_fee, "protocol fee")?;
        let reserve = pool
            .interest_reserve
            .try_add(interest_collected, "interest reserve")?;
        pool.total_borrowed -= principal_settled;
        pool.total_collateral -= seized + collateral_returned;
        pool.bad_debt = bad_debt_total;
        pool.protocol_fee_accrued = fees;
        pool.interest_reserve = reserve;
        tx.commit();

        if !bad_debt.is_zero() {
            warn!(%receipt, %bad_debt, "liquidation left bad debt");
        }
        info!(
            %receipt,
            %debt_repaid,
            collateral_seized = %seized,
            %collateral_returned,
            fee = %liquidation_fee,
            %health_factor,
            price = %p,
            "liquidation"
        );

        Ok(SeizureResult {
            receipt,
            debt_repaid,
            collateral_seized: seized,
            collateral_returned,
            liquidation_fee,
            liquidator_bonus,
            bad_debt,
            fully_settled,
            price: p,
            health_factor,
        })
    }
}
