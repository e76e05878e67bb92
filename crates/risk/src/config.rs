//! Risk and liquidation parameters

use lendpool_ledger::error::check_range;
use lendpool_ledger::ParameterError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Collateral requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Minimum health factor a position must have after a borrow or a
    /// collateral withdrawal
    #[serde(default = "default_min_initiation_ratio")]
    pub min_initiation_ratio: Decimal,

    /// Weight applied to collateral value in the health factor
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold: Decimal,
}

fn default_min_initiation_ratio() -> Decimal {
    Decimal::new(12, 1) // 120%
}

fn default_liquidation_threshold() -> Decimal {
    Decimal::new(9, 1) // 90%
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_initiation_ratio: default_min_initiation_ratio(),
            liquidation_threshold: default_liquidation_threshold(),
        }
    }
}

impl RiskConfig {
    /// A freshly opened position must not be liquidatable, so the initiation
    /// floor sits strictly above health factor 1.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.liquidation_threshold <= Decimal::ZERO || self.liquidation_threshold > Decimal::ONE {
            return Err(ParameterError::new(
                "risk.liquidation_threshold",
                self.liquidation_threshold,
                "in (0, 1]",
            ));
        }
        if self.min_initiation_ratio <= Decimal::ONE {
            return Err(ParameterError::new(
                "risk.min_initiation_ratio",
                self.min_initiation_ratio,
                "a health factor > 1",
            ));
        }
        Ok(())
    }
}

/// Liquidation economics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Extra collateral value seized on top of the debt covered (e.g. 0.05 = 5%)
    #[serde(default = "default_penalty")]
    pub penalty: Decimal,

    /// Share of the penalty value kept by the protocol; the rest goes to the
    /// liquidator
    #[serde(default = "default_protocol_fee_share")]
    pub protocol_fee_share: Decimal,

    /// Share of the debt covered per liquidation (1.0 = full)
    #[serde(default = "default_close_factor")]
    pub close_factor: Decimal,
}

fn default_penalty() -> Decimal {
    Decimal::new(5, 2)
}

fn default_protocol_fee_share() -> Decimal {
    Decimal::new(10, 2)
}

fn default_close_factor() -> Decimal {
    Decimal::ONE
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            penalty: default_penalty(),
            protocol_fee_share: default_protocol_fee_share(),
            close_factor: default_close_factor(),
        }
    }
}

impl LiquidationConfig {
    pub fn validate(&self) -> Result<(), ParameterError> {
        check_range("liquidation.penalty", self.penalty, Decimal::ZERO, Decimal::ONE, "between 0 and 1")?;
        check_range(
            "liquidation.protocol_fee_share",
            self.protocol_fee_share,
            Decimal::ZERO,
            Decimal::ONE,
            "between 0 and 1",
        )?;
        if self.close_factor <= Decimal::ZERO || self.close_factor > Decimal::ONE {
            return Err(ParameterError::new(
                "liquidation.close_factor",
                self.close_factor,
                "in (0, 1]",
            ));
        }
        Ok(())
    }
}
