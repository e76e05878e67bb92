//! End-to-end tests through the pool service

use lendpool_core::{Amount, PoolError, ReceiptId, Timestamp};
use lendpool_events::{EventReader, EventStore};
use lendpool_oracle::{AttestationBuilder, AttestationSigner, PriceUpdate};
use lendpool_rpc::config::{OracleConfig, PoolConfig, DEFAULT_FEED_ID};
use lendpool_rpc::{AppContext, ManualClock, PoolHandle, PoolService, PositionView, ServiceError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::TempDir;

const T0: Timestamp = 1_700_000_000;

struct Harness {
    signers: Vec<AttestationSigner>,
    config: PoolConfig,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let signers: Vec<AttestationSigner> = (0..3).map(AttestationSigner::generate).collect();
        let config = PoolConfig {
            oracle: OracleConfig {
                trust_anchors: signers.iter().map(|s| s.public_key_hex()).collect(),
                ..OracleConfig::default()
            },
            ..PoolConfig::default()
        };
        Self {
            signers,
            config,
            clock: Arc::new(ManualClock::new(T0)),
        }
    }

    fn spawn(&self, journal: Option<EventStore>) -> PoolHandle {
        let pool = self.config.build_pool().unwrap();
        let (handle, _task) = PoolService::spawn(pool, self.clock.clone(), journal);
        handle
    }

    /// Attestation signed by the first `signer_count` anchors
    fn attest_with(&self, price: Decimal, publish_time: Timestamp, signer_count: usize) -> Vec<u8> {
        let mantissa = (price * Decimal::ONE_HUNDRED).to_i64().unwrap();
        let signers: Vec<&AttestationSigner> = self.signers.iter().take(signer_count).collect();
        AttestationBuilder::new(0)
            .emitted_at(publish_time)
            .update(PriceUpdate::new(DEFAULT_FEED_ID, mantissa, 0, -2, publish_time as i64))
            .sign(&signers)
            .unwrap()
    }

    fn attest(&self, price: Decimal) -> Vec<u8> {
        use lendpool_rpc::Clock;
        self.attest_with(price, self.clock.now(), self.signers.len())
    }
}

fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

fn pool_error(result: Result<impl std::fmt::Debug, ServiceError>) -> PoolError {
    match result {
        Err(ServiceError::Pool(err)) => err,
        other => panic!("expected a pool error, got {:?}", other),
    }
}

/// Lender "alice" funds the pool with `liquidity`
async fn funded(h: &Harness, liquidity: Decimal) -> (PoolHandle, ReceiptId) {
    let handle = h.spawn(None);
    let deposit = handle
        .deposit("alice", None, amount(liquidity))
        .await
        .unwrap();
    (handle, deposit.receipt)
}

#[tokio::test]
async fn test_zero_deposit_rejected() {
    let h = Harness::new();
    let handle = h.spawn(None);

    let err = pool_error(handle.deposit("alice", None, Amount::ZERO).await);
    assert_eq!(err, PoolError::ZeroAmount);
    assert_eq!(handle.pool_totals().await.unwrap().total_deposited, Decimal::ZERO);
    assert!(handle.receipts_of("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deposit_then_full_withdraw_restores_pool() {
    let h = Harness::new();
    let (handle, receipt) = funded(&h, dec!(5000000)).await;

    let totals = handle.pool_totals().await.unwrap();
    assert_eq!(totals.total_deposited, dec!(5000000));
    match handle.position(receipt).await.unwrap() {
        Some(PositionView::Lender(p)) => assert_eq!(p.principal_deposited, dec!(5000000)),
        other => panic!("expected lender position, got {:?}", other),
    }

    let withdrawal = handle
        .withdraw("alice", receipt, amount(dec!(5000000)))
        .await
        .unwrap();
    assert_eq!(withdrawal.principal_paid, dec!(5000000));
    assert_eq!(withdrawal.yield_paid, Decimal::ZERO);
    assert_eq!(handle.pool_totals().await.unwrap().total_deposited, Decimal::ZERO);
    assert_eq!(
        handle.pending_yield(receipt).await.unwrap().unwrap_or_default(),
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_borrow_respects_initiation_ratio() {
    let h = Harness::new();
    let (handle, _) = funded(&h, dec!(5000000)).await;

    // 25 units at 50,000 is 125% of the borrow, but a health factor of 1.125
    let err = pool_error(
        handle
            .borrow("bob", None, amount(dec!(1000000)), amount(dec!(25)), h.attest(dec!(50000)))
            .await,
    );
    assert!(matches!(err, PoolError::UndercollateralizedBorrow { .. }));

    // 30 units at 50,000 = 150% of the borrow
    let outcome = handle
        .borrow("bob", None, amount(dec!(1000000)), amount(dec!(30)), h.attest(dec!(50000)))
        .await
        .unwrap();
    assert_eq!(outcome.collateral_ratio, dec!(1.5));
    assert_eq!(outcome.health_factor, dec!(1.35));
    assert!(outcome.health_factor >= h.config.risk.min_initiation_ratio);

    // 1.3M against 1.5M of collateral: health factor about 1.04
    let err = pool_error(
        handle
            .borrow(
                "bob",
                Some(outcome.receipt),
                amount(dec!(300000)),
                Amount::ZERO,
                h.attest(dec!(50000)),
            )
            .await,
    );
    assert!(matches!(err, PoolError::UndercollateralizedBorrow { .. }));
    assert_eq!(
        handle.current_debt(outcome.receipt).await.unwrap(),
        Some(dec!(1000000))
    );
}

#[tokio::test]
async fn test_stale_attestation_rejected_regardless_of_collateral() {
    let h = Harness::new();
    let (handle, _) = funded(&h, dec!(5000000)).await;

    let stale = h.attest_with(dec!(50000), T0 - 61, 3);
    let err = pool_error(
        handle
            .borrow("bob", None, amount(dec!(1)), amount(dec!(1000)), stale)
            .await,
    );
    assert!(matches!(err, PoolError::StalePrice { .. }));
    assert_eq!(handle.pool_totals().await.unwrap().total_borrowed, Decimal::ZERO);
}

#[tokio::test]
async fn test_quorum_unmet_rejected() {
    let h = Harness::new();
    let (handle, _) = funded(&h, dec!(5000000)).await;

    let weak = h.attest_with(dec!(50000), T0, 1);
    let err = pool_error(
        handle
            .borrow("bob", None, amount(dec!(1)), amount(dec!(1000)), weak)
            .await,
    );
    assert!(matches!(err, PoolError::InvalidSignature(_)));
}

#[tokio::test]
async fn test_bad_attestation_reported_before_receipt_check() {
    let h = Harness::new();
    let (handle, lender) = funded(&h, dec!(5000000)).await;

    // A lender receipt with a stale price: the price error wins
    let stale = h.attest_with(dec!(50000), T0 - 600, 3);
    let err = pool_error(
        handle
            .borrow("alice", Some(lender), amount(dec!(1)), amount(dec!(1)), stale)
            .await,
    );
    assert!(matches!(err, PoolError::StalePrice { .. }));

    let err = pool_error(
        handle
            .borrow("alice", Some(lender), amount(dec!(1)), amount(dec!(1)), h.attest(dec!(50000)))
            .await,
    );
    assert!(matches!(err, PoolError::ReceiptMismatch { .. }));
}

#[tokio::test]
async fn test_liquidation_caps_seizure_and_closes_position() {
    let h = Harness::new();
    let (handle, _) = funded(&h, dec!(5000000)).await;
    let borrowed = handle
        .borrow("bob", None, amount(dec!(1000000)), amount(dec!(30)), h.attest(dec!(50000)))
        .await
        .unwrap();

    // Healthy positions cannot be liquidated
    let err = pool_error(
        handle
            .liquidate("carol", borrowed.receipt, h.attest(dec!(50000)))
            .await,
    );
    assert!(matches!(err, PoolError::PositionHealthy { .. }));

    // Health factor just under 0.9
    let crash = dec!(33333.33);
    let seizure = handle
        .liquidate("carol", borrowed.receipt, h.attest(crash))
        .await
        .unwrap();
    assert!(seizure.health_factor < dec!(0.9));
    assert_eq!(seizure.collateral_seized, dec!(30));
    assert_eq!(seizure.debt_repaid, dec!(999999.90));
    assert_eq!(seizure.bad_debt, dec!(0.10));
    assert!(seizure.fully_settled);

    let totals = handle.pool_totals().await.unwrap();
    assert_eq!(totals.total_borrowed, Decimal::ZERO);
    assert_eq!(totals.total_collateral, Decimal::ZERO);
    assert_eq!(totals.bad_debt, dec!(0.10));

    let err = pool_error(
        handle
            .liquidate("carol", borrowed.receipt, h.attest(crash))
            .await,
    );
    assert_eq!(err, PoolError::NothingToLiquidate(borrowed.receipt));
}

#[tokio::test]
async fn test_interest_accrues_and_splits_between_lenders_and_protocol() {
    let h = Harness::new();
    let (handle, lender) = funded(&h, dec!(1000000)).await;
    let borrowed = handle
        .borrow("bob", None, amount(dec!(500000)), amount(dec!(20)), h.attest(dec!(50000)))
        .await
        .unwrap();

    h.clock.advance(30 * 24 * 3600);

    let debt = handle.current_debt(borrowed.receipt).await.unwrap().unwrap();
    let pending = handle.pending_yield(lender).await.unwrap().unwrap();
    let totals = handle.pool_totals().await.unwrap();
    let interest = debt - dec!(500000);

    assert!(interest > Decimal::ZERO);
    assert!(pending > Decimal::ZERO);
    assert!(totals.protocol_fee_accrued > Decimal::ZERO);
    assert!((interest - pending - totals.protocol_fee_accrued).abs() < dec!(0.000001));
    // Totals track principal only
    assert_eq!(totals.total_borrowed, dec!(500000));

    // Reads do not advance stored state
    assert_eq!(handle.current_debt(borrowed.receipt).await.unwrap(), Some(debt));

    // Full repayment returns change and releases the collateral
    let repayment = handle
        .repay("bob", borrowed.receipt, amount(debt + dec!(1)))
        .await
        .unwrap();
    assert_eq!(repayment.debt_repaid(), debt);
    assert_eq!(repayment.change, dec!(1));
    assert_eq!(repayment.collateral_released, dec!(20));

    let withdrawal = handle
        .withdraw("alice", lender, amount(pending))
        .await
        .unwrap();
    assert_eq!(withdrawal.yield_paid, pending);
    assert_eq!(withdrawal.principal_paid, Decimal::ZERO);
}

#[tokio::test]
async fn test_yield_is_paid_only_from_collected_interest() {
    let h = Harness::new();
    let (handle, lender) = funded(&h, dec!(2000000)).await;
    let borrowed = handle
        .borrow("bob", None, amount(dec!(1000000)), amount(dec!(30)), h.attest(dec!(50000)))
        .await
        .unwrap();

    h.clock.advance(lendpool_ledger::SECONDS_PER_YEAR);
    let pending = handle.pending_yield(lender).await.unwrap().unwrap();
    assert_eq!(pending, dec!(40500));

    // Nothing repaid yet: the whole claim is not there to pay out
    let err = pool_error(
        handle
            .withdraw("alice", lender, amount(dec!(2000000) + pending))
            .await,
    );
    assert!(matches!(err, PoolError::InsufficientLiquidity { .. }));

    let first = handle
        .withdraw("alice", lender, amount(dec!(1000000)))
        .await
        .unwrap();
    assert_eq!(first.yield_paid, Decimal::ZERO);
    let err = pool_error(handle.withdraw("alice", lender, amount(dec!(1))).await);
    assert!(matches!(err, PoolError::InsufficientLiquidity { .. }));

    let debt = handle.current_debt(borrowed.receipt).await.unwrap().unwrap();
    let repayment = handle
        .repay("bob", borrowed.receipt, amount(debt))
        .await
        .unwrap();
    let second = handle
        .withdraw("alice", lender, amount(dec!(1000000) + pending))
        .await
        .unwrap();
    assert_eq!(second.yield_paid, pending);

    let paid_out = first.total() + second.total();
    let cash_in = dec!(2000000) - borrowed.borrowed + repayment.debt_repaid();
    assert!(paid_out <= cash_in);
    assert_eq!(
        handle.pool_totals().await.unwrap().interest_reserve,
        cash_in - paid_out
    );
}

#[tokio::test]
async fn test_overflowing_amounts_do_not_stop_the_service() {
    let h = Harness::new();
    let (handle, _) = funded(&h, dec!(5000000)).await;

    let err = pool_error(
        handle
            .borrow(
                "bob",
                None,
                amount(Decimal::new(1, 28)),
                amount(dec!(1000)),
                h.attest(dec!(50000)),
            )
            .await,
    );
    assert!(matches!(err, PoolError::ArithmeticOverflow(_)));

    let err = pool_error(handle.deposit("dave", None, amount(Decimal::MAX)).await);
    assert_eq!(err, PoolError::ArithmeticOverflow("total deposited"));

    // The service is still up and nothing moved
    let deposit = handle
        .deposit("erin", None, amount(dec!(100)))
        .await
        .unwrap();
    assert_eq!(deposit.total_deposited, dec!(5000100));
    assert_eq!(handle.pool_totals().await.unwrap().total_borrowed, Decimal::ZERO);
}

#[tokio::test]
async fn test_failed_operations_leave_state_unchanged() {
    let h = Harness::new();
    let (handle, lender) = funded(&h, dec!(1000000)).await;
    let borrowed = handle
        .borrow("bob", None, amount(dec!(500000)), amount(dec!(20)), h.attest(dec!(50000)))
        .await
        .unwrap();
    let before = handle.snapshot().await.unwrap();

    let failures = [
        pool_error(handle.withdraw("alice", lender, amount(dec!(2000000))).await),
        pool_error(handle.withdraw("alice", lender, amount(dec!(600000))).await),
        pool_error(handle.withdraw("mallory", lender, amount(dec!(1))).await),
        pool_error(handle.repay("bob", borrowed.receipt, amount(dec!(1))).await),
        pool_error(
            handle
                .withdraw_collateral("bob", borrowed.receipt, amount(dec!(15)), h.attest(dec!(50000)))
                .await,
        ),
    ];
    assert!(matches!(failures[0], PoolError::InsufficientBalance { .. }));
    assert!(matches!(failures[1], PoolError::InsufficientLiquidity { .. }));
    assert!(matches!(failures[2], PoolError::ReceiptMismatch { .. }));
    assert!(matches!(failures[3], PoolError::InsufficientRepayment { .. }));
    assert!(matches!(failures[4], PoolError::UndercollateralizedBorrow { .. }));

    assert_eq!(handle.snapshot().await.unwrap(), before);
}

#[tokio::test]
async fn test_receipt_transfer_moves_control() {
    let h = Harness::new();
    let (handle, _) = funded(&h, dec!(1000000)).await;
    let borrowed = handle
        .borrow("bob", None, amount(dec!(1000)), amount(dec!(1)), h.attest(dec!(50000)))
        .await
        .unwrap();

    handle
        .transfer_receipt("bob", borrowed.receipt, "carol")
        .await
        .unwrap();

    let err = pool_error(handle.repay("bob", borrowed.receipt, amount(dec!(1000))).await);
    assert!(matches!(err, PoolError::ReceiptMismatch { .. }));

    let repayment = handle
        .repay("carol", borrowed.receipt, amount(dec!(1000)))
        .await
        .unwrap();
    assert_eq!(repayment.collateral_released, dec!(1));
    assert_eq!(handle.receipts_of("carol").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_service_serializes_concurrent_callers() {
    let h = Harness::new();
    let dir = TempDir::new().unwrap();
    let pool = h.config.build_pool().unwrap();
    let (handle, task) = PoolService::spawn(
        pool,
        h.clock.clone(),
        Some(EventStore::open(dir.path()).unwrap()),
    );

    let mut joins = Vec::new();
    for i in 0..20 {
        let handle = handle.clone();
        joins.push(tokio::spawn(async move {
            handle
                .deposit(&format!("lender-{}", i), None, Amount::from_units(100))
                .await
        }));
    }
    for join in joins {
        join.await.unwrap().unwrap();
    }

    assert_eq!(handle.pool_totals().await.unwrap().total_deposited, dec!(2000));
    drop(handle);

    let pool = task.await.unwrap();
    assert_eq!(pool.ledger().lender_count(), 20);
    assert_eq!(EventReader::from_directory(dir.path()).unwrap().audit().unwrap(), 20);
}

#[tokio::test]
async fn test_closed_service_reports_closed() {
    let h = Harness::new();
    let pool = h.config.build_pool().unwrap();
    let (handle, task) = PoolService::spawn(pool, h.clock.clone(), None);
    task.abort();
    let _ = task.await;

    let result = handle.deposit("alice", None, Amount::from_units(1)).await;
    assert_eq!(result.unwrap_err(), ServiceError::Closed);
}

#[test]
fn test_journal_detects_tampering() {
    let h = Harness::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = AppContext::init(dir.path(), h.config.clone()).unwrap();

    for value in [dec!(100), dec!(250)] {
        ctx.pool.deposit("alice", None, amount(value), T0).unwrap();
        ctx.commit(T0).unwrap();
    }
    assert_eq!(ctx.audit().unwrap(), 2);

    let journal = EventReader::from_directory(ctx.journal_path()).unwrap();
    let file = journal.files()[0].clone();
    let content = std::fs::read_to_string(&file).unwrap();
    let tampered = content.replacen("\"amount\":\"100\"", "\"amount\":\"900\"", 1);
    assert_ne!(content, tampered);
    std::fs::write(&file, tampered).unwrap();

    assert!(ctx.audit().is_err());
}

#[test]
fn test_config_rejects_initiation_at_or_below_liquidation_point() {
    let h = Harness::new();
    let mut config = h.config.clone();
    config.risk.min_initiation_ratio = dec!(0.95);
    config.risk.liquidation_threshold = dec!(0.9);
    assert!(config.validate().is_err());

    config.risk.min_initiation_ratio = dec!(1.2);
    assert!(config.validate().is_ok());
}
