//! CLI commands

use anyhow::{bail, Context};
use lendpool_core::{Amount, ReceiptId, Timestamp};
use lendpool_oracle::{AttestationBuilder, AttestationSigner, FeedId, PriceUpdate};
use rust_decimal::Decimal;
use std::path::Path;

use crate::config::PoolConfig;
use crate::context::AppContext;
use crate::pool::PositionView;

/// Create a new pool data directory
pub fn init(data_path: &Path, config: PoolConfig) -> Result<(), anyhow::Error> {
    let ctx = AppContext::init(data_path, config)?;
    let oracle = &ctx.config().oracle;
    println!("✅ Pool initialized at {}", ctx.data_path().display());
    println!(
        "   feed {} | {} trust anchors (set {}) | max staleness {}s",
        oracle.feed_id,
        oracle.trust_anchors.len(),
        oracle.trust_set_index,
        oracle.max_staleness_secs
    );
    Ok(())
}

/// Generate trust-anchor signing keys
pub fn keygen(count: u8) -> Result<(), anyhow::Error> {
    if count == 0 {
        bail!("Key count must be at least 1");
    }
    for index in 0..count {
        let signer = AttestationSigner::generate(index);
        println!("signer {}", index);
        println!("  public: {}", signer.public_key_hex());
        println!("  seed:   {}", signer.seed_hex());
    }
    println!();
    println!("Put the public keys in [oracle].trust_anchors, in signer order.");
    println!("Keep the seeds secret; `lendpool attest` needs them.");
    Ok(())
}

/// Arguments for `attest`
pub struct AttestArgs<'a> {
    pub seeds: &'a [String],
    pub trust_set_index: u32,
    pub feed_id: FeedId,
    pub price: Decimal,
    pub confidence: Decimal,
    pub publish_time: Timestamp,
}

/// Build a signed attestation and print it as hex
pub fn attest(args: AttestArgs<'_>) -> Result<String, anyhow::Error> {
    let (mantissa, exponent, confidence) = to_mantissa(args.price, args.confidence)?;

    let signers = args
        .seeds
        .iter()
        .enumerate()
        .map(|(index, seed)| {
            let index = u8::try_from(index).context("at most 256 signers")?;
            AttestationSigner::from_hex(index, seed)
                .with_context(|| format!("invalid seed for signer {}", index))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&AttestationSigner> = signers.iter().collect();

    let publish_time = i64::try_from(args.publish_time).context("publish time out of range")?;
    let raw = AttestationBuilder::new(args.trust_set_index)
        .emitted_at(args.publish_time)
        .update(PriceUpdate::new(
            args.feed_id,
            mantissa,
            confidence,
            exponent,
            publish_time,
        ))
        .sign(&refs)?;

    Ok(hex::encode(raw))
}

/// Price and confidence as integer mantissas sharing one exponent
fn to_mantissa(price: Decimal, confidence: Decimal) -> Result<(i64, i32, u64), anyhow::Error> {
    let price = price.normalize();
    let scale = price.scale().max(confidence.normalize().scale());

    let mut scaled_price = price;
    scaled_price.rescale(scale);
    let mut scaled_conf = confidence;
    scaled_conf.rescale(scale);

    let mantissa = i64::try_from(scaled_price.mantissa()).context("price does not fit the wire format")?;
    let conf = u64::try_from(scaled_conf.mantissa()).context("confidence must be non-negative")?;
    Ok((mantissa, -(scale as i32), conf))
}

pub fn deposit(
    ctx: &mut AppContext,
    user: &str,
    receipt: Option<ReceiptId>,
    amount: Decimal,
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let amount = Amount::new(amount)?;
    let outcome = ctx.pool.deposit(user, receipt, amount, now)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Deposited {} for {} (receipt: {}, seq: {})",
        amount,
        user,
        outcome.receipt,
        last_sequence(&records)
    );
    println!("   Pool deposits: {}", outcome.total_deposited);
    Ok(())
}

pub fn withdraw(
    ctx: &mut AppContext,
    user: &str,
    receipt: ReceiptId,
    amount: Decimal,
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let amount = Amount::new(amount)?;
    let withdrawal = ctx.pool.withdraw(user, receipt, amount, now)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Withdrew {} for {} (seq: {})",
        withdrawal.total(),
        user,
        last_sequence(&records)
    );
    println!(
        "   Yield: {} | Principal: {}",
        withdrawal.yield_paid, withdrawal.principal_paid
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn borrow(
    ctx: &mut AppContext,
    user: &str,
    receipt: Option<ReceiptId>,
    amount: Decimal,
    collateral: Decimal,
    attestation: &[u8],
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let amount = Amount::new(amount)?;
    let collateral = Amount::new(collateral)?;
    let outcome = ctx
        .pool
        .borrow(user, receipt, amount, collateral, attestation, now)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Borrowed {} for {} (receipt: {}, seq: {})",
        outcome.borrowed,
        user,
        outcome.receipt,
        last_sequence(&records)
    );
    println!(
        "   Debt: {} | Collateral: {} @ {}",
        outcome.debt, outcome.collateral_posted, outcome.price
    );
    println!(
        "   Collateral ratio: {} | Health factor: {}",
        outcome.collateral_ratio.round_dp(4),
        outcome.health_factor.round_dp(4)
    );
    Ok(())
}

pub fn add_collateral(
    ctx: &mut AppContext,
    user: &str,
    receipt: ReceiptId,
    amount: Decimal,
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let amount = Amount::new(amount)?;
    let posted = ctx.pool.add_collateral(user, receipt, amount, now)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Added {} collateral to {} (seq: {})",
        amount,
        receipt,
        last_sequence(&records)
    );
    println!("   Posted collateral: {}", posted);
    Ok(())
}

pub fn withdraw_collateral(
    ctx: &mut AppContext,
    user: &str,
    receipt: ReceiptId,
    amount: Decimal,
    attestation: &[u8],
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let amount = Amount::new(amount)?;
    let remaining = ctx
        .pool
        .withdraw_collateral(user, receipt, amount, attestation, now)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Released {} collateral from {} (seq: {})",
        amount,
        receipt,
        last_sequence(&records)
    );
    println!("   Posted collateral: {}", remaining);
    Ok(())
}

pub fn repay(
    ctx: &mut AppContext,
    user: &str,
    receipt: ReceiptId,
    payment: Decimal,
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let payment = Amount::new(payment)?;
    let repayment = ctx.pool.repay(user, receipt, payment, now)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Repaid {} on {} (seq: {})",
        repayment.debt_repaid(),
        receipt,
        last_sequence(&records)
    );
    println!(
        "   Interest: {} | Principal: {} | Change: {}",
        repayment.interest_repaid, repayment.principal_repaid, repayment.change
    );
    println!("   Collateral released: {}", repayment.collateral_released);
    Ok(())
}

pub fn liquidate(
    ctx: &mut AppContext,
    liquidator: &str,
    receipt: ReceiptId,
    attestation: &[u8],
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let result = ctx.pool.liquidate(liquidator, receipt, attestation, now)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Liquidated {} at {} (health factor {}, seq: {})",
        receipt,
        result.price,
        result.health_factor.round_dp(4),
        last_sequence(&records)
    );
    println!(
        "   Debt repaid: {} | Collateral seized: {} | Returned: {}",
        result.debt_repaid, result.collateral_seized, result.collateral_returned
    );
    println!(
        "   Fee: {} | Liquidator bonus: {}",
        result.liquidation_fee, result.liquidator_bonus
    );
    if !result.bad_debt.is_zero() {
        println!("   ⚠️  Bad debt: {}", result.bad_debt);
    }
    if result.fully_settled {
        println!("   Position closed");
    }
    Ok(())
}

pub fn transfer_receipt(
    ctx: &mut AppContext,
    from: &str,
    receipt: ReceiptId,
    to: &str,
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    ctx.pool.transfer_receipt(from, receipt, to)?;
    let records = ctx.commit(now)?;

    println!(
        "✅ Transferred receipt {} from {} to {} (seq: {})",
        receipt,
        from,
        to,
        last_sequence(&records)
    );
    Ok(())
}

/// Pool totals, rates and counts
pub fn status(ctx: &AppContext, now: Timestamp) -> Result<(), anyhow::Error> {
    let pool = ctx.pool.pool_totals(now)?;
    let (utilization, rate) = ctx.pool.rates(now)?;
    let ledger = ctx.pool.ledger();

    println!("📊 Pool status");
    println!("   Deposited:        {}", pool.total_deposited);
    println!("   Borrowed:         {}", pool.total_borrowed);
    println!("   Available:        {}", pool.available_liquidity());
    println!("   Collateral:       {}", pool.total_collateral);
    println!("   Utilization:      {}%", (utilization * Decimal::ONE_HUNDRED).round_dp(2));
    println!("   Borrow rate:      {}%", (rate * Decimal::ONE_HUNDRED).round_dp(2));
    println!("   Lender yield:     {}", pool.cumulative_interest_yield.round_dp(8));
    println!("   Protocol fees:    {}", pool.protocol_fee_accrued.round_dp(8));
    println!("   Interest held:    {}", pool.interest_reserve.round_dp(8));
    println!("   Bad debt:         {}", pool.bad_debt);
    println!(
        "   Positions:        {} lenders, {} borrowers",
        ledger.lender_count(),
        ledger.borrower_count()
    );
    println!("   Journal sequence: {}", ctx.last_sequence());
    Ok(())
}

/// One position, accrued to now. With an attestation, also its health factor.
pub fn position(
    ctx: &AppContext,
    receipt: ReceiptId,
    attestation: Option<&[u8]>,
    now: Timestamp,
) -> Result<(), anyhow::Error> {
    let Some(view) = ctx.pool.position(&receipt, now)? else {
        bail!("No open position for receipt {}", receipt);
    };
    let owner = ctx
        .pool
        .receipt(&receipt)
        .map_or("-", |r| r.owner.as_str());

    match view {
        PositionView::Lender(p) => {
            println!("💰 Lender position {} (owner {})", receipt, owner);
            println!("   Principal:     {}", p.principal_deposited);
            println!("   Pending yield: {}", p.pending_yield.round_dp(8));
        }
        PositionView::Borrower(p) => {
            println!("🏦 Borrower position {} (owner {})", receipt, owner);
            println!("   Principal:  {}", p.principal_borrowed);
            println!("   Interest:   {}", p.accrued_interest.round_dp(8));
            println!("   Debt:       {}", p.debt().round_dp(8));
            println!("   Collateral: {}", p.collateral_posted);
            if let Some(raw) = attestation {
                if let Some(hf) = ctx.pool.health_factor(&receipt, raw, now)? {
                    println!("   Health factor: {}", hf.round_dp(4));
                }
            }
        }
    }
    Ok(())
}

/// Re-verify the journal hash chain
pub fn audit(ctx: &AppContext) -> Result<(), anyhow::Error> {
    println!("🔍 Auditing journal at {}...", ctx.journal_path().display());
    let count = ctx.audit()?;
    println!("✅ Hash chain verified ({} records)", count);
    Ok(())
}

/// Read an attestation: a file holding hex, or hex given inline
pub fn read_attestation(source: &str) -> Result<Vec<u8>, anyhow::Error> {
    let path = Path::new(source);
    let text = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read attestation file {}", path.display()))?
    } else {
        source.to_string()
    };
    hex::decode(text.trim()).context("attestation must be hex encoded")
}

fn last_sequence(records: &[lendpool_events::EventRecord]) -> u64 {
    records.last().map_or(0, |r| r.sequence)
}
