//! Pool service - single-writer command loop
//!
//! One task owns the `LendingPool` and processes commands from an mpsc
//! channel, replying on a oneshot per command. Reads travel through the same
//! loop, so no caller ever observes a half-applied operation.

use chrono::{DateTime, Utc};
use lendpool_core::{Amount, PoolError, ReceiptId, Timestamp};
use lendpool_events::EventStore;
use lendpool_ledger::{PoolState, ReceiptRecord, Repayment, Withdrawal};
use lendpool_risk::{BorrowOutcome, SeizureResult};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::pool::{DepositOutcome, LendingPool, PoolSnapshot, PositionView};

const COMMAND_BUFFER: usize = 64;

/// Source of operation timestamps (unix seconds)
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Clock moved by hand, for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Pool service is closed")]
    Closed,
}

type Reply<T> = oneshot::Sender<Result<T, PoolError>>;

enum Command {
    Deposit {
        caller: String,
        receipt: Option<ReceiptId>,
        amount: Amount,
        reply: Reply<DepositOutcome>,
    },
    Withdraw {
        caller: String,
        receipt: ReceiptId,
        amount: Amount,
        reply: Reply<Withdrawal>,
    },
    Borrow {
        caller: String,
        receipt: Option<ReceiptId>,
        amount: Amount,
        collateral: Amount,
        attestation: Vec<u8>,
        reply: Reply<BorrowOutcome>,
    },
    AddCollateral {
        caller: String,
        receipt: ReceiptId,
        amount: Amount,
        reply: Reply<Decimal>,
    },
    WithdrawCollateral {
        caller: String,
        receipt: ReceiptId,
        amount: Amount,
        attestation: Vec<u8>,
        reply: Reply<Decimal>,
    },
    Repay {
        caller: String,
        receipt: ReceiptId,
        payment: Amount,
        reply: Reply<Repayment>,
    },
    Liquidate {
        liquidator: String,
        receipt: ReceiptId,
        attestation: Vec<u8>,
        reply: Reply<SeizureResult>,
    },
    TransferReceipt {
        caller: String,
        receipt: ReceiptId,
        to: String,
        reply: Reply<()>,
    },
    PoolTotals {
        reply: Reply<PoolState>,
    },
    CurrentDebt {
        receipt: ReceiptId,
        reply: Reply<Option<Decimal>>,
    },
    PendingYield {
        receipt: ReceiptId,
        reply: Reply<Option<Decimal>>,
    },
    Position {
        receipt: ReceiptId,
        reply: Reply<Option<PositionView>>,
    },
    HealthFactor {
        receipt: ReceiptId,
        attestation: Vec<u8>,
        reply: Reply<Option<Decimal>>,
    },
    Rates {
        reply: Reply<(Decimal, Decimal)>,
    },
    Receipts {
        owner: String,
        reply: oneshot::Sender<Vec<ReceiptRecord>>,
    },
    Snapshot {
        reply: oneshot::Sender<PoolSnapshot>,
    },
}

/// The task that owns the pool
pub struct PoolService {
    pool: LendingPool,
    clock: Arc<dyn Clock>,
    journal: Option<EventStore>,
}

impl PoolService {
    /// Start the command loop. The task ends, handing the pool back, once
    /// every `PoolHandle` has been dropped.
    pub fn spawn(
        pool: LendingPool,
        clock: Arc<dyn Clock>,
        journal: Option<EventStore>,
    ) -> (PoolHandle, JoinHandle<LendingPool>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let service = Self {
            pool,
            clock,
            journal,
        };
        let task = tokio::spawn(service.run(rx));
        (PoolHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) -> LendingPool {
        info!("pool service started");
        while let Some(command) = rx.recv().await {
            let now = self.clock.now();
            self.handle(command, now);
            self.flush_journal(now);
        }
        if let Some(journal) = self.journal.as_mut() {
            if let Err(err) = journal.close() {
                error!(error = %err, "failed to close journal");
            }
        }
        info!("pool service stopped");
        self.pool
    }

    fn handle(&mut self, command: Command, now: Timestamp) {
        let pool = &mut self.pool;
        // A dropped receiver means the caller gave up; the result is discarded
        match command {
            Command::Deposit {
                caller,
                receipt,
                amount,
                reply,
            } => {
                let _ = reply.send(pool.deposit(&caller, receipt, amount, now));
            }
            Command::Withdraw {
                caller,
                receipt,
                amount,
                reply,
            } => {
                let _ = reply.send(pool.withdraw(&caller, receipt, amount, now));
            }
            Command::Borrow {
                caller,
                receipt,
                amount,
                collateral,
                attestation,
                reply,
            } => {
                let _ = reply.send(pool.borrow(&caller, receipt, amount, collateral, &attestation, now));
            }
            Command::AddCollateral {
                caller,
                receipt,
                amount,
                reply,
            } => {
                let _ = reply.send(pool.add_collateral(&caller, receipt, amount, now));
            }
            Command::WithdrawCollateral {
                caller,
                receipt,
                amount,
                attestation,
                reply,
            } => {
                let _ = reply.send(pool.withdraw_collateral(&caller, receipt, amount, &attestation, now));
            }
            Command::Repay {
                caller,
                receipt,
                payment,
                reply,
            } => {
                let _ = reply.send(pool.repay(&caller, receipt, payment, now));
            }
            Command::Liquidate {
                liquidator,
                receipt,
                attestation,
                reply,
            } => {
                let _ = reply.send(pool.liquidate(&liquidator, receipt, &attestation, now));
            }
            Command::TransferReceipt {
                caller,
                receipt,
                to,
                reply,
            } => {
                let _ = reply.send(pool.transfer_receipt(&caller, receipt, &to));
            }
            Command::PoolTotals { reply } => {
                let _ = reply.send(pool.pool_totals(now));
            }
            Command::CurrentDebt { receipt, reply } => {
                let _ = reply.send(pool.current_debt(&receipt, now));
            }
            Command::PendingYield { receipt, reply } => {
                let _ = reply.send(pool.pending_yield(&receipt, now));
            }
            Command::Position { receipt, reply } => {
                let _ = reply.send(pool.position(&receipt, now));
            }
            Command::HealthFactor {
                receipt,
                attestation,
                reply,
            } => {
                let _ = reply.send(pool.health_factor(&receipt, &attestation, now));
            }
            Command::Rates { reply } => {
                let _ = reply.send(pool.rates(now));
            }
            Command::Receipts { owner, reply } => {
                let _ = reply.send(pool.receipts_of(&owner));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(pool.snapshot());
            }
        }
    }

    /// Append events from the last command to the journal. The pool state is
    /// already committed, so a journal failure is logged rather than undone.
    /// Without a journal, events stay queued in the pool for its next owner.
    fn flush_journal(&mut self, now: Timestamp) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        let events = self.pool.drain_events();
        let timestamp = DateTime::<Utc>::from_timestamp(now as i64, 0).unwrap_or_default();
        for event in events {
            let kind = event.kind();
            match journal.append(timestamp, event) {
                Ok(record) => debug!(sequence = record.sequence, kind, "event journaled"),
                Err(err) => error!(kind, error = %err, "failed to journal event"),
            }
        }
    }
}

/// Cloneable client of a running `PoolService`
#[derive(Clone)]
pub struct PoolHandle {
    tx: mpsc::Sender<Command>,
}

impl PoolHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    async fn operation<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ServiceError> {
        Ok(self.request(make).await??)
    }

    pub async fn deposit(
        &self,
        caller: &str,
        receipt: Option<ReceiptId>,
        amount: Amount,
    ) -> Result<DepositOutcome, ServiceError> {
        self.operation(|reply| Command::Deposit {
            caller: caller.to_string(),
            receipt,
            amount,
            reply,
        })
        .await
    }

    pub async fn withdraw(
        &self,
        caller: &str,
        receipt: ReceiptId,
        amount: Amount,
    ) -> Result<Withdrawal, ServiceError> {
        self.operation(|reply| Command::Withdraw {
            caller: caller.to_string(),
            receipt,
            amount,
            reply,
        })
        .await
    }

    pub async fn borrow(
        &self,
        caller: &str,
        receipt: Option<ReceiptId>,
        amount: Amount,
        collateral: Amount,
        attestation: Vec<u8>,
    ) -> Result<BorrowOutcome, ServiceError> {
        self.operation(|reply| Command::Borrow {
            caller: caller.to_string(),
            receipt,
            amount,
            collateral,
            attestation,
            reply,
        })
        .await
    }

    pub async fn add_collateral(
        &self,
        caller: &str,
        receipt: ReceiptId,
        amount: Amount,
    ) -> Result<Decimal, ServiceError> {
        self.operation(|reply| Command::AddCollateral {
            caller: caller.to_string(),
            receipt,
            amount,
            reply,
        })
        .await
    }

    pub async fn withdraw_collateral(
        &self,
        caller: &str,
        receipt: ReceiptId,
        amount: Amount,
        attestation: Vec<u8>,
    ) -> Result<Decimal, ServiceError> {
        self.operation(|reply| Command::WithdrawCollateral {
            caller: caller.to_string(),
            receipt,
            amount,
            attestation,
            reply,
        })
        .await
    }

    pub async fn repay(
        &self,
        caller: &str,
        receipt: ReceiptId,
        payment: Amount,
    ) -> Result<Repayment, ServiceError> {
        self.operation(|reply| Command::Repay {
            caller: caller.to_string(),
            receipt,
            payment,
            reply,
        })
        .await
    }

    pub async fn liquidate(
        &self,
        liquidator: &str,
        receipt: ReceiptId,
        attestation: Vec<u8>,
    ) -> Result<SeizureResult, ServiceError> {
        self.operation(|reply| Command::Liquidate {
            liquidator: liquidator.to_string(),
            receipt,
            attestation,
            reply,
        })
        .await
    }

    pub async fn transfer_receipt(
        &self,
        caller: &str,
        receipt: ReceiptId,
        to: &str,
    ) -> Result<(), ServiceError> {
        self.operation(|reply| Command::TransferReceipt {
            caller: caller.to_string(),
            receipt,
            to: to.to_string(),
            reply,
        })
        .await
    }

    pub async fn pool_totals(&self) -> Result<PoolState, ServiceError> {
        self.operation(|reply| Command::PoolTotals { reply }).await
    }

    pub async fn current_debt(&self, receipt: ReceiptId) -> Result<Option<Decimal>, ServiceError> {
        self.operation(|reply| Command::CurrentDebt { receipt, reply })
            .await
    }

    pub async fn pending_yield(&self, receipt: ReceiptId) -> Result<Option<Decimal>, ServiceError> {
        self.operation(|reply| Command::PendingYield { receipt, reply })
            .await
    }

    pub async fn position(&self, receipt: ReceiptId) -> Result<Option<PositionView>, ServiceError> {
        self.operation(|reply| Command::Position { receipt, reply }).await
    }

    pub async fn health_factor(
        &self,
        receipt: ReceiptId,
        attestation: Vec<u8>,
    ) -> Result<Option<Decimal>, ServiceError> {
        self.operation(|reply| Command::HealthFactor {
            receipt,
            attestation,
            reply,
        })
        .await
    }

    /// Utilization and annual borrow rate
    pub async fn rates(&self) -> Result<(Decimal, Decimal), ServiceError> {
        self.operation(|reply| Command::Rates { reply }).await
    }

    pub async fn receipts_of(&self, owner: &str) -> Result<Vec<ReceiptRecord>, ServiceError> {
        self.request(|reply| Command::Receipts {
            owner: owner.to_string(),
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<PoolSnapshot, ServiceError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }
}
