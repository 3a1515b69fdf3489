//! Credit ledger with Redis backend.
//!
//! `credits:{identity}` holds the balance and `credits:{identity}:tx` the
//! transaction list, newest first. Entries are only ever pushed.

use std::sync::LazyLock;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use questline_common::constants::redis_keys;
use questline_common::{CreditTransaction, Identity, QuestlineError, TransactionKind};

/// Balance key for an identity storage key
pub fn balance_key(identity: &str) -> String {
    format!("{}{}", redis_keys::CREDITS_PREFIX, identity)
}

/// Transaction list key for an identity storage key
pub fn transactions_key(identity: &str) -> String {
    format!("{}{}:tx", redis_keys::CREDITS_PREFIX, identity)
}

/// Credit ledger service
#[derive(Clone)]
pub struct CreditLedger {
    redis: ConnectionManager,
}

impl CreditLedger {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Current balance (0 for an unknown identity)
    pub async fn balance(&self, identity: &Identity) -> Result<i64, QuestlineError> {
        let mut conn = self.redis.clone();
        let balance: Option<i64> = conn
            .get(balance_key(&identity.storage_key()))
            .await
            .map_err(store_err)?;
        Ok(balance.unwrap_or(0))
    }

    /// Most recent transactions, newest first
    pub async fn recent_transactions(
        &self,
        identity: &Identity,
        limit: u32,
    ) -> Result<Vec<CreditTransaction>, QuestlineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let raw: Vec<String> = conn
            .lrange(
                transactions_key(&identity.storage_key()),
                0,
                limit as isize - 1,
            )
            .await
            .map_err(store_err)?;

        raw.iter()
            .map(|entry| {
                serde_json::from_str(entry)
                    .map_err(|e| QuestlineError::Internal(format!("corrupt transaction: {}", e)))
            })
            .collect()
    }

    /// Apply a manual adjustment and return the new balance
    pub async fn adjust(
        &self,
        identity: &Identity,
        amount: i64,
        description: &str,
        now: i64,
    ) -> Result<i64, QuestlineError> {
        self.credit(identity, TransactionKind::Adjustment, amount, description, None, now)
            .await
    }

    /// Record bought credits and return the new balance
    pub async fn purchase(
        &self,
        identity: &Identity,
        amount: i64,
        description: &str,
        reference_id: Option<u64>,
        now: i64,
    ) -> Result<i64, QuestlineError> {
        self.credit(identity, TransactionKind::Purchase, amount, description, reference_id, now)
            .await
    }

    /// Give back credits taken by an earlier spend
    pub async fn refund(
        &self,
        identity: &Identity,
        amount: i64,
        description: &str,
        reference_id: Option<u64>,
        now: i64,
    ) -> Result<i64, QuestlineError> {
        self.credit(identity, TransactionKind::Refund, amount, description, reference_id, now)
            .await
    }

    /// Take `cost` credits if the balance covers it.
    ///
    /// The balance check and the debit run as one script, so concurrent
    /// spends never take the balance below zero.
    pub async fn spend(
        &self,
        identity: &Identity,
        cost: i64,
        description: &str,
        reference_id: Option<u64>,
        now: i64,
    ) -> Result<i64, QuestlineError> {
        if cost <= 0 {
            return Err(QuestlineError::InvalidInput(
                "Spend amount must be positive.".to_string(),
            ));
        }

        let mut conn = self.redis.clone();
        let id: u64 = conn
            .incr(redis_keys::TRANSACTION_SEQ, 1)
            .await
            .map_err(store_err)?;

        let identity_key = identity.storage_key();
        let tx = CreditTransaction {
            id,
            identity: identity_key.clone(),
            kind: TransactionKind::Spend,
            amount: -cost,
            description: description.trim().to_string(),
            reference_id,
            created_at: now,
        };

        let (applied, balance): (i64, i64) = SPEND_SCRIPT
            .key(balance_key(&identity_key))
            .key(transactions_key(&identity_key))
            .arg(cost)
            .arg(encode_entry(&tx)?)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        let new_balance = spend_outcome(applied, balance, cost)?;
        tracing::info!(identity = %identity, cost, new_balance, "Credits spent");
        Ok(new_balance)
    }

    async fn credit(
        &self,
        identity: &Identity,
        kind: TransactionKind,
        amount: i64,
        description: &str,
        reference_id: Option<u64>,
        now: i64,
    ) -> Result<i64, QuestlineError> {
        check_amount(kind, amount)?;

        let mut conn = self.redis.clone();
        let id: u64 = conn
            .incr(redis_keys::TRANSACTION_SEQ, 1)
            .await
            .map_err(store_err)?;

        let tx = CreditTransaction {
            id,
            identity: identity.storage_key(),
            kind,
            amount,
            description: description.trim().to_string(),
            reference_id,
            created_at: now,
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        Self::stage_credit(&mut pipe, &tx)?;
        let (new_balance,): (i64,) = pipe.query_async(&mut conn).await.map_err(store_err)?;

        tracing::info!(
            identity = %identity,
            ?kind,
            amount,
            new_balance,
            "Credit balance changed"
        );

        Ok(new_balance)
    }

    /// Queue a transaction on `pipe`.
    ///
    /// Adds exactly one non-ignored reply to the pipeline: the balance after
    /// the transaction is applied.
    pub fn stage_credit(
        pipe: &mut redis::Pipeline,
        tx: &CreditTransaction,
    ) -> Result<(), QuestlineError> {
        let entry = encode_entry(tx)?;

        pipe.incr(balance_key(&tx.identity), tx.amount)
            .lpush(transactions_key(&tx.identity), entry)
            .ignore();

        Ok(())
    }
}

/// KEYS: balance, transaction list. ARGV: cost, encoded entry.
/// Replies `{applied, balance}`; nothing is written when `applied` is 0.
static SPEND_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local balance = tonumber(redis.call('GET', KEYS[1]) or '0')
local cost = tonumber(ARGV[1])
if balance < cost then
    return {0, balance}
end
local remaining = redis.call('DECRBY', KEYS[1], cost)
redis.call('LPUSH', KEYS[2], ARGV[2])
return {1, remaining}
",
    )
});

fn spend_outcome(applied: i64, balance: i64, cost: i64) -> Result<i64, QuestlineError> {
    if applied == 0 {
        return Err(QuestlineError::InsufficientCredits { balance, cost });
    }
    Ok(balance)
}

/// Sign rules for entries written through `credit`
fn check_amount(kind: TransactionKind, amount: i64) -> Result<(), QuestlineError> {
    match kind {
        TransactionKind::Adjustment if amount == 0 => Err(QuestlineError::InvalidInput(
            "Adjustment amount must not be zero.".to_string(),
        )),
        TransactionKind::Purchase | TransactionKind::Refund if amount <= 0 => Err(
            QuestlineError::InvalidInput("Amount must be positive.".to_string()),
        ),
        TransactionKind::Spend => Err(QuestlineError::InvalidInput(
            "Spends must go through the balance check.".to_string(),
        )),
        _ => Ok(()),
    }
}

fn encode_entry(tx: &CreditTransaction) -> Result<String, QuestlineError> {
    serde_json::to_string(tx)
        .map_err(|e| QuestlineError::Internal(format!("encode transaction: {}", e)))
}

fn store_err(e: redis::RedisError) -> QuestlineError {
    QuestlineError::Store(e.to_string())
}
