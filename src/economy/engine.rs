//! Transaction orchestration for every economy mutation.
//!
//! Each operation opens one immediate ledger transaction, reads the rows it will
//! change (campaign or quest row first, then ledger rows by resource id), computes
//! the deltas with the pure functions in [`super::accrual`], [`super::quest`] and
//! [`super::receipt`], writes them, and commits. Any error before commit drops the
//! transaction, so nothing is ever partially applied. Contention errors are
//! returned to the caller and never retried here.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rusqlite::Transaction;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::accrual::AccrualPolicy;
use super::quest::{self, QuestOutcome};
use super::receipt::{Receipt, ResourceKind};
use crate::content::{GameContent, UnitTemplate};
use crate::error::{GameError, Result};
use crate::ledger::{balances, campaign, from_unix, quests, units, LedgerStore, UnitRow};

/// What a collection paid out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReceipt {
    pub level: i64,
    pub elapsed_secs: i64,
    pub receipts: Vec<Receipt>,
    pub last_collected_at: DateTime<Utc>,
}

impl CollectReceipt {
    pub fn amount(&self, kind: ResourceKind) -> i64 {
        self.receipts
            .iter()
            .filter(|receipt| receipt.kind == kind)
            .map(|receipt| receipt.amount)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

/// Price of an acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cost {
    pub resource: ResourceKind,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummonReceipt {
    pub unit: UnitRow,
    pub template: UnitTemplate,
    pub debit: Receipt,
}

#[derive(Clone)]
pub struct EconomyEngine {
    ledger: Arc<LedgerStore>,
    content: Arc<GameContent>,
    accrual: AccrualPolicy,
}

impl EconomyEngine {
    pub fn new(ledger: Arc<LedgerStore>, content: Arc<GameContent>, accrual: AccrualPolicy) -> Self {
        Self {
            ledger,
            content,
            accrual,
        }
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    pub fn content(&self) -> &Arc<GameContent> {
        &self.content
    }

    pub fn accrual_policy(&self) -> &AccrualPolicy {
        &self.accrual
    }

    /// Materialize time-based rewards since the last collection.
    pub fn collect_accrual_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> Result<CollectReceipt> {
        let now = now.timestamp();

        let receipt = self.ledger.transaction(deadline, |tx| {
            let state = campaign::lock_accrual(tx, user_id)?;

            let Some(accrual) = self.accrual.compute(state.level, state.last_collected_at, now)
            else {
                return Ok(CollectReceipt {
                    level: state.level,
                    elapsed_secs: 0,
                    receipts: Vec::new(),
                    last_collected_at: from_unix(state.last_collected_at),
                });
            };

            let kinds: Vec<ResourceKind> = accrual.receipts.iter().map(|r| r.kind).collect();
            let before = balances::lock_balances(tx, user_id, &kinds)?;
            let after = before.apply_all(&accrual.receipts)?;
            balances::write_balances(tx, user_id, &before, &after)?;
            campaign::advance_collected_at(tx, user_id, state.last_collected_at, now)?;

            Ok(CollectReceipt {
                level: state.level,
                elapsed_secs: accrual.elapsed_secs,
                receipts: accrual.receipts,
                last_collected_at: from_unix(now),
            })
        });

        let receipt = audit("collect_accrual", user_id, receipt)?;
        if receipt.is_empty() {
            debug!(user_id = %user_id, "Collection inside granularity, nothing accrued");
        } else {
            info!(
                user_id = %user_id,
                elapsed_secs = receipt.elapsed_secs,
                "Collected accrual"
            );
        }
        Ok(receipt)
    }

    /// Claim a daily quest reward if the quest is due and its count is met.
    pub fn complete_quest_at(
        &self,
        user_id: Uuid,
        quest_id: i64,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> Result<QuestOutcome> {
        let quest = self
            .content
            .quest(quest_id)
            .ok_or_else(|| GameError::Validation(format!("unknown quest {}", quest_id)))?;
        let now = now.timestamp();

        let outcome = self.ledger.transaction(deadline, |tx| {
            let progress = quests::lock_progress(tx, user_id, quest_id)?;
            let outcome = quest::evaluate(quest, progress.count, progress.last_completed_at, now);

            if let QuestOutcome::Success { reward, .. } = &outcome {
                quests::mark_completed(tx, user_id, &progress, now)?;
                let before = balances::lock_balances(tx, user_id, &[reward.kind])?;
                let after = before.apply(reward)?;
                balances::write_balances(tx, user_id, &before, &after)?;
            }
            Ok(outcome)
        });

        let outcome = audit("complete_quest", user_id, outcome)?;
        debug!(user_id = %user_id, quest_id, ?outcome, "Quest completion evaluated");
        Ok(outcome)
    }

    /// Count progress toward a daily quest. Returns the new count.
    pub fn record_quest_progress(
        &self,
        user_id: Uuid,
        quest_id: i64,
        by: i64,
        deadline: Option<Instant>,
    ) -> Result<i64> {
        if self.content.quest(quest_id).is_none() {
            return Err(GameError::Validation(format!("unknown quest {}", quest_id)));
        }
        if by <= 0 {
            return Err(GameError::Validation("progress increment must be positive".into()));
        }

        let count = self.ledger.transaction(deadline, |tx| {
            // Row must exist for known users; the upsert covers quests added later.
            campaign::lock_accrual(tx, user_id)?;
            quests::increment_count(tx, user_id, quest_id, by)
        });
        audit("record_quest_progress", user_id, count)
    }

    /// Debit `cost` and run `acquire` in the same transaction.
    ///
    /// Fails with [`GameError::InsufficientFunds`] and no mutation when the balance
    /// is short. `acquire` failing rolls the debit back.
    pub fn spend_and_acquire<T, F>(
        &self,
        user_id: Uuid,
        cost: Cost,
        deadline: Option<Instant>,
        acquire: F,
    ) -> Result<(T, Receipt)>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        if cost.amount <= 0 {
            return Err(GameError::Validation("cost must be positive".into()));
        }

        let result = self.ledger.transaction(deadline, |tx| {
            let before = balances::lock_balances(tx, user_id, &[cost.resource])?;
            let available = before.get(cost.resource);
            if available < cost.amount {
                return Err(GameError::InsufficientFunds {
                    resource: cost.resource,
                    required: cost.amount,
                    available,
                });
            }

            let debit = Receipt::debit(cost.resource, cost.amount);
            let after = before.apply(&debit)?;
            balances::write_balances(tx, user_id, &before, &after)?;

            let acquired = acquire(tx)?;
            Ok((acquired, debit))
        });
        audit("spend_and_acquire", user_id, result)
    }

    /// Spend the summon cost on one unit from a uniformly random template.
    pub fn summon_unit_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> Result<SummonReceipt> {
        let template = self
            .content
            .unit_templates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| GameError::Config("no unit templates loaded".into()))?;
        let cost = Cost {
            resource: self.content.summon.resource,
            amount: self.content.summon.amount,
        };
        let now = now.timestamp();

        let (unit, debit) = self.spend_and_acquire(user_id, cost, deadline, |tx| {
            units::insert_unit(tx, user_id, template.id, now)
        })?;

        info!(
            user_id = %user_id,
            unit_id = unit.id,
            template = %template.name,
            "Summoned unit"
        );
        Ok(SummonReceipt {
            unit,
            template,
            debit,
        })
    }

    pub async fn collect_accrual(&self, user_id: Uuid, deadline: Instant) -> Result<CollectReceipt> {
        self.blocking(move |engine| engine.collect_accrual_at(user_id, Utc::now(), Some(deadline)))
            .await
    }

    pub async fn complete_quest(&self, user_id: Uuid, quest_id: i64, deadline: Instant) -> Result<QuestOutcome> {
        self.blocking(move |engine| {
            engine.complete_quest_at(user_id, quest_id, Utc::now(), Some(deadline))
        })
        .await
    }

    pub async fn summon_unit(&self, user_id: Uuid, deadline: Instant) -> Result<SummonReceipt> {
        self.blocking(move |engine| engine.summon_unit_at(user_id, Utc::now(), Some(deadline)))
            .await
    }

    pub async fn record_sign_in(&self, user_id: Uuid, deadline: Instant) -> Result<i64> {
        self.blocking(move |engine| {
            engine.record_quest_progress(
                user_id,
                crate::content::SIGN_IN_QUEST_ID,
                1,
                Some(deadline),
            )
        })
        .await
    }

    /// Run ledger work on the blocking pool
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(EconomyEngine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || f(engine))
            .await
            .map_err(|e| GameError::Internal(format!("Economy task failed: {}", e)))?
    }
}

/// Integrity violations mean an upstream check is missing; make them loud.
fn audit<T>(operation: &'static str, user_id: Uuid, result: Result<T>) -> Result<T> {
    if let Err(GameError::Integrity(detail)) = &result {
        error!(operation, user_id = %user_id, %detail, "Ledger integrity violation");
    }
    result
}
