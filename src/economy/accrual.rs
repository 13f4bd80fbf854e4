//! Time-based accrual arithmetic. Pure: the engine supplies timestamps and persists results.

use serde::Serialize;

use super::receipt::{Receipt, ResourceKind};
use crate::content::{AccrualRates, Rate};

/// Accrual tuning: rates from game content, window bounds from runtime configuration.
#[derive(Debug, Clone)]
pub struct AccrualPolicy {
    /// Longest idle span that still pays out
    pub max_window_secs: i64,
    /// Spans shorter than this accrue nothing and leave the row untouched
    pub min_granularity_secs: i64,
    pub rates: AccrualRates,
}

impl Default for AccrualPolicy {
    fn default() -> Self {
        Self {
            max_window_secs: 24 * 60 * 60,
            min_granularity_secs: 1,
            rates: AccrualRates::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accrual {
    /// Seconds actually paid for, after clamping
    pub elapsed_secs: i64,
    pub receipts: Vec<Receipt>,
}

impl AccrualPolicy {
    /// Per-second yield of `rate` at `level`, growing once per `level_step` levels.
    pub fn rate_at(&self, rate: Rate, level: i64) -> i64 {
        let tiers = level.max(0) / self.rates.level_step.max(1);
        rate.base.saturating_add(tiers.saturating_mul(rate.growth))
    }

    /// Whole seconds payable between `last_collected_at` and `now`, or `None` when
    /// the span is below the minimum granularity (including clock regressions).
    pub fn payable_secs(&self, last_collected_at: i64, now: i64) -> Option<i64> {
        let elapsed = now.saturating_sub(last_collected_at);
        if elapsed < self.min_granularity_secs.max(1) {
            return None;
        }
        Some(elapsed.min(self.max_window_secs))
    }

    /// Rewards owed for an idle span, one receipt per accruing resource in lock order.
    pub fn compute(&self, level: i64, last_collected_at: i64, now: i64) -> Option<Accrual> {
        let elapsed_secs = self.payable_secs(last_collected_at, now)?;
        let mut receipts: Vec<Receipt> = [
            (ResourceKind::Exp, self.rates.exp),
            (ResourceKind::Gold, self.rates.gold),
            (ResourceKind::ExpStone, self.rates.exp_stone),
        ]
        .into_iter()
        .map(|(kind, rate)| {
            Receipt::credit(kind, elapsed_secs.saturating_mul(self.rate_at(rate, level)))
        })
        .collect();
        receipts.sort_by_key(|receipt| receipt.kind);

        Some(Accrual {
            elapsed_secs,
            receipts,
        })
    }
}
