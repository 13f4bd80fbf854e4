//! Daily quest period rules.

use serde::Serialize;

use super::receipt::Receipt;
use crate::content::DailyQuest;

const DAY_SECS: i64 = 86_400;

/// Start of the UTC calendar day containing `now`.
pub fn period_start(now: i64) -> i64 {
    now - now.rem_euclid(DAY_SECS)
}

pub fn completed_this_period(last_completed_at: i64, now: i64) -> bool {
    last_completed_at >= period_start(now)
}

/// Result of a completion attempt. Only `Success` ever corresponds to a ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuestOutcome {
    AlreadyComplete {
        #[serde(rename = "lastCompletedAt")]
        last_completed_at: i64,
    },
    RequirementsNotMet { count: i64, required: i64 },
    Success {
        reward: Receipt,
        #[serde(rename = "completedAt")]
        completed_at: i64,
    },
}

impl QuestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QuestOutcome::Success { .. })
    }
}

/// Decide the outcome for a locked progress row.
pub fn evaluate(quest: &DailyQuest, count: i64, last_completed_at: i64, now: i64) -> QuestOutcome {
    if completed_this_period(last_completed_at, now) {
        return QuestOutcome::AlreadyComplete { last_completed_at };
    }
    if count < quest.required {
        return QuestOutcome::RequirementsNotMet {
            count,
            required: quest.required,
        };
    }
    QuestOutcome::Success {
        reward: Receipt::credit(quest.reward.resource, quest.reward.amount),
        completed_at: now,
    }
}
