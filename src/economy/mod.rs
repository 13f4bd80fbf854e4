//! Economy engine
//!
//! Pure arithmetic (accrual, quest periods, receipts) plus the transactional
//! orchestration that applies it to the ledger.

pub mod accrual;
pub mod engine;
pub mod quest;
pub mod receipt;

pub use accrual::{Accrual, AccrualPolicy};
pub use engine::{CollectReceipt, Cost, EconomyEngine, SummonReceipt};
pub use quest::QuestOutcome;
pub use receipt::{Balances, Receipt, ResourceKind};
