//! Resource kinds, receipts and the pure balance arithmetic they drive.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Resource types held in the ledger. Ids are the persisted `resource_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Gold,
    Gems,
    ExpStone,
    EvoStone,
    Exp,
}

impl ResourceKind {
    /// Ascending id order, which is also the lock order for ledger rows.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Gold,
        ResourceKind::Gems,
        ResourceKind::ExpStone,
        ResourceKind::EvoStone,
        ResourceKind::Exp,
    ];

    pub fn id(self) -> i64 {
        match self {
            ResourceKind::Gold => 1,
            ResourceKind::Gems => 2,
            ResourceKind::ExpStone => 3,
            ResourceKind::EvoStone => 4,
            ResourceKind::Exp => 5,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Gold => "gold",
            ResourceKind::Gems => "gems",
            ResourceKind::ExpStone => "exp_stone",
            ResourceKind::EvoStone => "evo_stone",
            ResourceKind::Exp => "exp",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One applied economy mutation: positive amounts credit, negative amounts debit.
///
/// Receipts are response values only; they are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub kind: ResourceKind,
    pub amount: i64,
}

impl Receipt {
    pub fn credit(kind: ResourceKind, amount: i64) -> Self {
        Self { kind, amount }
    }

    pub fn debit(kind: ResourceKind, amount: i64) -> Self {
        Self {
            kind,
            amount: -amount,
        }
    }
}

/// Snapshot of a user's ledger rows, keyed in lock order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances(BTreeMap<ResourceKind, i64>);

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ResourceKind, amount: i64) -> Self {
        self.0.insert(kind, amount);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, i64)> + '_ {
        self.0.iter().map(|(kind, amount)| (*kind, *amount))
    }

    /// Apply a receipt, producing the next ledger state.
    ///
    /// A result below zero means a sufficiency check was skipped upstream, so it is
    /// reported as an integrity violation rather than a user error.
    pub fn apply(&self, receipt: &Receipt) -> Result<Balances> {
        let current = self.get(receipt.kind);
        let next = current.checked_add(receipt.amount).ok_or_else(|| {
            GameError::Integrity(format!("{} balance overflow", receipt.kind))
        })?;
        if next < 0 {
            return Err(GameError::Integrity(format!(
                "{} balance would become {} ({} {:+})",
                receipt.kind, next, current, receipt.amount
            )));
        }
        let mut out = self.clone();
        out.0.insert(receipt.kind, next);
        Ok(out)
    }

    pub fn apply_all(&self, receipts: &[Receipt]) -> Result<Balances> {
        receipts
            .iter()
            .try_fold(self.clone(), |balances, receipt| balances.apply(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ids_roundtrip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(ResourceKind::from_id(99), None);
    }

    #[test]
    fn test_apply_credit_and_debit() {
        let balances = Balances::new().with(ResourceKind::Gems, 150);
        let next = balances
            .apply_all(&[
                Receipt::debit(ResourceKind::Gems, 100),
                Receipt::credit(ResourceKind::Gold, 40),
            ])
            .unwrap();
        assert_eq!(next.get(ResourceKind::Gems), 50);
        assert_eq!(next.get(ResourceKind::Gold), 40);
        // Input snapshot is untouched
        assert_eq!(balances.get(ResourceKind::Gems), 150);
    }

    #[test]
    fn test_apply_rejects_negative_balance() {
        let balances = Balances::new().with(ResourceKind::Gems, 10);
        let err = balances
            .apply(&Receipt::debit(ResourceKind::Gems, 11))
            .unwrap_err();
        assert!(matches!(err, GameError::Integrity(_)));
    }

    #[test]
    fn test_receipt_wire_shape() {
        let json = serde_json::to_value(Receipt::credit(ResourceKind::ExpStone, 42)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "exp_stone", "amount": 42}));
    }
}
