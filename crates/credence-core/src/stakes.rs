use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::token::{AccountId, Amount};
use crate::unit::UnitId;

/// Fee computation for a single deposit: `fee = amount / fraction` rounded
/// down, `effective = amount - fee`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSplit {
    pub fee: Amount,
    pub effective: Amount,
}

/// Result of a committed deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StakeOutcome {
    pub fee: Amount,
    pub effective: Amount,
    pub unit_total: Amount,
}

/// Result of a committed stake transfer between two units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferOutcome {
    pub fee: Amount,
    pub effective: Amount,
    pub from_total: Amount,
    pub to_total: Amount,
}

/// Vouching ledger: per-(staker, unit) backing with incrementally maintained
/// per-unit and global aggregates.
///
/// Every deposit is skimmed by the developer fraction before it is credited;
/// a deposit too small to produce a positive fee is rejected outright.
/// Withdrawals are fee-free. Transfers re-apply the skim at the destination,
/// so moving stake is never free.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakeLedger {
    fraction: u64,
    stakes: BTreeMap<AccountId, BTreeMap<UnitId, Amount>>,
    unit_totals: BTreeMap<UnitId, Amount>,
    total_staked: Amount,
}

impl StakeLedger {
    pub fn new(fraction: u64) -> Result<Self, RegistryError> {
        if fraction == 0 {
            return Err(RegistryError::InvalidFraction { fraction });
        }
        Ok(Self {
            fraction,
            stakes: BTreeMap::new(),
            unit_totals: BTreeMap::new(),
            total_staked: 0,
        })
    }

    pub fn fraction(&self) -> u64 {
        self.fraction
    }

    /// Split a prospective deposit into fee and effective credit without
    /// touching state. Rejects amounts whose fee would round to zero.
    pub fn preview(&self, amount: Amount) -> Result<FeeSplit, RegistryError> {
        let fee = amount / self.fraction;
        if fee == 0 {
            return Err(RegistryError::StakeTooSmall {
                amount,
                fraction: self.fraction,
            });
        }
        Ok(FeeSplit {
            fee,
            effective: amount - fee,
        })
    }

    /// Deposit `amount` behind `unit`, crediting the effective part. The
    /// skimmed fee is returned for the caller to route to the developer.
    pub fn stake(
        &mut self,
        staker: &AccountId,
        unit: UnitId,
        amount: Amount,
    ) -> Result<StakeOutcome, RegistryError> {
        let split = self.preview(amount)?;
        let unit_total = self.credit(staker, unit, split.effective);
        Ok(StakeOutcome {
            fee: split.fee,
            effective: split.effective,
            unit_total,
        })
    }

    /// Withdraw `amount` of effective backing. No fee applies. Returns the
    /// unit's new total.
    pub fn unstake(
        &mut self,
        staker: &AccountId,
        unit: UnitId,
        amount: Amount,
    ) -> Result<Amount, RegistryError> {
        if self.stake_of(staker, unit) < amount {
            return Err(RegistryError::InsufficientStake {
                staker: staker.clone(),
                unit,
            });
        }
        Ok(self.debit(staker, unit, amount))
    }

    /// Move `amount` of backing from one unit to another, atomically. The
    /// moved amount is treated as a fresh deposit at the destination and is
    /// skimmed again.
    pub fn transfer(
        &mut self,
        staker: &AccountId,
        from: UnitId,
        to: UnitId,
        amount: Amount,
    ) -> Result<TransferOutcome, RegistryError> {
        if self.stake_of(staker, from) < amount {
            return Err(RegistryError::InsufficientStake {
                staker: staker.clone(),
                unit: from,
            });
        }
        let split = self.preview(amount)?;
        let from_total = self.debit(staker, from, amount);
        let to_total = self.credit(staker, to, split.effective);
        Ok(TransferOutcome {
            fee: split.fee,
            effective: split.effective,
            from_total,
            to_total,
        })
    }

    pub fn stake_of(&self, staker: &AccountId, unit: UnitId) -> Amount {
        self.stakes
            .get(staker)
            .and_then(|units| units.get(&unit))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_staked_for(&self, unit: UnitId) -> Amount {
        self.unit_totals.get(&unit).copied().unwrap_or(0)
    }

    pub fn total_staked(&self) -> Amount {
        self.total_staked
    }

    /// Iterate every (staker, unit, amount) entry, including entries that
    /// have been unstaked down to zero.
    pub fn entries(&self) -> impl Iterator<Item = (&AccountId, UnitId, Amount)> {
        self.stakes.iter().flat_map(|(staker, units)| {
            units
                .iter()
                .map(move |(unit, amount)| (staker, *unit, *amount))
        })
    }

    fn credit(&mut self, staker: &AccountId, unit: UnitId, amount: Amount) -> Amount {
        if amount == 0 {
            return self.total_staked_for(unit);
        }
        let entry = self
            .stakes
            .entry(staker.clone())
            .or_default()
            .entry(unit)
            .or_insert(0);
        *entry += amount;
        let unit_total = self.unit_totals.entry(unit).or_insert(0);
        *unit_total += amount;
        self.total_staked += amount;
        *unit_total
    }

    // Callers verify the entry covers `amount` first.
    fn debit(&mut self, staker: &AccountId, unit: UnitId, amount: Amount) -> Amount {
        if amount == 0 {
            return self.total_staked_for(unit);
        }
        if let Some(units) = self.stakes.get_mut(staker) {
            if let Some(entry) = units.get_mut(&unit) {
                *entry -= amount;
            }
        }
        let unit_total = self.unit_totals.entry(unit).or_insert(0);
        *unit_total -= amount;
        self.total_staked -= amount;
        *unit_total
    }
}
