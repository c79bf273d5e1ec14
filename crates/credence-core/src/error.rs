use thiserror::Error;

use crate::directory::ContractName;
use crate::proxy::ProxyId;
use crate::token::{AccountId, Amount, TokenError};
use crate::unit::UnitId;

/// Canonical error type exposed by the registry components.
///
/// Every failure is a rejected operation on otherwise-healthy state; a
/// returned error always means the attempted operation left no observable
/// change behind.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failure raised by the underlying fungible balance ledger.
    #[error("token: {0}")]
    Token(#[from] TokenError),

    /// The directory has been frozen and no longer accepts writes.
    #[error("directory is frozen")]
    AlreadyFrozen,

    /// A write-once directory already holds a binding for this contract.
    #[error("contract {contract} already has an implementation")]
    DuplicateContract { contract: ContractName },

    /// No unit exists under this id.
    #[error("unknown unit {unit}")]
    UnknownUnit { unit: UnitId },

    /// A unit may only inherit from a parent that is already frozen.
    #[error("parent unit {parent} is not frozen")]
    ParentNotFrozen { parent: UnitId },

    /// Directory mutation and freezing are reserved to the unit's developer.
    #[error("account {caller} is not the developer of unit {unit}")]
    NotDeveloper { unit: UnitId, caller: AccountId },

    /// Registration requires the unit to be frozen first.
    #[error("unit {unit} is not frozen")]
    NotFrozen { unit: UnitId },

    /// Registration is one-shot per unit.
    #[error("unit {unit} is already registered")]
    AlreadyRegistered { unit: UnitId },

    /// Staking operations require a registered unit.
    #[error("unit {unit} is not registered")]
    NotRegistered { unit: UnitId },

    /// Another unit already occupies this (name, version) coordinate.
    #[error("version {version} of {name} is already registered")]
    VersionTaken { name: String, version: String },

    /// The developer fraction divides deposits and must be at least 1.
    #[error("invalid developer fraction {fraction}")]
    InvalidFraction { fraction: u64 },

    /// The deposit is too small to yield a positive developer fee.
    #[error("deposit of {amount} yields no developer fee at fraction {fraction}")]
    StakeTooSmall { amount: Amount, fraction: u64 },

    /// Withdrawal or transfer exceeds the staker's current backing.
    #[error("insufficient stake held by {staker} against unit {unit}")]
    InsufficientStake { staker: AccountId, unit: UnitId },

    /// The coordinate does not resolve to any implementation.
    #[error("no implementation for contract {contract} under {name} {version}")]
    ImplementationNotFound {
        name: String,
        version: String,
        contract: ContractName,
    },

    /// No proxy exists under this id.
    #[error("unknown proxy {proxy}")]
    UnknownProxy { proxy: ProxyId },
}
