use serde::{Deserialize, Serialize};

use crate::directory::{ContractName, ImplementationId};
use crate::proxy::ProxyId;
use crate::token::{AccountId, Amount};
use crate::unit::UnitId;

/// Typed notification appended to the registry's event log, one per
/// successful mutation (a stake transfer appends its withdrawal and its
/// deposit separately). Consumers can rebuild ledger state from this
/// stream plus point-queries.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    UnitCreated {
        unit: UnitId,
        name: String,
        version: String,
        developer: AccountId,
        parent: Option<UnitId>,
    },
    ImplementationAdded {
        unit: UnitId,
        contract: ContractName,
        implementation: ImplementationId,
    },
    UnitFrozen {
        unit: UnitId,
    },
    UnitRegistered {
        unit: UnitId,
        name: String,
        version: String,
        developer: AccountId,
        cost: Amount,
    },
    Staked {
        staker: AccountId,
        unit: UnitId,
        amount: Amount,
        total: Amount,
        memo: Option<String>,
    },
    Unstaked {
        staker: AccountId,
        unit: UnitId,
        amount: Amount,
        total: Amount,
        memo: Option<String>,
    },
    ProxyCreated {
        proxy: ProxyId,
        name: String,
        version: String,
        contract: ContractName,
        implementation: ImplementationId,
    },
    ProxyUpgraded {
        proxy: ProxyId,
        version: String,
        implementation: ImplementationId,
    },
}
