use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::directory::{DirectoryPolicy, ImplementationId};
use crate::error::RegistryError;
use crate::event::RegistryEvent;
use crate::proxy::{ImplementationProvider, Proxy, ProxyId};
use crate::stakes::{StakeLedger, StakeOutcome, TransferOutcome};
use crate::token::{AccountId, Amount, Token};
use crate::unit::{unit_digest, UnitId, UnitStore, VersionedUnit};

/// Economic parameters fixed when the registry is brought up.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Flat cost burned from the publisher on registration.
    pub registration_cost: Amount,
    /// Fee denominator applied to every stake deposit.
    pub developer_fraction: u64,
    /// The registry's own token account, escrowing all staked funds.
    pub account: AccountId,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registration_cost: 2,
            developer_fraction: 10,
            account: "registry".to_string(),
        }
    }
}

/// The orchestrator coupling unit registration to the vouching ledger.
///
/// Holds the token, the unit store, the stake ledger, the registration
/// records, the proxy records, and the event log, and is the only writer
/// to any of them. Registration admits a frozen unit into the queryable
/// index for the price of a burned fee; staking operations are gated on
/// that admission and route the skimmed fee to the unit's developer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    config: RegistryConfig,
    token: Token,
    units: UnitStore,
    stakes: StakeLedger,
    registered: BTreeSet<UnitId>,
    index: BTreeMap<String, UnitId>,
    proxies: BTreeMap<ProxyId, Proxy>,
    next_proxy: u64,
    events: Vec<RegistryEvent>,
}

impl Registry {
    pub fn new(config: RegistryConfig, token: Token) -> Result<Self, RegistryError> {
        let stakes = StakeLedger::new(config.developer_fraction)?;
        Ok(Self {
            config,
            token,
            units: UnitStore::new(),
            stakes,
            registered: BTreeSet::new(),
            index: BTreeMap::new(),
            proxies: BTreeMap::new(),
            next_proxy: 0,
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Mutable access to the fee currency, for minting and allowance
    /// grants. The escrow invariant only depends on the registry account,
    /// which no end-user flow touches directly.
    pub fn token_mut(&mut self) -> &mut Token {
        &mut self.token
    }

    pub fn units(&self) -> &UnitStore {
        &self.units
    }

    pub fn stakes(&self) -> &StakeLedger {
        &self.stakes
    }

    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    pub fn is_registered(&self, unit: UnitId) -> bool {
        self.registered.contains(&unit)
    }

    /// Create a unit and record it in the event log.
    pub fn create_unit(
        &mut self,
        name: &str,
        version: &str,
        developer: &AccountId,
        parent: Option<UnitId>,
        policy: DirectoryPolicy,
    ) -> Result<UnitId, RegistryError> {
        let unit = self.units.create(name, version, developer, parent, policy)?;
        self.events.push(RegistryEvent::UnitCreated {
            unit,
            name: name.to_string(),
            version: version.to_string(),
            developer: developer.clone(),
            parent,
        });
        Ok(unit)
    }

    /// Bind a contract in an unfrozen unit's directory (developer only).
    pub fn set_implementation(
        &mut self,
        unit: UnitId,
        caller: &AccountId,
        contract: &str,
        implementation: ImplementationId,
    ) -> Result<(), RegistryError> {
        self.units
            .set_implementation(unit, caller, contract, implementation.clone())?;
        self.events.push(RegistryEvent::ImplementationAdded {
            unit,
            contract: contract.to_string(),
            implementation,
        });
        Ok(())
    }

    /// Irreversibly seal a unit's directory (developer only).
    pub fn freeze_unit(&mut self, unit: UnitId, caller: &AccountId) -> Result<(), RegistryError> {
        self.units.freeze(unit, caller)?;
        self.events.push(RegistryEvent::UnitFrozen { unit });
        Ok(())
    }

    /// Admit a frozen unit into the registry. Pulls the registration cost
    /// from `by` (allowance required) into the registry account and burns
    /// it, then indexes the unit under its coordinate digest.
    pub fn register(&mut self, unit: UnitId, by: &AccountId) -> Result<(), RegistryError> {
        let record = self.units.get(unit)?;
        if !record.is_frozen() {
            return Err(RegistryError::NotFrozen { unit });
        }
        if self.registered.contains(&unit) {
            return Err(RegistryError::AlreadyRegistered { unit });
        }
        let name = record.name().to_string();
        let version = record.version().to_string();
        let developer = record.developer().clone();
        let key = record.digest_hex();
        if self.index.contains_key(&key) {
            return Err(RegistryError::VersionTaken { name, version });
        }

        let cost = self.config.registration_cost;
        let account = self.config.account.clone();
        self.token.transfer_from(&account, by, &account, cost)?;
        self.token.burn(&account, cost)?;

        self.registered.insert(unit);
        self.index.insert(key, unit);
        self.events.push(RegistryEvent::UnitRegistered {
            unit,
            name,
            version,
            developer,
            cost,
        });
        Ok(())
    }

    /// Look up a registered unit by coordinate.
    pub fn unit(&self, name: &str, version: &str) -> Option<&VersionedUnit> {
        let key = hex::encode(unit_digest(name, version));
        let id = self.index.get(&key)?;
        self.units.get(*id).ok()
    }

    /// Resolve `contract` under a registered coordinate, inheritance
    /// included. `None` when the coordinate is not registered or nothing
    /// along the chain binds the name.
    pub fn implementation(
        &self,
        name: &str,
        version: &str,
        contract: &str,
    ) -> Option<&ImplementationId> {
        let unit = self.unit(name, version)?;
        self.units.resolve_implementation(unit.id(), contract)
    }

    /// Resolve against a unit id directly, without the registration index.
    pub fn resolve_implementation(
        &self,
        unit: UnitId,
        contract: &str,
    ) -> Option<&ImplementationId> {
        self.units.resolve_implementation(unit, contract)
    }

    /// Stake `amount` behind a registered unit. The gross amount is pulled
    /// from the staker by allowance; the skimmed fee goes straight to the
    /// unit's developer and the effective remainder stays escrowed in the
    /// registry account.
    pub fn stake(
        &mut self,
        staker: &AccountId,
        unit: UnitId,
        amount: Amount,
        memo: Option<String>,
    ) -> Result<StakeOutcome, RegistryError> {
        self.require_registered(unit)?;
        let developer = self.units.get(unit)?.developer().clone();
        self.stakes.preview(amount)?;

        let account = self.config.account.clone();
        self.token.transfer_from(&account, staker, &account, amount)?;
        let outcome = self.stakes.stake(staker, unit, amount)?;
        self.token.transfer(&account, &developer, outcome.fee)?;

        self.events.push(RegistryEvent::Staked {
            staker: staker.clone(),
            unit,
            amount: outcome.effective,
            total: outcome.unit_total,
            memo,
        });
        Ok(outcome)
    }

    /// Withdraw effective stake from a registered unit, fee-free.
    pub fn unstake(
        &mut self,
        staker: &AccountId,
        unit: UnitId,
        amount: Amount,
        memo: Option<String>,
    ) -> Result<Amount, RegistryError> {
        self.require_registered(unit)?;
        let total = self.stakes.unstake(staker, unit, amount)?;

        let account = self.config.account.clone();
        self.token.transfer(&account, staker, amount)?;

        self.events.push(RegistryEvent::Unstaked {
            staker: staker.clone(),
            unit,
            amount,
            total,
            memo,
        });
        Ok(total)
    }

    /// Move stake between two registered units. The moved amount is
    /// skimmed again at the destination; that fee goes to the destination
    /// unit's developer. Appends an Unstaked/Staked pair to the log.
    pub fn transfer_stake(
        &mut self,
        staker: &AccountId,
        from: UnitId,
        to: UnitId,
        amount: Amount,
        memo: Option<String>,
    ) -> Result<TransferOutcome, RegistryError> {
        self.require_registered(from)?;
        self.require_registered(to)?;
        let developer = self.units.get(to)?.developer().clone();
        let outcome = self.stakes.transfer(staker, from, to, amount)?;

        let account = self.config.account.clone();
        self.token.transfer(&account, &developer, outcome.fee)?;

        self.events.push(RegistryEvent::Unstaked {
            staker: staker.clone(),
            unit: from,
            amount,
            total: outcome.from_total,
            memo: memo.clone(),
        });
        self.events.push(RegistryEvent::Staked {
            staker: staker.clone(),
            unit: to,
            amount: outcome.effective,
            total: outcome.to_total,
            memo,
        });
        Ok(outcome)
    }

    /// Create a dispatch proxy for a coordinate that currently resolves.
    pub fn create_proxy(
        &mut self,
        name: &str,
        version: &str,
        contract: &str,
    ) -> Result<ProxyId, RegistryError> {
        let implementation = self
            .implementation(name, version, contract)
            .cloned()
            .ok_or_else(|| RegistryError::ImplementationNotFound {
                name: name.to_string(),
                version: version.to_string(),
                contract: contract.to_string(),
            })?;

        let id = ProxyId::new(self.next_proxy);
        self.next_proxy += 1;
        self.proxies.insert(
            id,
            Proxy::new(
                id,
                name.to_string(),
                version.to_string(),
                contract.to_string(),
            ),
        );
        self.events.push(RegistryEvent::ProxyCreated {
            proxy: id,
            name: name.to_string(),
            version: version.to_string(),
            contract: contract.to_string(),
            implementation,
        });
        Ok(id)
    }

    /// Re-point a proxy at another version of its distribution. The new
    /// coordinate must resolve for the proxy's contract.
    pub fn upgrade_proxy(&mut self, proxy: ProxyId, version: &str) -> Result<(), RegistryError> {
        let record = self
            .proxies
            .get(&proxy)
            .ok_or(RegistryError::UnknownProxy { proxy })?;
        let name = record.name().to_string();
        let contract = record.contract().to_string();
        let implementation = self
            .implementation(&name, version, &contract)
            .cloned()
            .ok_or_else(|| RegistryError::ImplementationNotFound {
                name,
                version: version.to_string(),
                contract,
            })?;

        if let Some(record) = self.proxies.get_mut(&proxy) {
            record.set_version(version.to_string());
        }
        self.events.push(RegistryEvent::ProxyUpgraded {
            proxy,
            version: version.to_string(),
            implementation,
        });
        Ok(())
    }

    pub fn proxy(&self, id: ProxyId) -> Option<&Proxy> {
        self.proxies.get(&id)
    }

    pub fn proxies(&self) -> impl Iterator<Item = &Proxy> {
        self.proxies.values()
    }

    /// Resolve the implementation a proxy currently dispatches to.
    pub fn proxy_target(&self, id: ProxyId) -> Option<ImplementationId> {
        self.proxies.get(&id).and_then(|proxy| proxy.target(self))
    }

    /// Digest of the full economic state: balances, units (coordinate,
    /// bindings, freeze/registration flags), and stake entries, folded
    /// into a single root. Events are deliberately excluded so replaying
    /// a snapshot reproduces the root.
    pub fn state_digest(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::new();
        for (account, balance) in self.token.balances() {
            let mut hasher = Sha256::new();
            hasher.update(b"bal");
            hasher.update(account.as_bytes());
            hasher.update(balance.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        for unit in self.units.iter() {
            let mut hasher = Sha256::new();
            hasher.update(b"unit");
            hasher.update(unit.id().raw().to_le_bytes());
            hasher.update(unit.digest());
            for (contract, implementation) in unit.directory().entries() {
                hasher.update(contract.as_bytes());
                hasher.update(implementation.as_bytes());
            }
            hasher.update([
                unit.is_frozen() as u8,
                self.is_registered(unit.id()) as u8,
            ]);
            leaves.push(hasher.finalize().into());
        }
        for (staker, unit, amount) in self.stakes.entries() {
            let mut hasher = Sha256::new();
            hasher.update(b"stake");
            hasher.update(staker.as_bytes());
            hasher.update(unit.raw().to_le_bytes());
            hasher.update(amount.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        fold_digest(leaves)
    }

    fn require_registered(&self, unit: UnitId) -> Result<(), RegistryError> {
        if self.registered.contains(&unit) {
            Ok(())
        } else {
            Err(RegistryError::NotRegistered { unit })
        }
    }
}

impl ImplementationProvider for Registry {
    fn resolve(&self, name: &str, version: &str, contract: &str) -> Option<ImplementationId> {
        self.implementation(name, version, contract).cloned()
    }
}

fn fold_digest(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"credence-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
