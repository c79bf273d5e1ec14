use std::collections::BTreeMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::directory::{DirectoryPolicy, ImplementationDirectory, ImplementationId};
use crate::error::RegistryError;
use crate::token::AccountId;

/// Storage address of a unit inside a [`UnitStore`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnitId(u64);

impl UnitId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UnitId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(UnitId)
    }
}

/// Content digest identifying a unit by its coordinate, independent of the
/// storage address it happens to occupy.
pub fn unit_digest(name: &str, version: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"credence-unit");
    hasher.update((name.len() as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update(version.as_bytes());
    hasher.finalize().into()
}

/// A named, versioned owner of an [`ImplementationDirectory`].
///
/// The developer is fixed at creation. The parent is a weak reference into
/// the store, never an owning link; parents must already be frozen when a
/// child is created, so inheritance chains cannot cycle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionedUnit {
    id: UnitId,
    name: String,
    version: String,
    developer: AccountId,
    parent: Option<UnitId>,
    directory: ImplementationDirectory,
}

impl VersionedUnit {
    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn developer(&self) -> &AccountId {
        &self.developer
    }

    pub fn parent(&self) -> Option<UnitId> {
        self.parent
    }

    pub fn directory(&self) -> &ImplementationDirectory {
        &self.directory
    }

    pub fn is_frozen(&self) -> bool {
        self.directory.is_frozen()
    }

    pub fn digest(&self) -> [u8; 32] {
        unit_digest(&self.name, &self.version)
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

/// Append-only store of every unit ever created. Ids are handed out
/// sequentially and units are never evicted, which is what makes the weak
/// parent references sound.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitStore {
    units: BTreeMap<UnitId, VersionedUnit>,
    next_id: u64,
}

impl UnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a unit. A parent, when given, must exist and be frozen.
    pub fn create(
        &mut self,
        name: &str,
        version: &str,
        developer: &AccountId,
        parent: Option<UnitId>,
        policy: DirectoryPolicy,
    ) -> Result<UnitId, RegistryError> {
        if let Some(parent_id) = parent {
            let parent_unit = self.get(parent_id)?;
            if !parent_unit.is_frozen() {
                return Err(RegistryError::ParentNotFrozen { parent: parent_id });
            }
        }
        let id = UnitId::new(self.next_id);
        self.next_id += 1;
        self.units.insert(
            id,
            VersionedUnit {
                id,
                name: name.to_string(),
                version: version.to_string(),
                developer: developer.clone(),
                parent,
                directory: ImplementationDirectory::new(policy),
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: UnitId) -> Result<&VersionedUnit, RegistryError> {
        self.units
            .get(&id)
            .ok_or(RegistryError::UnknownUnit { unit: id })
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionedUnit> {
        self.units.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Bind a contract in the unit's directory. Only the developer may
    /// write, and the directory's own freeze/policy rules still apply.
    pub fn set_implementation(
        &mut self,
        id: UnitId,
        caller: &AccountId,
        contract: &str,
        implementation: ImplementationId,
    ) -> Result<(), RegistryError> {
        let unit = self.get_mut(id)?;
        if caller != &unit.developer {
            return Err(RegistryError::NotDeveloper {
                unit: id,
                caller: caller.clone(),
            });
        }
        unit.directory.set_implementation(contract, implementation)
    }

    /// Seal the unit's directory. Only the developer may freeze.
    pub fn freeze(&mut self, id: UnitId, caller: &AccountId) -> Result<(), RegistryError> {
        let unit = self.get_mut(id)?;
        if caller != &unit.developer {
            return Err(RegistryError::NotDeveloper {
                unit: id,
                caller: caller.clone(),
            });
        }
        unit.directory.freeze()
    }

    /// Resolve `contract` for the unit, walking the parent chain until a
    /// binding shadows the lookup. A miss along the whole chain is `None`,
    /// as is an unknown unit id.
    pub fn resolve_implementation(
        &self,
        id: UnitId,
        contract: &str,
    ) -> Option<&ImplementationId> {
        let mut current = self.units.get(&id);
        while let Some(unit) = current {
            if let Some(implementation) = unit.directory.implementation(contract) {
                return Some(implementation);
            }
            current = unit.parent.and_then(|parent| self.units.get(&parent));
        }
        None
    }

    fn get_mut(&mut self, id: UnitId) -> Result<&mut VersionedUnit, RegistryError> {
        self.units
            .get_mut(&id)
            .ok_or(RegistryError::UnknownUnit { unit: id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev() -> AccountId {
        "dev".to_string()
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let mut store = UnitStore::new();
        let first = store
            .create("erc20", "1.0.0", &dev(), None, DirectoryPolicy::WriteOnce)
            .unwrap();
        let second = store
            .create("erc20", "1.1.0", &dev(), None, DirectoryPolicy::WriteOnce)
            .unwrap();
        assert_eq!(first.raw(), 0);
        assert_eq!(second.raw(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn parents_must_exist_and_be_frozen() {
        let mut store = UnitStore::new();
        let parent = store
            .create("erc20", "1.0.0", &dev(), None, DirectoryPolicy::WriteOnce)
            .unwrap();

        let err = store
            .create(
                "erc20",
                "1.1.0",
                &dev(),
                Some(parent),
                DirectoryPolicy::WriteOnce,
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::ParentNotFrozen { parent: p } if p == parent));

        let missing = UnitId::new(99);
        let err = store
            .create(
                "erc20",
                "1.1.0",
                &dev(),
                Some(missing),
                DirectoryPolicy::WriteOnce,
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownUnit { unit } if unit == missing));

        store.freeze(parent, &dev()).unwrap();
        let child = store
            .create(
                "erc20",
                "1.1.0",
                &dev(),
                Some(parent),
                DirectoryPolicy::WriteOnce,
            )
            .unwrap();
        assert_eq!(store.get(child).unwrap().parent(), Some(parent));
    }

    #[test]
    fn only_the_developer_mutates_the_directory() {
        let mut store = UnitStore::new();
        let unit = store
            .create("vault", "2.0.0", &dev(), None, DirectoryPolicy::WriteOnce)
            .unwrap();

        let err = store
            .set_implementation(unit, &"intruder".to_string(), "Vault", "impl-1".to_string())
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotDeveloper { .. }));

        let err = store.freeze(unit, &"intruder".to_string()).unwrap_err();
        assert!(matches!(err, RegistryError::NotDeveloper { .. }));

        store
            .set_implementation(unit, &dev(), "Vault", "impl-1".to_string())
            .unwrap();
        store.freeze(unit, &dev()).unwrap();
        assert!(store.get(unit).unwrap().is_frozen());
    }

    #[test]
    fn resolution_walks_the_parent_chain_with_overrides() {
        let mut store = UnitStore::new();
        let root = store
            .create("kit", "1.0.0", &dev(), None, DirectoryPolicy::WriteOnce)
            .unwrap();
        store
            .set_implementation(root, &dev(), "Gateway", "gateway-1".to_string())
            .unwrap();
        store
            .set_implementation(root, &dev(), "Vault", "vault-1".to_string())
            .unwrap();
        store.freeze(root, &dev()).unwrap();

        let middle = store
            .create(
                "kit",
                "1.1.0",
                &dev(),
                Some(root),
                DirectoryPolicy::WriteOnce,
            )
            .unwrap();
        store.freeze(middle, &dev()).unwrap();

        let leaf = store
            .create(
                "kit",
                "2.0.0",
                &dev(),
                Some(middle),
                DirectoryPolicy::WriteOnce,
            )
            .unwrap();
        store
            .set_implementation(leaf, &dev(), "Vault", "vault-2".to_string())
            .unwrap();

        // Inherited through two hops.
        assert_eq!(
            store.resolve_implementation(leaf, "Gateway"),
            Some(&"gateway-1".to_string())
        );
        // Shadowed by the leaf's own binding.
        assert_eq!(
            store.resolve_implementation(leaf, "Vault"),
            Some(&"vault-2".to_string())
        );
        assert_eq!(store.resolve_implementation(leaf, "Oracle"), None);
        assert_eq!(store.resolve_implementation(UnitId::new(42), "Vault"), None);
    }

    #[test]
    fn digests_depend_on_the_full_coordinate() {
        let mut store = UnitStore::new();
        let a = store
            .create("erc20", "1.0.0", &dev(), None, DirectoryPolicy::WriteOnce)
            .unwrap();
        let b = store
            .create("erc20", "1.0.1", &dev(), None, DirectoryPolicy::WriteOnce)
            .unwrap();
        let unit_a = store.get(a).unwrap();
        let unit_b = store.get(b).unwrap();
        assert_ne!(unit_a.digest(), unit_b.digest());
        assert_eq!(unit_a.digest(), unit_digest("erc20", "1.0.0"));
        assert_eq!(unit_a.digest_hex(), hex::encode(unit_a.digest()));
        // Length framing keeps shifted coordinates apart.
        assert_ne!(unit_digest("ab", "c"), unit_digest("a", "bc"));
    }
}
