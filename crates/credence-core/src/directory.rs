use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub type ContractName = String;
pub type ImplementationId = String;

/// Write policy applied while the directory is still unfrozen.
///
/// The source systems this models disagree on the point: some reject a
/// second binding for a contract name, others replace it silently. The
/// policy is therefore chosen per directory instead of hard-coded.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryPolicy {
    /// Reject a second binding for an already-bound contract name.
    #[default]
    WriteOnce,
    /// Allow rebinding a contract name until the directory freezes.
    Overwrite,
}

/// Freezable map of contract names to implementation ids.
///
/// Once frozen the entries are immutable forever; there is no unfreeze.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImplementationDirectory {
    policy: DirectoryPolicy,
    frozen: bool,
    entries: BTreeMap<ContractName, ImplementationId>,
}

impl ImplementationDirectory {
    pub fn new(policy: DirectoryPolicy) -> Self {
        Self {
            policy,
            frozen: false,
            entries: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> DirectoryPolicy {
        self.policy
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn entries(&self) -> &BTreeMap<ContractName, ImplementationId> {
        &self.entries
    }

    /// Bind `contract` to `implementation`, subject to the freeze flag and
    /// the directory's write policy.
    pub fn set_implementation(
        &mut self,
        contract: &str,
        implementation: ImplementationId,
    ) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::AlreadyFrozen);
        }
        if self.policy == DirectoryPolicy::WriteOnce && self.entries.contains_key(contract) {
            return Err(RegistryError::DuplicateContract {
                contract: contract.to_string(),
            });
        }
        self.entries.insert(contract.to_string(), implementation);
        Ok(())
    }

    /// Look up the binding for `contract`. Absent names are `None`, never an
    /// error.
    pub fn implementation(&self, contract: &str) -> Option<&ImplementationId> {
        self.entries.get(contract)
    }

    /// Irreversibly seal the directory.
    pub fn freeze(&mut self) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::AlreadyFrozen);
        }
        self.frozen = true;
        Ok(())
    }
}
