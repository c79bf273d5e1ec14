use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::directory::{ContractName, ImplementationId};

/// Late-bound lookup of the implementation behind a coordinate. The
/// registry implements this; anything else that can answer the question
/// (a fixture, a remote mirror) can stand in for it.
pub trait ImplementationProvider {
    fn resolve(&self, name: &str, version: &str, contract: &str) -> Option<ImplementationId>;
}

/// Identifier of a dispatch proxy created through the registry.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProxyId(u64);

impl ProxyId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProxyId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ProxyId)
    }
}

/// A dispatch handle pinned to a contract coordinate. The handle stores no
/// implementation of its own; the target is resolved through a provider at
/// call time, so re-pointing the coordinate re-points every call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proxy {
    id: ProxyId,
    name: String,
    version: String,
    contract: ContractName,
}

impl Proxy {
    pub(crate) fn new(id: ProxyId, name: String, version: String, contract: ContractName) -> Self {
        Self {
            id,
            name,
            version,
            contract,
        }
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Resolve the implementation currently backing this proxy.
    pub fn target<P: ImplementationProvider + ?Sized>(&self, provider: &P) -> Option<ImplementationId> {
        provider.resolve(&self.name, &self.version, &self.contract)
    }

    pub(crate) fn set_version(&mut self, version: String) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct FixtureProvider {
        bindings: BTreeMap<(String, String, String), ImplementationId>,
    }

    impl ImplementationProvider for FixtureProvider {
        fn resolve(&self, name: &str, version: &str, contract: &str) -> Option<ImplementationId> {
            self.bindings
                .get(&(name.to_string(), version.to_string(), contract.to_string()))
                .cloned()
        }
    }

    #[test]
    fn targets_are_resolved_at_call_time() {
        let mut provider = FixtureProvider {
            bindings: BTreeMap::new(),
        };
        let proxy = Proxy::new(
            ProxyId::new(0),
            "erc20".to_string(),
            "1.0.0".to_string(),
            "Gateway".to_string(),
        );
        assert_eq!(proxy.target(&provider), None);

        provider.bindings.insert(
            ("erc20".into(), "1.0.0".into(), "Gateway".into()),
            "impl-1".to_string(),
        );
        assert_eq!(proxy.target(&provider), Some("impl-1".to_string()));

        // A re-pointed coordinate re-points the proxy without touching it.
        provider.bindings.insert(
            ("erc20".into(), "1.0.0".into(), "Gateway".into()),
            "impl-2".to_string(),
        );
        assert_eq!(proxy.target(&provider), Some("impl-2".to_string()));
    }

    #[test]
    fn upgrading_switches_the_version_coordinate() {
        let mut provider = FixtureProvider {
            bindings: BTreeMap::new(),
        };
        provider.bindings.insert(
            ("erc20".into(), "1.0.0".into(), "Gateway".into()),
            "impl-1".to_string(),
        );
        provider.bindings.insert(
            ("erc20".into(), "2.0.0".into(), "Gateway".into()),
            "impl-2".to_string(),
        );

        let mut proxy = Proxy::new(
            ProxyId::new(4),
            "erc20".to_string(),
            "1.0.0".to_string(),
            "Gateway".to_string(),
        );
        assert_eq!(proxy.target(&provider), Some("impl-1".to_string()));
        proxy.set_version("2.0.0".to_string());
        assert_eq!(proxy.target(&provider), Some("impl-2".to_string()));
    }
}
