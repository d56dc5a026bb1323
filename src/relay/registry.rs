//! Live connection counts per client role

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declared category of a connected client. Bookkeeping only, not authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Phone controller
    Mobile,
    /// Instrument cluster
    Tablet,
    /// Traffic-control map
    Web,
    /// Test harness
    Test,
}

impl ClientRole {
    pub const ALL: [ClientRole; 4] = [
        ClientRole::Mobile,
        ClientRole::Tablet,
        ClientRole::Web,
        ClientRole::Test,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClientRole::Mobile => "mobile",
            ClientRole::Tablet => "tablet",
            ClientRole::Web => "web",
            ClientRole::Test => "test",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientRole {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| RegistryError::InvalidRole(s.to_string()))
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid client role: {0} (expected mobile, tablet, web or test)")]
    InvalidRole(String),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::InvalidRole(_) => "invalid_role",
        }
    }
}

/// Counts broadcast as `connection-stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub mobile: u32,
    pub tablet: u32,
    pub web: u32,
    pub test: u32,
}

/// Live connection count per role, never below zero
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    counts: [u32; 4],
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, role: ClientRole) {
        self.counts[role.index()] += 1;
    }

    /// Returns false if the count was already zero
    pub fn unregister(&mut self, role: ClientRole) -> bool {
        let count = &mut self.counts[role.index()];
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    pub fn count(&self, role: ClientRole) -> u32 {
        self.counts[role.index()]
    }

    pub fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            mobile: self.count(ClientRole::Mobile),
            tablet: self.count(ClientRole::Tablet),
            web: self.count(ClientRole::Web),
            test: self.count(ClientRole::Test),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles_only() {
        assert_eq!("mobile".parse::<ClientRole>().unwrap(), ClientRole::Mobile);
        assert_eq!("web".parse::<ClientRole>().unwrap(), ClientRole::Web);
        assert_eq!(
            "watch".parse::<ClientRole>().unwrap_err(),
            RegistryError::InvalidRole("watch".into())
        );
        assert!("Mobile".parse::<ClientRole>().is_err());
    }

    #[test]
    fn two_mobiles_then_one_leaves() {
        let mut registry = ConnectionRegistry::new();
        registry.register(ClientRole::Mobile);
        registry.register(ClientRole::Mobile);
        registry.unregister(ClientRole::Mobile);

        assert_eq!(
            registry.snapshot(),
            ConnectionStats {
                mobile: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn unregister_floors_at_zero() {
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.unregister(ClientRole::Tablet));
        registry.register(ClientRole::Tablet);
        assert!(registry.unregister(ClientRole::Tablet));
        assert!(!registry.unregister(ClientRole::Tablet));
        assert_eq!(registry.count(ClientRole::Tablet), 0);
    }

    #[test]
    fn counts_never_negative_over_mixed_sequence() {
        let mut registry = ConnectionRegistry::new();
        let ops = [
            (ClientRole::Web, true),
            (ClientRole::Web, false),
            (ClientRole::Web, false),
            (ClientRole::Test, false),
            (ClientRole::Test, true),
            (ClientRole::Mobile, false),
            (ClientRole::Test, true),
            (ClientRole::Test, false),
        ];
        for (role, register) in ops {
            if register {
                registry.register(role);
            } else {
                registry.unregister(role);
            }
        }
        let stats = registry.snapshot();
        assert_eq!((stats.mobile, stats.tablet, stats.web, stats.test), (0, 0, 0, 1));
    }

    #[test]
    fn stats_serialize_by_role_name() {
        let json = serde_json::to_value(ConnectionStats {
            mobile: 2,
            tablet: 1,
            web: 0,
            test: 3,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"mobile": 2, "tablet": 1, "web": 0, "test": 3}));
    }
}
