//! Token tiers and the operations they permit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scope::{RequiredScope, Scope};

/// Authority level of a token, independent of its scope string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// The user themself, holding an unlocked vault. Covers every scope.
    VaultOwner,
    /// A scoped grant issued through consent negotiation.
    Consent,
    /// A logged-in session. Confirms identity, never reads or writes data.
    Session,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::VaultOwner => "vault_owner",
            Tier::Consent => "consent",
            Tier::Session => "session",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vault_owner" => Some(Tier::VaultOwner),
            "consent" => Some(Tier::Consent),
            "session" => Some(Tier::Session),
            _ => None,
        }
    }

    /// Whether a token of this tier carrying `scope` covers `required`.
    ///
    /// The tier overrides the literal scope: VaultOwner covers everything,
    /// Session covers no data scope at all.
    pub fn covers(&self, scope: &Scope, required: &RequiredScope) -> bool {
        match self {
            Tier::VaultOwner => true,
            Tier::Consent => scope.satisfies(required),
            Tier::Session => false,
        }
    }

    /// Whether a token of this tier carrying `scope` may perform `op`.
    pub fn permits(&self, scope: &Scope, op: &Operation) -> bool {
        match op {
            Operation::ReadData(required) | Operation::WriteData(required) => {
                self.covers(scope, required)
            }
            Operation::ConfirmIdentity => matches!(self, Tier::VaultOwner | Tier::Session),
            Operation::ReadVaultKey => matches!(self, Tier::VaultOwner),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a token holder wants to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Read data under a scope.
    ReadData(RequiredScope),
    /// Write data under a scope.
    WriteData(RequiredScope),
    /// Prove "I am this user" (approve, deny, revoke).
    ConfirmIdentity,
    /// Fetch the encrypted vault-key record.
    ReadVaultKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(s: &str) -> Scope {
        Scope::parse(s).unwrap()
    }

    fn req(s: &str) -> RequiredScope {
        RequiredScope::parse(s).unwrap()
    }

    #[test]
    fn test_vault_owner_covers_everything() {
        let owner_scope = scope("vault.owner");
        assert!(Tier::VaultOwner.covers(&owner_scope, &req("attr.finance.budget")));
        assert!(Tier::VaultOwner.permits(&owner_scope, &Operation::ReadVaultKey));
        assert!(Tier::VaultOwner.permits(&owner_scope, &Operation::ConfirmIdentity));
    }

    #[test]
    fn test_session_never_covers_data() {
        let s = scope("attr.food.*");
        assert!(!Tier::Session.covers(&s, &req("attr.food.diet")));
        assert!(!Tier::Session.permits(&s, &Operation::WriteData(req("attr.food.diet"))));
        assert!(Tier::Session.permits(&s, &Operation::ConfirmIdentity));
        assert!(!Tier::Session.permits(&s, &Operation::ReadVaultKey));
    }

    #[test]
    fn test_consent_follows_scope() {
        let s = scope("attr.food.*");
        assert!(Tier::Consent.permits(&s, &Operation::ReadData(req("attr.food.diet"))));
        assert!(!Tier::Consent.permits(&s, &Operation::ReadData(req("attr.finance.budget"))));
        assert!(!Tier::Consent.permits(&s, &Operation::ConfirmIdentity));
        assert!(!Tier::Consent.permits(&s, &Operation::ReadVaultKey));
    }

    #[test]
    fn test_tier_string_roundtrip() {
        for tier in [Tier::VaultOwner, Tier::Consent, Tier::Session] {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Tier::parse("admin"), None);
    }
}
