//! Scopes and the scope-satisfaction rule.
//!
//! A scope is a dot-delimited capability string such as
//! `attr.food.dietary_restrictions`. Granted scopes, and the scopes agents
//! negotiate for, may end in a `.*` wildcard segment; the scope a verifier
//! asks for never contains one. Both are
//! parsed once at the boundary into segment lists and compared structurally
//! afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScopeError;

const WILDCARD: &str = "*";

/// A parsed scope as it appears on a grant: segments plus an optional
/// trailing wildcard.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope {
    segments: Vec<String>,
    wildcard: bool,
}

impl Scope {
    /// Parse a scope string.
    ///
    /// Only `[a-z0-9_.*]` is accepted, segments must be non-empty, and `*`
    /// may only appear as a whole final segment after at least one prefix
    /// segment (`attr.food.*`).
    pub fn parse(s: &str) -> Result<Self, ScopeError> {
        if s.is_empty() {
            return Err(ScopeError::Empty);
        }

        if let Some(ch) = s
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '*'))
        {
            return Err(ScopeError::InvalidCharacter {
                scope: s.to_string(),
                ch,
            });
        }

        let parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ScopeError::EmptySegment(s.to_string()));
        }

        let last = parts.len() - 1;
        let mut wildcard = false;
        for (i, part) in parts.iter().enumerate() {
            if part.contains('*') {
                if *part != WILDCARD || i != last || i == 0 {
                    return Err(ScopeError::MisplacedWildcard(s.to_string()));
                }
                wildcard = true;
            }
        }

        let segments = parts[..if wildcard { last } else { parts.len() }]
            .iter()
            .map(|p| p.to_string())
            .collect();

        Ok(Self { segments, wildcard })
    }

    /// The literal (non-wildcard) segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this scope ends in `.*`.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Whether this grant covers `required`.
    pub fn satisfies(&self, required: &RequiredScope) -> bool {
        satisfies(self, required)
    }

    /// Whether this grant covers everything `other` would grant.
    ///
    /// `p.*` contains `p.*`, `p.x.*` and `p.x`, but not `p`. A literal
    /// scope contains only itself.
    pub fn contains(&self, other: &Scope) -> bool {
        if !self.wildcard {
            return self == other;
        }
        other.segments.starts_with(&self.segments)
            && (other.wildcard || other.segments.len() > self.segments.len())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self)
    }
}

impl FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Scope {
    type Error = ScopeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

/// A scope being asked for. Never contains a wildcard.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequiredScope(Scope);

impl RequiredScope {
    /// Parse a required scope; wildcards are rejected.
    pub fn parse(s: &str) -> Result<Self, ScopeError> {
        let scope = Scope::parse(s)?;
        if scope.is_wildcard() {
            return Err(ScopeError::WildcardInRequest(s.to_string()));
        }
        Ok(Self(scope))
    }

    /// The same scope, usable as a grant.
    pub fn as_scope(&self) -> &Scope {
        &self.0
    }

    pub fn into_scope(self) -> Scope {
        self.0
    }
}

impl fmt::Display for RequiredScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for RequiredScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequiredScope({})", self.0)
    }
}

impl FromStr for RequiredScope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RequiredScope {
    type Error = ScopeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RequiredScope> for String {
    fn from(scope: RequiredScope) -> Self {
        scope.to_string()
    }
}

/// Whether a granted scope covers a required one.
///
/// Exact matches always satisfy. A wildcard grant `p.*` satisfies any
/// required scope strictly below `p` (`p.x`, `p.x.y`), but not `p` itself.
pub fn satisfies(granted: &Scope, required: &RequiredScope) -> bool {
    let required = required.as_scope();
    if !granted.wildcard {
        return granted.segments == required.segments;
    }
    required.segments.len() > granted.segments.len()
        && required.segments[..granted.segments.len()] == granted.segments[..]
}
