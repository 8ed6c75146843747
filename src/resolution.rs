//! Cascading resolution of sanitizer requests.
//!
//! A request is answered by walking a fixed list of match rules from most to
//! least specific. For each rule every stored entry is scanned; the first entry
//! satisfying the first rule that matches anything wins.
//!
//! # Named lookup
//!
//! 1. Type + scope + transform name
//! 2. Type + transform name
//! 3. Type + scope + source name (origin hint)
//! 4. Type + source name (origin hint)
//!
//! # Default lookup
//!
//! 5. Type + scope + reserved default name
//! 6. Type + reserved default name

use std::fmt;

use indexmap::IndexMap;

use crate::transform_registry::{RegistrationKey, RequestKey, TransformHandle, DEFAULT_NAME};

/// A single match rule of the resolution cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchRule {
    TypeScopeName,
    TypeName,
    TypeScopeOrigin,
    TypeOrigin,
    TypeScopeDefault,
    TypeDefault,
}

/// Rules tried for a named lookup, in order.
pub const NAMED_RULES: [MatchRule; 4] = [
    MatchRule::TypeScopeName,
    MatchRule::TypeName,
    MatchRule::TypeScopeOrigin,
    MatchRule::TypeOrigin,
];

/// Rules tried for a default lookup, in order.
pub const DEFAULT_RULES: [MatchRule; 2] = [MatchRule::TypeScopeDefault, MatchRule::TypeDefault];

impl MatchRule {
    /// One-based position of the rule across both cascades.
    pub fn tier(self) -> usize {
        match self {
            MatchRule::TypeScopeName => 1,
            MatchRule::TypeName => 2,
            MatchRule::TypeScopeOrigin => 3,
            MatchRule::TypeOrigin => 4,
            MatchRule::TypeScopeDefault => 5,
            MatchRule::TypeDefault => 6,
        }
    }

    /// Test a stored key against a request.
    pub fn matches(self, stored: &RegistrationKey, request: &RequestKey) -> bool {
        if stored.value_type != request.value_type {
            return false;
        }
        let same_scope = stored.scope == request.scope;

        match self {
            MatchRule::TypeScopeName => same_scope && stored.transform_name == request.transform_name,
            MatchRule::TypeName => stored.transform_name == request.transform_name,
            MatchRule::TypeScopeOrigin => same_scope && stored.source_name == request.origin_hint,
            MatchRule::TypeOrigin => stored.source_name == request.origin_hint,
            MatchRule::TypeScopeDefault => same_scope && stored.transform_name == DEFAULT_NAME,
            MatchRule::TypeDefault => stored.transform_name == DEFAULT_NAME,
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            MatchRule::TypeScopeName => "type + scope + name",
            MatchRule::TypeName => "type + name",
            MatchRule::TypeScopeOrigin => "type + scope + origin",
            MatchRule::TypeOrigin => "type + origin",
            MatchRule::TypeScopeDefault => "type + scope + default",
            MatchRule::TypeDefault => "type + default",
        };
        write!(f, "rule#{} ({})", self.tier(), description)
    }
}

/// Rules evaluated for the given lookup mode.
pub fn rules_for(want_default: bool) -> &'static [MatchRule] {
    if want_default {
        &DEFAULT_RULES
    } else {
        &NAMED_RULES
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub rule: MatchRule,
    pub key: &'a RegistrationKey,
    pub transform: &'a TransformHandle,
}

pub(crate) fn cascade<'a>(
    entries: &'a IndexMap<RegistrationKey, TransformHandle>,
    request: &RequestKey,
    want_default: bool,
) -> Option<Resolution<'a>> {
    for &rule in rules_for(want_default) {
        let found = entries.iter().find(|(key, _)| rule.matches(key, request));
        if let Some((key, transform)) = found {
            tracing::debug!("Found sanitizer [{}] by {}", request, rule);
            return Some(Resolution {
                rule,
                key,
                transform,
            });
        }
    }

    tracing::debug!("No sanitizer [{}] found", request);
    None
}
