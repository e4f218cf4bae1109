//! Field matching rules deciding which payload fields carry personal data.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Replacement written for fields handled by [`Handling::Redact`].
pub const REDACTED: &str = "[REDACTED]";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Field name equals the pattern, ignoring ASCII case.
    #[default]
    Exact,
    /// Field name matches the regular expression.
    Regex,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handling {
    /// Encrypt into the vault and replace with a token.
    #[default]
    Tokenize,
    /// Replace with [`REDACTED`] without storing the value.
    Redact,
}

/// One configured rule, as read from configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub pattern: String,
    #[serde(default)]
    pub kind: MatchKind,
    #[serde(default)]
    pub handling: Handling,
}

impl FieldRule {
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            pattern: name.into(),
            kind: MatchKind::Exact,
            handling: Handling::Tokenize,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: MatchKind::Regex,
            handling: Handling::Tokenize,
        }
    }

    pub fn redact(mut self) -> Self {
        self.handling = Handling::Redact;
        self
    }
}

#[derive(Debug, Clone)]
enum Compiled {
    Exact(String),
    Regex(Regex),
}

/// Compiled rule set. The first matching rule decides the handling.
#[derive(Debug, Clone, Default)]
pub struct FieldMatcher {
    rules: Vec<(Compiled, Handling)>,
}

impl FieldMatcher {
    pub fn new(rules: &[FieldRule]) -> VaultResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.pattern.is_empty() {
                return Err(VaultError::InvalidRule {
                    pattern: String::new(),
                    reason: "pattern must not be empty".into(),
                });
            }
            let matcher = match rule.kind {
                MatchKind::Exact => Compiled::Exact(rule.pattern.clone()),
                MatchKind::Regex => {
                    Compiled::Regex(Regex::new(&rule.pattern).map_err(|e| {
                        VaultError::InvalidRule {
                            pattern: rule.pattern.clone(),
                            reason: e.to_string(),
                        }
                    })?)
                }
            };
            compiled.push((matcher, rule.handling));
        }
        Ok(Self { rules: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Handling for a field with this name, if any rule matches.
    pub fn handling_for(&self, field: &str) -> Option<Handling> {
        self.rules.iter().find_map(|(rule, handling)| {
            let hit = match rule {
                Compiled::Exact(name) => name.eq_ignore_ascii_case(field),
                Compiled::Regex(re) => re.is_match(field),
            };
            hit.then_some(*handling)
        })
    }
}
