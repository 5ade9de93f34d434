//! Declarative preconditions a bundle must satisfy before a command runs.

use crate::bundle::Bundle;
use crate::data::ValueKind;
use crate::error::ShellError;

/// A rule attached to a command when it is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// The argument must be present.
    Require(String),
    /// If the argument is present it must carry this tag.
    TypeOf(ValueKind, String),
    /// Both arguments are present, or neither is.
    Corequire(String, String),
}

impl Rule {
    pub fn require(id: impl Into<String>) -> Self {
        Rule::Require(id.into())
    }

    pub fn type_of(kind: ValueKind, id: impl Into<String>) -> Self {
        Rule::TypeOf(kind, id.into())
    }

    pub fn corequire(id1: impl Into<String>, id2: impl Into<String>) -> Self {
        Rule::Corequire(id1.into(), id2.into())
    }

    pub fn validate(&self, bun: &Bundle) -> bool {
        match self {
            Rule::Require(id) => bun.has_argument(id),
            Rule::TypeOf(kind, id) => bun.get(id).is_none_or(|value| value.kind() == *kind),
            Rule::Corequire(id1, id2) => bun.has_argument(id1) == bun.has_argument(id2),
        }
    }

    /// Message shown to the user when the rule does not hold.
    pub fn violation(&self) -> String {
        match self {
            Rule::Require(id) => format!("The {} argument must be present.", id),
            Rule::TypeOf(kind, id) => {
                format!("The {} argument is of the wrong type, expected {}.", id, kind)
            }
            Rule::Corequire(id1, id2) => {
                format!("The {} and {} arguments must both be present.", id1, id2)
            }
        }
    }

    /// Short description used by `help`.
    pub fn describe(&self) -> String {
        match self {
            Rule::Require(id) => format!("{} is required", id),
            Rule::TypeOf(kind, id) => format!("{} must be {}", id, kind),
            Rule::Corequire(id1, id2) => format!("{} and {} go together", id1, id2),
        }
    }
}

/// Checks `rules` in order and reports the first one that fails.
pub fn validate(rules: &[Rule], bun: &Bundle) -> Result<(), ShellError> {
    match rules.iter().find(|rule| !rule.validate(bun)) {
        Some(rule) => Err(ShellError::RuleViolation(rule.violation())),
        None => Ok(()),
    }
}
