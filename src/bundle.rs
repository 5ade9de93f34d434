use crate::data::{Image, Value};
use crate::error::ShellError;
use std::collections::BTreeSet;

/// The flags and arguments a command is invoked with.
///
/// Flags are boolean presence markers. Arguments keep the order in which they were
/// typed. A bundle is never modified once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    flags: BTreeSet<String>,
    arguments: Vec<(String, Value)>,
}

impl Bundle {
    pub fn new(flags: BTreeSet<String>, arguments: Vec<(String, Value)>) -> Self {
        Self { flags, arguments }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn has_argument(&self, id: &str) -> bool {
        self.arguments.iter().any(|(name, _)| name == id)
    }

    /// Arguments in the order they were given.
    pub fn arguments(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.arguments.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The raw value of an argument.
    ///
    /// A missing argument is a coder fault: the command's rules should have required it.
    pub fn argument(&self, id: &str) -> Result<&Value, ShellError> {
        self.get(id)
            .ok_or_else(|| ShellError::MissingArgument(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, value)| value)
    }

    pub fn text(&self, id: &str) -> Result<&str, ShellError> {
        self.argument(id)?.as_text()
    }

    pub fn integer(&self, id: &str) -> Result<i64, ShellError> {
        self.argument(id)?.as_integer()
    }

    pub fn image(&self, id: &str) -> Result<&Image, ShellError> {
        self.argument(id)?.as_image()
    }

    pub fn list(&self, id: &str) -> Result<&[Value], ShellError> {
        self.argument(id)?.as_list()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.arguments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ValueKind;

    fn sample() -> Bundle {
        Bundle::new(
            ["force".to_string()].into_iter().collect(),
            vec![
                ("w".to_string(), Value::Integer(3)),
                ("f".to_string(), Value::text("out")),
            ],
        )
    }

    #[test]
    fn test_accessors() {
        let bun = sample();
        assert!(bun.has_flag("force"));
        assert!(!bun.has_flag("w"));
        assert!(bun.has_argument("w"));
        assert_eq!(bun.integer("w").unwrap(), 3);
        assert_eq!(bun.text("f").unwrap(), "out");
        let order: Vec<&str> = bun.arguments().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["w", "f"]);
    }

    #[test]
    fn test_missing_and_mistyped_arguments_are_coder_faults() {
        let bun = sample();
        assert!(matches!(bun.argument("x"), Err(ShellError::MissingArgument(id)) if id == "x"));
        assert!(matches!(
            bun.text("w"),
            Err(ShellError::WrongType {
                expected: ValueKind::Text,
                found: ValueKind::Integer
            })
        ));
    }

    #[test]
    fn test_empty_bundle() {
        assert!(Bundle::default().is_empty());
        assert!(!sample().is_empty());
    }
}
