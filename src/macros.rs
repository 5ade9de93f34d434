//! Named text substitutions expanded once per use.

use crate::error::ShellError;
use crate::lexer::{self, Token};
use crate::module::is_valid_name;
use std::collections::BTreeMap;

/// Mapping from macro name to its raw expansion text.
///
/// Expansions are stored untokenized and are tokenized again on every use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    macros: BTreeMap<String, String>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new macro; fails if the name already has a definition.
    pub fn add(&mut self, name: &str, expansion: &str) -> Result<(), ShellError> {
        check_name(name)?;
        if self.macros.contains_key(name) {
            return Err(ShellError::MacroExists(name.to_string()));
        }
        self.macros.insert(name.to_string(), expansion.to_string());
        Ok(())
    }

    /// Creates or overwrites a macro.
    pub fn edit(&mut self, name: &str, expansion: &str) -> Result<(), ShellError> {
        check_name(name)?;
        self.macros.insert(name.to_string(), expansion.to_string());
        Ok(())
    }

    /// Removes a macro, returning its expansion.
    pub fn delete(&mut self, name: &str) -> Result<String, ShellError> {
        self.macros
            .remove(name)
            .ok_or_else(|| ShellError::NoSuchMacro(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.macros.get(name).map(String::as_str)
    }

    /// All macros ordered by name.
    pub fn list(&self) -> impl Iterator<Item = (&str, &str)> {
        self.macros.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Replaces every `;name;` (or `;name`) reference with the tokens of its expansion.
    ///
    /// Tokens coming out of an expansion are not scanned again, so a macro whose body
    /// mentions another macro yields the literal reference.
    pub fn expand(&self, tokens: Vec<Token>) -> Result<Vec<Token>, ShellError> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter().peekable();

        while let Some(token) = iter.next() {
            if token != Token::MacroMarker {
                out.push(token);
                continue;
            }
            let name = match iter.next() {
                Some(Token::Word(name)) => name,
                _ => return Err(ShellError::DanglingMacroMarker),
            };
            // optional closing marker
            iter.next_if_eq(&Token::MacroMarker);

            let body = self
                .get(&name)
                .ok_or_else(|| ShellError::UndefinedMacro(name.clone()))?;
            tracing::debug!(macro_name = %name, body, "expanding macro");
            out.extend(lexer::split_into_tokens(body)?);
        }

        Ok(out)
    }
}

fn check_name(name: &str) -> Result<(), ShellError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ShellError::BadUsage(format!(
            "\"{}\" is not a valid macro name",
            name
        )))
    }
}

impl From<BTreeMap<String, String>> for MacroTable {
    fn from(macros: BTreeMap<String, String>) -> Self {
        Self { macros }
    }
}
