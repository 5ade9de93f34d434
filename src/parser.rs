//! Turns the tokens after a command name into a [`Bundle`].
//!
//! Grammar, over the token stream:
//!
//! ```text
//! bundle     := item*
//! item       := flag | keyed
//! flag       := '-' '-'? word
//! keyed      := word '=' list_value
//! list_value := value (',' value)*
//! value      := '^' | '-'? word ('.' word)*
//! ```

use crate::bundle::Bundle;
use crate::data::Value;
use crate::error::ShellError;
use crate::lexer::Token;
use std::collections::BTreeSet;

struct BundleBuilder<'a> {
    tokens: Vec<Token>,
    pos: usize,
    previous: Option<&'a Value>,
}

impl<'a> BundleBuilder<'a> {
    fn from(tokens: Vec<Token>, previous: Option<&'a Value>) -> Self {
        BundleBuilder {
            tokens,
            pos: 0,
            previous,
        }
    }

    fn build(mut self) -> Result<Bundle, ShellError> {
        let mut flags = BTreeSet::new();
        let mut arguments: Vec<(String, Value)> = Vec::new();

        while let Some(token) = self.peek() {
            match token {
                Token::FlagMarker => {
                    flags.insert(self.parse_flag()?);
                }
                Token::Word(_) => {
                    let (name, value) = self.parse_keyed()?;
                    if arguments.iter().any(|(n, _)| *n == name) {
                        return Err(ShellError::DuplicateArgument(name));
                    }
                    arguments.push((name, value));
                }
                other => return Err(ShellError::UnexpectedToken(other.to_string())),
            }
        }

        Ok(Bundle::new(flags, arguments))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_n(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse a flag: '-' '-'? word
    fn parse_flag(&mut self) -> Result<String, ShellError> {
        self.consume();
        if self.peek() == Some(&Token::FlagMarker) {
            self.consume();
        }
        match self.consume() {
            Some(Token::Word(flag)) if !flag.is_empty() => Ok(flag),
            Some(token) => Err(ShellError::InvalidFlag(format!("-{}", token))),
            None => Err(ShellError::InvalidFlag("-".to_string())),
        }
    }

    /// Parse a keyed argument: word '=' list_value
    fn parse_keyed(&mut self) -> Result<(String, Value), ShellError> {
        let name = match self.consume() {
            Some(Token::Word(name)) => name,
            Some(token) => return Err(ShellError::UnexpectedToken(token.to_string())),
            None => unreachable!("parse_keyed is only called on a word"),
        };
        if self.peek() != Some(&Token::Assign) {
            return Err(ShellError::MissingAssignment(name));
        }
        self.consume();

        let first = self.parse_value(&name)?;
        if self.peek() != Some(&Token::Separator) {
            return Ok((name, first));
        }

        let mut items = vec![first];
        while self.peek() == Some(&Token::Separator) {
            self.consume();
            items.push(self.parse_value(&name)?);
        }
        Ok((name, Value::List(items)))
    }

    /// Parse a single value: '^' | '-'? word ('.' word)*
    fn parse_value(&mut self, name: &str) -> Result<Value, ShellError> {
        match self.peek() {
            Some(Token::PreviousOutput) => {
                self.consume();
                return self.previous.cloned().ok_or(ShellError::NoPreviousOutput);
            }
            Some(Token::Word(_)) => {}
            Some(Token::FlagMarker) if matches!(self.peek_n(1), Some(Token::Word(_))) => {}
            _ => return Err(ShellError::MissingValue(name.to_string())),
        }

        let mut raw = String::new();
        if self.peek() == Some(&Token::FlagMarker) {
            self.consume();
            raw.push('-');
        }
        if let Some(Token::Word(w)) = self.consume() {
            raw.push_str(&w);
        }
        while self.peek() == Some(&Token::ModuleDelim) && matches!(self.peek_n(1), Some(Token::Word(_))) {
            self.consume();
            if let Some(Token::Word(w)) = self.consume() {
                raw.push('.');
                raw.push_str(&w);
            }
        }

        Ok(parse_data(&raw))
    }
}

/// Converts raw argument text: integers become [`Value::Integer`], anything else text.
pub fn parse_data(raw: &str) -> Value {
    match raw.parse::<i64>() {
        Ok(i) => Value::Integer(i),
        Err(_) => Value::text(raw),
    }
}

/// Builds the bundle for the tokens following a command name.
///
/// `previous` is the output of the last command, substituted wherever `^` appears as a
/// value.
pub fn build_bundle(tokens: Vec<Token>, previous: Option<&Value>) -> Result<Bundle, ShellError> {
    BundleBuilder::from(tokens, previous).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;

    fn build(line: &str, previous: Option<&Value>) -> Result<Bundle, ShellError> {
        build_bundle(split_into_tokens(line)?, previous)
    }

    #[test]
    fn test_flags_and_keyed_arguments() {
        let bun = build("-force w=5 f=\"my file\" --all", None).unwrap();
        assert!(bun.has_flag("force"));
        assert!(bun.has_flag("all"));
        assert_eq!(bun.integer("w").unwrap(), 5);
        assert_eq!(bun.text("f").unwrap(), "my file");
        let order: Vec<&str> = bun.arguments().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["w", "f"]);
    }

    #[test]
    fn test_previous_output_substitution() {
        let prev = Value::text("5");
        let bun = build("x=^", Some(&prev)).unwrap();
        assert_eq!(bun.argument("x").unwrap(), &Value::text("5"));

        assert!(matches!(build("x=^", None), Err(ShellError::NoPreviousOutput)));
    }

    #[test]
    fn test_list_values() {
        let prev = Value::Integer(9);
        let bun = build("values=1,two,^", Some(&prev)).unwrap();
        assert_eq!(
            bun.argument("values").unwrap(),
            &Value::List(vec![Value::Integer(1), Value::text("two"), Value::Integer(9)])
        );
    }

    #[test]
    fn test_negative_numbers_and_dotted_text() {
        let bun = build("n=-12 f=out.txt r=1.5", None).unwrap();
        assert_eq!(bun.integer("n").unwrap(), -12);
        assert_eq!(bun.text("f").unwrap(), "out.txt");
        assert_eq!(bun.text("r").unwrap(), "1.5");
    }

    #[test]
    fn test_dash_inside_value_is_text() {
        let bun = build("words=hello-world -n d=2026-10-14", None).unwrap();
        assert_eq!(bun.text("words").unwrap(), "hello-world");
        assert_eq!(bun.text("d").unwrap(), "2026-10-14");
        assert!(bun.has_flag("n"));
        assert!(!bun.has_flag("world"));
    }

    #[test]
    fn test_quoted_integer_still_parses() {
        let bun = build("n=\"42\"", None).unwrap();
        assert_eq!(bun.integer("n").unwrap(), 42);
    }

    #[test]
    fn test_missing_assignment_names_token() {
        assert!(matches!(
            build("w 5", None),
            Err(ShellError::MissingAssignment(name)) if name == "w"
        ));
    }

    #[test]
    fn test_missing_value() {
        assert!(matches!(build("w=", None), Err(ShellError::MissingValue(n)) if n == "w"));
        assert!(matches!(build("w=,1", None), Err(ShellError::MissingValue(_))));
        assert!(matches!(build("w=1,", None), Err(ShellError::MissingValue(_))));
    }

    #[test]
    fn test_invalid_flags() {
        assert!(matches!(build("-", None), Err(ShellError::InvalidFlag(_))));
        assert!(matches!(build("-=x", None), Err(ShellError::InvalidFlag(_))));
        assert!(matches!(build("---x", None), Err(ShellError::InvalidFlag(_))));
    }

    #[test]
    fn test_stray_special_token() {
        assert!(matches!(
            build("=5", None),
            Err(ShellError::UnexpectedToken(t)) if t == "="
        ));
        assert!(matches!(build("^", None), Err(ShellError::UnexpectedToken(_))));
    }

    #[test]
    fn test_duplicate_argument() {
        assert!(matches!(
            build("a=1 a=2", None),
            Err(ShellError::DuplicateArgument(n)) if n == "a"
        ));
    }

    #[test]
    fn test_empty_bundle() {
        assert!(build("", None).unwrap().is_empty());
    }
}
