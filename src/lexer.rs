//! Lexical analysis (tokenization) of a command line.

use crate::error::ShellError;
use std::fmt;

pub const ESCAPE: char = '\\';
pub const QUOTE: char = '"';

/// A token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Contiguous text with quoting and escaping already resolved.
    Word(String),
    /// The list separator, `,`.
    Separator,
    /// The argument set operator, `=`.
    Assign,
    /// The flag marker, `-`.
    FlagMarker,
    /// The module delimiter, `.`.
    ModuleDelim,
    /// The previous-output marker, `^`.
    PreviousOutput,
    /// The macro marker, `;`.
    MacroMarker,
}

impl Token {
    /// The special token for `ch`, if `ch` is one of the special characters.
    pub fn special(ch: char) -> Option<Token> {
        match ch {
            ',' => Some(Token::Separator),
            '=' => Some(Token::Assign),
            '-' => Some(Token::FlagMarker),
            '.' => Some(Token::ModuleDelim),
            '^' => Some(Token::PreviousOutput),
            ';' => Some(Token::MacroMarker),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::Separator => f.write_str(","),
            Token::Assign => f.write_str("="),
            Token::FlagMarker => f.write_str("-"),
            Token::ModuleDelim => f.write_str("."),
            Token::PreviousOutput => f.write_str("^"),
            Token::MacroMarker => f.write_str(";"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    /// Runs the machine over the whole input in one pass.
    fn make_tokens(&mut self) -> Result<Vec<Token>, ShellError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_normal(ch, &mut out)?,
                LexingState::ReadingQuote => self.handle_quote(ch, &mut out)?,
            }
        }

        if self.state == LexingState::ReadingQuote {
            return Err(ShellError::UnterminatedQuote);
        }
        self.flush_word(&mut out);

        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Appends the character following an escape marker.
    fn take_escaped(&mut self) -> Result<(), ShellError> {
        match self.read_char() {
            Some(c) => {
                self.buffer.push(c);
                Ok(())
            }
            None => Err(ShellError::UnterminatedEscape),
        }
    }

    fn handle_normal(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), ShellError> {
        match ch {
            c if c.is_whitespace() => self.flush_word(out),
            ESCAPE => {
                self.take_escaped()?;
                self.state = LexingState::ReadingWord;
            }
            QUOTE => self.state = LexingState::ReadingQuote,
            // only a leading '-' marks a flag
            '-' if self.state == LexingState::ReadingWord => self.buffer.push('-'),
            c => match Token::special(c) {
                Some(token) => {
                    self.flush_word(out);
                    out.push(token);
                }
                None => {
                    self.buffer.push(c);
                    self.state = LexingState::ReadingWord;
                }
            },
        }
        Ok(())
    }

    fn handle_quote(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), ShellError> {
        match ch {
            ESCAPE => self.take_escaped()?,
            QUOTE => {
                // A closed quote is a token even when empty.
                out.push(Token::Word(std::mem::take(&mut self.buffer)));
                self.state = LexingState::Start;
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn flush_word(&mut self, out: &mut Vec<Token>) {
        if self.state == LexingState::ReadingWord {
            out.push(Token::Word(std::mem::take(&mut self.buffer)));
        }
        self.state = LexingState::Start;
    }
}

/// Splits a command line into tokens.
///
/// Whitespace separates words, `\` takes the next character literally, `"` quotes
/// everything up to the closing `"`, and each special character becomes its own token.
/// A `-` directly after word text stays part of the word.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, ShellError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}
