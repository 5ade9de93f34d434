//! Errors produced by every stage of the command pipeline.
//!
//! Errors fall into two families, see [`Fault`]: mistakes in what the user typed, and
//! programming errors in a module. Both are reported without stopping the shell.

use crate::data::ValueKind;
use thiserror::Error;

/// Who is to blame for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Bad input; shown to the user as is.
    User,
    /// A bug in a module; shown flagged as an internal error.
    Internal,
}

#[derive(Debug, Error)]
pub enum ShellError {
    // User faults
    #[error("The given command \"{0}\" does not exist.")]
    NoSuchCommand(String),
    #[error("The given module \"{0}\" does not exist or is not loaded.")]
    NoSuchModule(String),
    #[error(
        "Multiple modules have a command named \"{command}\" ({list}), please specify which one to run as module.command",
        list = .modules.join(", ")
    )]
    AmbiguousCommand {
        command: String,
        modules: Vec<String>,
    },
    #[error("The given string \"{0}\" is not a valid module.command name.")]
    MalformedQualifiedName(String),
    #[error("Macro does not exist: {0}")]
    UndefinedMacro(String),
    #[error("Macro marker is not followed by a macro name")]
    DanglingMacroMarker,
    #[error("No end literal marker found: \"")]
    UnterminatedQuote,
    #[error("Found no character to escape after \\")]
    UnterminatedEscape,
    #[error("{0}")]
    RuleViolation(String),
    #[error("There is no previous output to use")]
    NoPreviousOutput,
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Argument {0} is not followed by the set operator =")]
    MissingAssignment(String),
    #[error("Argument {0} does not have any content.")]
    MissingValue(String),
    #[error("Invalid flag: {0}")]
    InvalidFlag(String),
    #[error("Argument {0} is given more than once")]
    DuplicateArgument(String),
    #[error("macro {0} already has a definition.")]
    MacroExists(String),
    #[error("{0} macro does not exist")]
    NoSuchMacro(String),
    #[error("{0}")]
    BadUsage(String),
    #[error("Could not load module: {0}")]
    ModuleLoadFailure(String),
    #[error("Command was cancelled")]
    Cancelled,

    // Internal faults
    #[error("Code error: cannot convert type {found} into type {expected}")]
    WrongType {
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("Code error: list element of type {found} is not of type {expected}")]
    ListType {
        expected: ValueKind,
        found: ValueKind,
    },
    #[error(
        "Code error: accessed argument {0} that did not exist: check enforced rules to ensure the argument will be there"
    )]
    MissingArgument(String),
    #[error("Code error: module {module} defines command {command} twice")]
    DuplicateCommand { module: String, command: String },
    #[error("Code error: \"{0}\" is not a valid command, module or macro name")]
    InvalidCommandName(String),
    #[error("Code error: command {command} promised a {expected} result but returned {found}")]
    ResultTypeMismatch {
        command: String,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("Code error: chained calls nested deeper than {0} levels")]
    CallDepthExceeded(usize),
    #[error("Code error: command panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// A chained call failed; keeps the line that was being called.
    #[error("Error in call to \"{line}\": {source}")]
    Nested {
        line: String,
        #[source]
        source: Box<ShellError>,
    },
}

impl ShellError {
    pub fn fault(&self) -> Fault {
        use ShellError::*;
        match self {
            NoSuchCommand(_)
            | NoSuchModule(_)
            | AmbiguousCommand { .. }
            | MalformedQualifiedName(_)
            | UndefinedMacro(_)
            | DanglingMacroMarker
            | UnterminatedQuote
            | UnterminatedEscape
            | RuleViolation(_)
            | NoPreviousOutput
            | UnexpectedToken(_)
            | MissingAssignment(_)
            | MissingValue(_)
            | InvalidFlag(_)
            | DuplicateArgument(_)
            | MacroExists(_)
            | NoSuchMacro(_)
            | BadUsage(_)
            | ModuleLoadFailure(_)
            | Cancelled => Fault::User,
            WrongType { .. }
            | ListType { .. }
            | MissingArgument(_)
            | DuplicateCommand { .. }
            | InvalidCommandName(_)
            | ResultTypeMismatch { .. }
            | CallDepthExceeded(_)
            | Panicked(_)
            | Other(_) => Fault::Internal,
            Nested { source, .. } => source.fault(),
        }
    }

    /// The innermost error of a chain of nested calls.
    pub fn root_cause(&self) -> &ShellError {
        match self {
            ShellError::Nested { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), ShellError::Cancelled)
    }

    /// Wrap this error as the failure of a chained call to `line`.
    pub fn nested(self, line: impl Into<String>) -> Self {
        ShellError::Nested {
            line: line.into(),
            source: Box::new(self),
        }
    }
}
