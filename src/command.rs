use crate::bundle::Bundle;
use crate::data::{Value, ValueKind};
use crate::error::ShellError;
use crate::interpreter::Context;
use crate::rule::Rule;

/// Object-safe trait for anything a module can expose as a command.
///
/// Commands are compared by name only. Implement it directly for commands with state of
/// their own, or wrap a closure in [`UncheckedCommand`] / [`CheckedCommand`].
pub trait Command: Send + Sync {
    /// Canonical name, e.g. "echo" or "modlist".
    fn name(&self) -> &str;

    /// One-line description shown by `help`.
    fn description(&self) -> &str {
        ""
    }

    /// Rules the bundle must satisfy before [`Command::invoke`] is called.
    fn rules(&self) -> &[Rule] {
        &[]
    }

    /// Tag the result is promised to carry. `None` means the result is not checked.
    fn returns(&self) -> Option<ValueKind> {
        None
    }

    /// Runs the command on an already validated bundle.
    fn invoke(&self, ctx: &mut Context<'_>, bundle: &Bundle) -> Result<Value, ShellError>;
}

type Body = Box<dyn Fn(&mut Context<'_>, &Bundle) -> Result<Value, ShellError> + Send + Sync>;

/// A command that declares no rules and whose result is not checked.
pub struct UncheckedCommand {
    name: String,
    description: String,
    body: Body,
}

impl UncheckedCommand {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Bundle) -> Result<Value, ShellError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            body: Box::new(body),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Command for UncheckedCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn invoke(&self, ctx: &mut Context<'_>, bundle: &Bundle) -> Result<Value, ShellError> {
        (self.body)(ctx, bundle)
    }
}

/// A command with argument rules and a promised result tag.
///
/// The interpreter validates the rules before the body runs and rejects a result of
/// any other tag as a coder fault.
pub struct CheckedCommand {
    name: String,
    description: String,
    rules: Vec<Rule>,
    returns: ValueKind,
    body: Body,
}

impl CheckedCommand {
    pub fn new<F>(name: impl Into<String>, returns: ValueKind, body: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Bundle) -> Result<Value, ShellError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            rules: Vec::new(),
            returns,
            body: Box::new(body),
        }
    }

    /// Appends a rule; rules are checked in the order they are added.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Command for CheckedCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn returns(&self) -> Option<ValueKind> {
        Some(self.returns)
    }

    fn invoke(&self, ctx: &mut Context<'_>, bundle: &Bundle) -> Result<Value, ShellError> {
        (self.body)(ctx, bundle)
    }
}
