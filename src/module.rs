//! Named groups of commands and the commands every module gets for free.

use crate::bundle::Bundle;
use crate::command::{CheckedCommand, Command};
use crate::data::{Color, Value, ValueKind};
use crate::error::ShellError;
use crate::interpreter::Context;
use crate::rule::Rule;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^\s",=.^;\\-]+$"#).expect("name pattern compiles")
});

/// Whether `name` can be used for a module, a command or a macro.
///
/// Names are non-empty and contain no whitespace, no quote or escape character and
/// none of the special token characters.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// A named, versioned group of commands.
///
/// Built once through [`ModuleBuilder`] and shared read-only afterwards.
pub struct Module {
    name: String,
    version: String,
    color: Color,
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl Module {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder {
            name: name.into(),
            version: version.into(),
            color: Color::Plain,
            commands: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Commands ordered by name, implicit ones included.
    pub fn commands(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.values().map(|cmd| cmd.as_ref())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct ModuleBuilder {
    name: String,
    version: String,
    color: Color,
    commands: Vec<Arc<dyn Command>>,
}

impl ModuleBuilder {
    /// Color used when the module's name is listed.
    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn command(mut self, command: impl Command + 'static) -> Self {
        self.commands.push(Arc::new(command));
        self
    }

    /// Assembles the module, adding `version`, `cmdlist` and `help` first.
    ///
    /// Fails with [`ShellError::InvalidCommandName`] or [`ShellError::DuplicateCommand`];
    /// both are mistakes in the module's code.
    pub fn build(self) -> Result<Module, ShellError> {
        if !is_valid_name(&self.name) {
            return Err(ShellError::InvalidCommandName(self.name));
        }

        let mut commands: BTreeMap<String, Arc<dyn Command>> = BTreeMap::new();
        let implicit = implicit_commands().into_iter();
        for command in implicit.chain(self.commands) {
            let name = command.name().to_string();
            if !is_valid_name(&name) {
                return Err(ShellError::InvalidCommandName(name));
            }
            if commands.contains_key(&name) {
                return Err(ShellError::DuplicateCommand {
                    module: self.name,
                    command: name,
                });
            }
            commands.insert(name, command);
        }

        Ok(Module {
            name: self.name,
            version: self.version,
            color: self.color,
            commands,
        })
    }
}

fn implicit_commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(
            CheckedCommand::new("version", ValueKind::Text, version).describe("Shows the module version"),
        ),
        Arc::new(
            CheckedCommand::new("cmdlist", ValueKind::List, cmdlist)
                .describe("Lists the commands of the module"),
        ),
        Arc::new(
            CheckedCommand::new("help", ValueKind::List, help)
                .rule(Rule::type_of(ValueKind::Text, "cmd"))
                .describe("Describes the module, or one of its commands with cmd=<name>"),
        ),
    ]
}

fn version(ctx: &mut Context<'_>, _bun: &Bundle) -> Result<Value, ShellError> {
    Ok(Value::colored(ctx.module().version(), Color::Aqua))
}

fn cmdlist(ctx: &mut Context<'_>, _bun: &Bundle) -> Result<Value, ShellError> {
    let names = ctx
        .module()
        .commands()
        .map(|cmd| Value::text(cmd.name()))
        .collect();
    Ok(Value::List(names))
}

fn help(ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
    let module = ctx.module();
    let Some(Value::Text(name, _)) = bun.get("cmd") else {
        return Ok(Value::List(vec![
            Value::colored(
                format!("{} {}", module.name(), module.version()),
                module.color(),
            ),
            Value::colored(
                format!("Run {}.cmdlist to see the available commands.", module.name()),
                Color::Gray,
            ),
        ]));
    };

    let command = module
        .command(name)
        .ok_or_else(|| ShellError::NoSuchCommand(format!("{}.{}", module.name(), name)))?;
    let mut lines = vec![Value::colored(
        format!("{}.{}", module.name(), command.name()),
        module.color(),
    )];
    if !command.description().is_empty() {
        lines.push(Value::text(command.description()));
    }
    lines.extend(
        command
            .rules()
            .iter()
            .map(|rule| Value::colored(rule.describe(), Color::Gray)),
    );
    if let Some(kind) = command.returns() {
        lines.push(Value::colored(format!("returns {}", kind), Color::Gray));
    }
    Ok(Value::List(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::UncheckedCommand;

    fn noop(name: &str) -> UncheckedCommand {
        UncheckedCommand::new(name, |_ctx, _bun| Ok(Value::None))
    }

    #[test]
    fn test_valid_names() {
        for name in ["echo", "wah!", "wah?", "bimage", "x_1"] {
            assert!(is_valid_name(name), "{name}");
        }
        for name in ["", "a b", "a.b", "a-b", "a=b", "a,b", "a^", ";a", "a\"", "a\\b", "a\tb"] {
            assert!(!is_valid_name(name), "{name}");
        }
    }

    #[test]
    fn test_implicit_commands_are_added() {
        let module = Module::builder("text", "1").command(noop("echo")).build().unwrap();
        let names: Vec<&str> = module.commands().map(|c| c.name()).collect();
        assert_eq!(names, vec!["cmdlist", "echo", "help", "version"]);
    }

    #[test]
    fn test_duplicate_command() {
        let err = Module::builder("m", "1")
            .command(noop("go"))
            .command(noop("go"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ShellError::DuplicateCommand { command, .. } if command == "go"));
    }

    #[test]
    fn test_collision_with_implicit_command() {
        let err = Module::builder("m", "1").command(noop("help")).build().unwrap_err();
        assert!(matches!(err, ShellError::DuplicateCommand { command, .. } if command == "help"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(matches!(
            Module::builder("m", "1").command(noop("bad name")).build(),
            Err(ShellError::InvalidCommandName(_))
        ));
        assert!(matches!(
            Module::builder("a.b", "1").build(),
            Err(ShellError::InvalidCommandName(_))
        ));
    }
}
