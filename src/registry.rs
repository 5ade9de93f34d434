//! Loaded modules, command name resolution and the catalog of loadable libraries.

use crate::command::Command;
use crate::error::ShellError;
use crate::lexer::Token;
use crate::module::Module;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The command name at the head of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandName {
    /// `command`, looked up in every loaded module.
    Bare(String),
    /// `module.command`.
    Qualified { module: String, command: String },
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandName::Bare(command) => f.write_str(command),
            CommandName::Qualified { module, command } => write!(f, "{}.{}", module, command),
        }
    }
}

fn take_word(iter: &mut std::iter::Peekable<std::vec::IntoIter<Token>>) -> String {
    match iter.next_if(|t| matches!(t, Token::Word(_))) {
        Some(Token::Word(w)) => w,
        _ => String::new(),
    }
}

/// Splits the command name off the front of a non-empty token stream.
///
/// The head is `word ('.' word?)*`; everything after it is returned untouched for the
/// bundle builder.
pub fn split_command_name(tokens: Vec<Token>) -> Result<(CommandName, Vec<Token>), ShellError> {
    let mut iter = tokens.into_iter().peekable();
    match iter.peek() {
        Some(Token::Word(_) | Token::ModuleDelim) | None => {}
        Some(token) => return Err(ShellError::UnexpectedToken(token.to_string())),
    }

    let mut parts = vec![take_word(&mut iter)];
    while iter.next_if_eq(&Token::ModuleDelim).is_some() {
        parts.push(take_word(&mut iter));
    }

    let name = match parts.as_slice() {
        [command] => CommandName::Bare(command.clone()),
        [module, command] if !module.is_empty() && !command.is_empty() => CommandName::Qualified {
            module: module.clone(),
            command: command.clone(),
        },
        _ => return Err(ShellError::MalformedQualifiedName(parts.join("."))),
    };
    Ok((name, iter.collect()))
}

/// The set of currently loaded modules, keyed by module name.
///
/// Cloning is cheap: modules are shared, so a clone serves as a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module; a module of the same name must not already be loaded.
    pub fn add(&mut self, module: Module) -> Result<Arc<Module>, ShellError> {
        if self.modules.contains_key(module.name()) {
            return Err(ShellError::ModuleLoadFailure(format!(
                "module {} is already loaded",
                module.name()
            )));
        }
        let module = Arc::new(module);
        self.modules
            .insert(module.name().to_string(), Arc::clone(&module));
        Ok(module)
    }

    pub fn remove(&mut self, name: &str) -> Result<Arc<Module>, ShellError> {
        self.modules
            .remove(name)
            .ok_or_else(|| ShellError::NoSuchModule(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Loaded modules ordered by name.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Finds the command a name refers to, together with the module that owns it.
    pub fn resolve(&self, name: &CommandName) -> Result<(Arc<Module>, Arc<dyn Command>), ShellError> {
        match name {
            CommandName::Qualified { module, command } => {
                let owner = self
                    .modules
                    .get(module)
                    .ok_or_else(|| ShellError::NoSuchModule(module.clone()))?;
                let cmd = owner
                    .command(command)
                    .ok_or_else(|| ShellError::NoSuchCommand(name.to_string()))?;
                Ok((Arc::clone(owner), cmd))
            }
            CommandName::Bare(command) => {
                let mut owners = self
                    .modules
                    .values()
                    .filter(|module| module.has_command(command));
                match (owners.next(), owners.next()) {
                    (None, _) => Err(ShellError::NoSuchCommand(command.clone())),
                    (Some(owner), None) => {
                        let cmd = owner
                            .command(command)
                            .ok_or_else(|| ShellError::NoSuchCommand(command.clone()))?;
                        Ok((Arc::clone(owner), cmd))
                    }
                    (Some(_), Some(_)) => Err(ShellError::AmbiguousCommand {
                        command: command.clone(),
                        modules: self
                            .modules
                            .values()
                            .filter(|module| module.has_command(command))
                            .map(|module| module.name().to_string())
                            .collect(),
                    }),
                }
            }
        }
    }
}

/// Builds one module of a library.
pub type ModuleConstructor = fn() -> Result<Module, ShellError>;

/// Libraries of modules that can be loaded by name at runtime.
///
/// Every library is registered explicitly with the constructors of its modules.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    libraries: BTreeMap<String, Vec<ModuleConstructor>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, library: impl Into<String>, modules: Vec<ModuleConstructor>) {
        self.libraries.insert(library.into(), modules);
    }

    /// Constructs every module of `library`.
    pub fn instantiate(&self, library: &str) -> Result<Vec<Module>, ShellError> {
        let constructors = self
            .libraries
            .get(library)
            .ok_or_else(|| ShellError::ModuleLoadFailure(format!("no library named {}", library)))?;
        constructors
            .iter()
            .map(|construct| {
                construct().map_err(|err| {
                    ShellError::ModuleLoadFailure(format!("{} failed to build: {}", library, err))
                })
            })
            .collect()
    }
}
