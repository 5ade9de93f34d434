use crate::data::{Value, ValueKind};
use crate::dispatcher::CancelToken;
use crate::error::ShellError;
use crate::macros::MacroTable;
use crate::module::Module;
use crate::output::Renderer;
use crate::registry::{ModuleCatalog, ModuleRegistry};
use crate::store::MacroStore;
use crate::{lexer, parser, registry, rule, system};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Deepest chain of nested calls a single step may build.
pub const MAX_CALL_DEPTH: usize = 64;

/// Owns the loaded modules, the macro table and the output of the last command, and runs
/// one line at a time through the pipeline
/// tokenize → expand macros → resolve → build bundle → validate → invoke.
///
/// The system module is always loaded. Other modules come from the [`ModuleCatalog`].
///
/// Example
/// ```
/// use wah_shell::{Interpreter, ModuleCatalog, RecordingRenderer, Value};
/// let mut sh = Interpreter::new(ModuleCatalog::new(), Box::new(RecordingRenderer::new())).unwrap();
/// assert_eq!(sh.execute("wah!").unwrap(), Some(Value::text("Wah!")));
/// ```
pub struct Interpreter {
    registry: ModuleRegistry,
    macros: MacroTable,
    previous: Option<Value>,
    catalog: ModuleCatalog,
    renderer: Box<dyn Renderer>,
    store: Option<Box<dyn MacroStore>>,
    should_exit: bool,
}

impl Interpreter {
    pub fn new(catalog: ModuleCatalog, renderer: Box<dyn Renderer>) -> Result<Self, ShellError> {
        let mut registry = ModuleRegistry::new();
        registry.add(system::system_module()?)?;
        Ok(Self {
            registry,
            macros: MacroTable::new(),
            previous: None,
            catalog,
            renderer,
            store: None,
            should_exit: false,
        })
    }

    /// Attaches persistent macro storage, merging its macros into the table.
    ///
    /// Macros already in the table win over stored ones of the same name.
    pub fn set_macro_store(&mut self, store: Box<dyn MacroStore>) -> anyhow::Result<()> {
        for (name, body) in store.load()? {
            if self.macros.get(&name).is_none() {
                self.macros.edit(&name, &body)?;
            }
        }
        self.store = Some(store);
        Ok(())
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn macros_mut(&mut self) -> &mut MacroTable {
        &mut self.macros
    }

    pub fn previous_output(&self) -> Option<&Value> {
        self.previous.as_ref()
    }

    /// Set once the `exit` command has run.
    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn request_exit(&mut self) {
        self.should_exit = true;
    }

    /// Loads a module built outside of any library.
    pub fn register_module(&mut self, module: Module) -> Result<(), ShellError> {
        let module = self.registry.add(module)?;
        tracing::info!(module = module.name(), "module registered");
        Ok(())
    }

    /// Loads every module of a library. Nothing is loaded if any of them fails.
    pub fn load_library(&mut self, library: &str) -> Result<Vec<String>, ShellError> {
        let modules = self.catalog.instantiate(library)?;
        if let Some(taken) = modules.iter().find(|m| self.registry.is_loaded(m.name())) {
            return Err(ShellError::ModuleLoadFailure(format!(
                "module {} is already loaded",
                taken.name()
            )));
        }
        let mut names = Vec::with_capacity(modules.len());
        for module in modules {
            names.push(self.registry.add(module)?.name().to_string());
        }
        tracing::info!(library, modules = ?names, "library loaded");
        Ok(names)
    }

    /// Loads the single module `name` of a library.
    pub fn load_module(&mut self, library: &str, name: &str) -> Result<(), ShellError> {
        let module = self
            .catalog
            .instantiate(library)?
            .into_iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| {
                ShellError::ModuleLoadFailure(format!("library {} has no module {}", library, name))
            })?;
        self.registry.add(module)?;
        tracing::info!(library, module = name, "module loaded");
        Ok(())
    }

    pub fn unload_module(&mut self, name: &str) -> Result<(), ShellError> {
        if name == system::SYSTEM_MODULE {
            return Err(ShellError::BadUsage(format!(
                "the {} module cannot be unloaded",
                name
            )));
        }
        self.registry.remove(name)?;
        tracing::info!(module = name, "module unloaded");
        Ok(())
    }

    /// Runs one line as a top-level step and remembers its result as the previous output.
    ///
    /// Empty lines yield `Ok(None)` and leave the previous output alone.
    pub fn execute(&mut self, line: &str) -> Result<Option<Value>, ShellError> {
        self.step(line, &CancelToken::new())
    }

    /// Runs one line the way a handler's chained call does: the previous output is left
    /// untouched and an empty line yields [`Value::None`].
    pub fn call(&mut self, line: &str) -> Result<Value, ShellError> {
        self.evaluate(line, &CancelToken::new(), 0)
            .map(|value| value.unwrap_or(Value::None))
    }

    /// Worker entry point: echoes the line, runs it, and routes the outcome to the renderer.
    ///
    /// A step that ends cancelled, or whose handler panics, leaves the registry and the
    /// macro table exactly as they were before it started. The returned result has already been rendered or reported.
    pub fn run(&mut self, line: &str, token: &CancelToken) -> Result<Option<Value>, ShellError> {
        if let Err(err) = self.renderer.echo(line) {
            tracing::warn!(%err, "failed to echo line");
        }
        let outcome = self.step(line, token);
        let written = match &outcome {
            Ok(Some(value)) => self.renderer.render(value),
            Ok(None) => Ok(()),
            Err(err) => self.renderer.report_error(err),
        };
        if let Err(err) = written {
            tracing::warn!(%err, "failed to write output");
        }
        outcome
    }

    fn step(&mut self, line: &str, token: &CancelToken) -> Result<Option<Value>, ShellError> {
        let registry = self.registry.clone();
        let macros = self.macros.clone();

        let evaluated = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(line, token, 0)));
        let outcome = match evaluated {
            Ok(Ok(_)) if token.is_cancelled() => Err(ShellError::Cancelled),
            Ok(other) => other,
            Err(payload) => Err(ShellError::Panicked(panic_message(payload.as_ref()))),
        };

        match outcome {
            Err(err) if err.is_cancelled() || matches!(err, ShellError::Panicked(_)) => {
                tracing::warn!(line, %err, "step aborted, restoring state");
                self.registry = registry;
                self.macros = macros;
                self.should_exit = false;
                Err(err)
            }
            outcome => {
                self.persist_macros(&macros);
                if let Ok(Some(value)) = &outcome {
                    self.previous = Some(value.clone());
                }
                outcome
            }
        }
    }

    /// Forwards the difference between `before` and the current table to the store.
    fn persist_macros(&mut self, before: &MacroTable) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let changed = self
            .macros
            .list()
            .filter(|(name, body)| before.get(name) != Some(*body))
            .map(|(name, body)| (name, Some(body)));
        let removed = before
            .list()
            .filter(|(name, _)| self.macros.get(name).is_none())
            .map(|(name, _)| (name, None));
        for (name, body) in changed.chain(removed) {
            if let Err(err) = store.persist(name, body) {
                tracing::warn!(macro_name = name, error = %err, "failed to persist macro");
            }
        }
    }

    fn evaluate(
        &mut self,
        line: &str,
        token: &CancelToken,
        depth: usize,
    ) -> Result<Option<Value>, ShellError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(ShellError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        token.checkpoint()?;

        let tokens = self.macros.expand(lexer::split_into_tokens(line)?)?;
        if tokens.is_empty() {
            return Ok(None);
        }
        tracing::debug!(?tokens, depth, "tokenized line");

        let (name, rest) = registry::split_command_name(tokens)?;
        let (module, command) = self.registry.resolve(&name)?;
        tracing::debug!(module = module.name(), command = command.name(), "resolved command");

        let bundle = parser::build_bundle(rest, self.previous.as_ref())?;
        tracing::debug!(?bundle, "built bundle");
        rule::validate(command.rules(), &bundle)?;

        let mut ctx = Context {
            interp: self,
            module,
            token: token.clone(),
            depth: depth + 1,
        };
        let value = command.invoke(&mut ctx, &bundle)?;

        match command.returns() {
            Some(expected) if value.kind() != expected => Err(ShellError::ResultTypeMismatch {
                command: command.name().to_string(),
                expected,
                found: value.kind(),
            }),
            _ => Ok(Some(value)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What a running command can see and do.
///
/// Handed to [`Command::invoke`](crate::Command::invoke) for the duration of one call.
pub struct Context<'a> {
    interp: &'a mut Interpreter,
    module: Arc<Module>,
    token: CancelToken,
    depth: usize,
}

impl Context<'_> {
    /// The module that owns the running command.
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.interp.registry
    }

    pub fn macros(&self) -> &MacroTable {
        &self.interp.macros
    }

    pub fn macros_mut(&mut self) -> &mut MacroTable {
        &mut self.interp.macros
    }

    pub fn load_library(&mut self, library: &str) -> Result<Vec<String>, ShellError> {
        self.interp.load_library(library)
    }

    pub fn load_module(&mut self, library: &str, name: &str) -> Result<(), ShellError> {
        self.interp.load_module(library, name)
    }

    pub fn unload_module(&mut self, name: &str) -> Result<(), ShellError> {
        self.interp.unload_module(name)
    }

    pub fn request_exit(&mut self) {
        self.interp.request_exit();
    }

    /// Shows a value right away, before the command returns.
    pub fn print(&mut self, value: &Value) -> Result<(), ShellError> {
        self.interp
            .renderer
            .render(value)
            .map_err(|err| ShellError::Other(err.into()))
    }

    /// Runs another line and returns its result.
    ///
    /// Failures come back wrapped in [`ShellError::Nested`]. The previous output is the
    /// same one the calling command saw.
    pub fn call(&mut self, line: &str) -> Result<Value, ShellError> {
        self.interp
            .evaluate(line, &self.token, self.depth)
            .map(|value| value.unwrap_or(Value::None))
            .map_err(|err| err.nested(line))
    }

    /// Like [`Context::call`], and the result must carry the tag `kind`.
    pub fn call_expecting(&mut self, line: &str, kind: ValueKind) -> Result<Value, ShellError> {
        self.call(line)?
            .expect_kind(kind)
            .map_err(|err| err.nested(line))
    }

    /// Fails with [`ShellError::Cancelled`] once the step has been interrupted.
    pub fn checkpoint(&self) -> Result<(), ShellError> {
        self.token.checkpoint()
    }

    /// Waits for `duration`, returning early with [`ShellError::Cancelled`] if interrupted.
    pub fn sleep(&self, duration: Duration) -> Result<(), ShellError> {
        self.token.sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CheckedCommand, UncheckedCommand};
    use crate::error::Fault;
    use crate::output::{RecordingRenderer, Rendered};
    use crate::rule::Rule;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    fn interpreter() -> Interpreter {
        Interpreter::new(ModuleCatalog::new(), Box::new(RecordingRenderer::new())).unwrap()
    }

    fn chain_module() -> Module {
        Module::builder("chn", "1")
            .command(UncheckedCommand::new("chn1", |ctx, _bun| ctx.call("chn2")))
            .command(UncheckedCommand::new("chn2", |ctx, _bun| ctx.call("chn3 -hey")))
            .command(UncheckedCommand::new("chn3", |_ctx, bun| {
                Ok(Value::text(if bun.has_flag("hey") { "deep" } else { "flat" }))
            }))
            .command(UncheckedCommand::new("loop", |ctx, _bun| ctx.call("loop")))
            .command(CheckedCommand::new("liar", ValueKind::Integer, |_ctx, _bun| {
                Ok(Value::text("not a number"))
            }))
            .command(
                CheckedCommand::new("need", ValueKind::Integer, |_ctx, bun| {
                    Ok(Value::Integer(bun.integer("x")? * 2))
                })
                .rule(Rule::require("x"))
                .rule(Rule::type_of(ValueKind::Integer, "x")),
            )
            .command(UncheckedCommand::new("badchain", |ctx, _bun| {
                ctx.call_expecting("chn3", ValueKind::Integer)
            }))
            .build()
            .unwrap()
    }

    fn with_chain() -> Interpreter {
        let mut sh = interpreter();
        sh.register_module(chain_module()).unwrap();
        sh
    }

    #[test]
    fn test_previous_output_slot() {
        let mut sh = with_chain();
        assert!(matches!(sh.execute("need x=^"), Err(ShellError::NoPreviousOutput)));
        sh.execute("string i=5").unwrap();
        assert_eq!(sh.previous_output(), Some(&Value::text("5")));
        assert!(matches!(sh.execute("need x=^"), Err(ShellError::RuleViolation(_))));
        sh.execute("need x=4").unwrap();
        assert_eq!(sh.execute("need x=^").unwrap(), Some(Value::Integer(16)));
    }

    #[test]
    fn test_empty_line_is_noop() {
        let mut sh = interpreter();
        sh.execute("wah!").unwrap();
        assert_eq!(sh.execute("   ").unwrap(), None);
        assert_eq!(sh.previous_output(), Some(&Value::text("Wah!")));
    }

    #[test]
    fn test_chained_calls() {
        let mut sh = with_chain();
        assert_eq!(sh.execute("chn1").unwrap(), Some(Value::text("deep")));
        assert_eq!(sh.call("chn.chn3").unwrap(), Value::text("flat"));
    }

    #[test]
    fn test_nested_calls_do_not_touch_previous_output() {
        let mut sh = with_chain();
        sh.execute("string i=first").unwrap();
        sh.call("chn1").unwrap();
        assert_eq!(sh.previous_output(), Some(&Value::text("first")));
    }

    #[test]
    fn test_nested_failure_keeps_cause() {
        let mut sh = with_chain();
        let err = sh.execute("badchain").unwrap_err();
        assert!(matches!(err, ShellError::Nested { ref line, .. } if line == "chn3"));
        assert!(matches!(err.root_cause(), ShellError::WrongType { .. }));
        assert_eq!(err.fault(), Fault::Internal);
    }

    #[test]
    fn test_call_depth_is_bounded() {
        let mut sh = with_chain();
        let err = sh.execute("loop").unwrap_err();
        assert!(matches!(err.root_cause(), ShellError::CallDepthExceeded(MAX_CALL_DEPTH)));
    }

    #[test]
    fn test_result_tag_is_checked() {
        let mut sh = with_chain();
        assert!(matches!(
            sh.execute("liar"),
            Err(ShellError::ResultTypeMismatch { expected: ValueKind::Integer, found: ValueKind::Text, .. })
        ));
    }

    #[test]
    fn test_macros_expand_before_resolution() {
        let mut sh = with_chain();
        sh.macros_mut().add("deep", "chn.chn3 -hey").unwrap();
        assert_eq!(sh.execute(";deep;").unwrap(), Some(Value::text("deep")));
    }

    #[test]
    fn test_run_reports_errors_and_values() {
        let (renderer, record) = RecordingRenderer::with_handle();
        let mut sh = Interpreter::new(ModuleCatalog::new(), Box::new(renderer)).unwrap();
        sh.run("wah!", &CancelToken::new()).unwrap();
        sh.run("nope", &CancelToken::new()).unwrap_err();
        let record = record.lock();
        assert_eq!(record[0], Rendered::Echo("wah!".into()));
        assert_eq!(record[1], Rendered::Value(Value::text("Wah!")));
        assert!(matches!(&record[3], Rendered::Error { fault: Fault::User, .. }));
    }

    #[test]
    fn test_cancelled_step_restores_state() {
        let mut sh = interpreter();
        sh.register_module(
            Module::builder("slow", "1")
                .command(UncheckedCommand::new("mangle", |ctx, _bun| {
                    ctx.macros_mut().add("temp", "wah!")?;
                    ctx.unload_module("slow")?;
                    Err(ShellError::Cancelled)
                }))
                .build()
                .unwrap(),
        )
        .unwrap();
        sh.execute("wah!").unwrap();

        let err = sh.execute("mangle").unwrap_err();
        assert!(err.is_cancelled());
        assert!(sh.macros().is_empty());
        assert!(sh.registry().is_loaded("slow"));
        assert_eq!(sh.previous_output(), Some(&Value::text("Wah!")));
    }

    #[test]
    fn test_token_set_during_handler_counts_as_cancelled() {
        let mut sh = interpreter();
        let token = CancelToken::new();
        let inner = token.clone();
        sh.register_module(
            Module::builder("m", "1")
                .command(UncheckedCommand::new("trip", move |ctx, _bun| {
                    ctx.macros_mut().add("x", "y")?;
                    inner.cancel();
                    Ok(Value::Integer(1))
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

        assert!(sh.run("trip", &token).unwrap_err().is_cancelled());
        assert!(sh.macros().get("x").is_none());
        assert!(sh.previous_output().is_none());
    }

    #[test]
    fn test_panicking_handler_is_an_internal_fault() {
        let (renderer, record) = RecordingRenderer::with_handle();
        let mut sh = Interpreter::new(ModuleCatalog::new(), Box::new(renderer)).unwrap();
        sh.register_module(
            Module::builder("m", "1")
                .command(UncheckedCommand::new("boom", |ctx, _bun| {
                    ctx.macros_mut().add("x", "y")?;
                    panic!("handler blew up");
                }))
                .build()
                .unwrap(),
        )
        .unwrap();

        let err = sh.run("boom", &CancelToken::new()).unwrap_err();
        assert!(matches!(&err, ShellError::Panicked(msg) if msg == "handler blew up"));
        assert!(sh.macros().get("x").is_none());
        assert!(matches!(
            record.lock().last(),
            Some(Rendered::Error { fault: Fault::Internal, .. })
        ));
        assert_eq!(sh.execute("wah!").unwrap(), Some(Value::text("Wah!")));
    }

    #[test]
    fn test_unload_system_module_refused() {
        let mut sh = interpreter();
        assert!(matches!(sh.unload_module("wah"), Err(ShellError::BadUsage(_))));
        assert!(matches!(sh.unload_module("nope"), Err(ShellError::NoSuchModule(_))));
    }

    #[derive(Clone, Default)]
    struct MemoryStore(Arc<Mutex<BTreeMap<String, String>>>);

    impl MacroStore for MemoryStore {
        fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
            Ok(self.0.lock().clone())
        }

        fn persist(&mut self, name: &str, expansion: Option<&str>) -> anyhow::Result<()> {
            let mut map = self.0.lock();
            match expansion {
                Some(body) => map.insert(name.to_string(), body.to_string()),
                None => map.remove(name),
            };
            Ok(())
        }
    }

    #[test]
    fn test_committed_macro_changes_are_persisted() {
        let store = MemoryStore::default();
        store.0.lock().insert("old".into(), "wah!".into());

        let mut sh = interpreter();
        sh.set_macro_store(Box::new(store.clone())).unwrap();
        assert_eq!(sh.macros().get("old"), Some("wah!"));

        sh.execute("macro -add name=greet body=wah?").unwrap();
        sh.execute("macro -delete name=old").unwrap();
        let saved = store.0.lock().clone();
        assert_eq!(saved.get("greet").map(String::as_str), Some("wah?"));
        assert!(!saved.contains_key("old"));
    }
}
