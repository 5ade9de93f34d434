use anyhow::{Context, Result};
use argh::FromArgs;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wah_shell::config::Config;
use wah_shell::store::TomlMacroStore;
use wah_shell::{CancelToken, Dispatcher, Interpreter, TerminalRenderer, builtin};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(FromArgs)]
/// Wah!, an extensible command shell.
struct Args {
    #[argh(option)]
    /// config file to use instead of the one in the platform config directory
    config: Option<PathBuf>,

    #[argh(option)]
    /// log filter, e.g. "debug" or "wah_shell::dispatcher=trace"; overrides RUST_LOG
    log: Option<String>,

    #[argh(option, short = 'c')]
    /// run a single line and exit, with status 1 if it fails
    command: Option<String>,

    #[argh(switch)]
    /// do not load the libraries listed under autoload
    no_autoload: bool,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref())?;
    init_tracing(args.log.as_deref(), &config.log)?;

    let mut interpreter = build_interpreter(&config, args.no_autoload)?;
    if let Some(line) = args.command {
        if interpreter.run(&line, &CancelToken::new()).is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }
    repl(interpreter, &config.prompt)
}

fn init_tracing(cli: Option<&str>, configured: &str) -> Result<()> {
    let filter = match cli {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter: {}", directives))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn build_interpreter(config: &Config, no_autoload: bool) -> Result<Interpreter> {
    let mut renderer = TerminalRenderer::stdout();
    if !std::io::stdout().is_terminal() {
        renderer = renderer.plain();
    }
    let mut interpreter = Interpreter::new(builtin::catalog(), Box::new(renderer))?;

    if let Some(path) = &config.macro_file {
        interpreter
            .set_macro_store(Box::new(TomlMacroStore::new(path)))
            .with_context(|| format!("can't open macro file {}", path.display()))?;
    }
    for (name, body) in &config.macros {
        if interpreter.macros().get(name).is_none() {
            interpreter.macros_mut().edit(name, body)?;
        }
    }

    if !no_autoload {
        for library in &config.autoload {
            if let Err(err) = interpreter.load_library(library) {
                tracing::warn!(library = %library, %err, "autoload failed");
            }
        }
    }
    Ok(interpreter)
}

fn repl(interpreter: Interpreter, prompt: &str) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
        .context("can't install the Ctrl-C handler")?;

    let handle = Dispatcher::new(interpreter)
        .begin_listening()
        .context("can't start the worker thread")?;
    let mut rl = DefaultEditor::new()?;
    let prompt = format!("{} ", prompt);

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str())?;
                interrupted.store(false, Ordering::SeqCst);
                handle.submit_line(line);
                while !handle.wait_idle_timeout(POLL_INTERVAL) {
                    if interrupted.swap(false, Ordering::SeqCst) {
                        handle.cancel_current();
                    }
                }
                if handle.is_finished() {
                    break;
                }
            }
            // Ctrl-C at the prompt only clears the line
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                handle.shutdown();
                return Err(err.into());
            }
        }
    }

    handle.shutdown();
    Ok(())
}
