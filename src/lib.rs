//! Wah!, an extensible interactive command shell.
//!
//! Commands live in named, versioned [`Module`]s that can be loaded and unloaded at
//! runtime from a [`ModuleCatalog`]. A line goes through a fixed pipeline: it is split
//! into tokens, macro references are expanded, the command name is resolved against the
//! loaded modules, the remaining tokens are built into a typed [`Bundle`], the command's
//! [`Rule`]s are checked, and the command runs. Its [`Value`] is rendered and kept as the
//! previous output, available to the next line as `^`.
//!
//! The [`Interpreter`] runs lines synchronously. The [`Dispatcher`] moves it into a worker
//! thread that takes one line at a time from a [`DispatcherHandle`] and can interrupt a
//! running command cooperatively.
//!
//! ```
//! use wah_shell::{builtin, Interpreter, RecordingRenderer, Value};
//! let mut sh = Interpreter::new(builtin::catalog(), Box::new(RecordingRenderer::new())).unwrap();
//! sh.load_library("builtin").unwrap();
//! sh.execute("bimage w=2 h=2").unwrap();
//! assert_eq!(sh.execute("string i=^").unwrap(), Some(Value::text("Image@2x2")));
//! ```

pub mod builtin;
pub mod bundle;
pub mod command;
pub mod config;
pub mod data;
pub mod dispatcher;
pub mod error;
mod interpreter;
pub mod lexer;
pub mod macros;
pub mod module;
pub mod output;
pub mod parser;
pub mod registry;
pub mod rule;
pub mod store;
pub mod system;

pub use bundle::Bundle;
pub use command::{CheckedCommand, Command, UncheckedCommand};
pub use data::{Color, Image, Value, ValueKind};
pub use dispatcher::{CancelToken, Dispatcher, DispatcherHandle, State};
pub use error::{Fault, ShellError};
pub use interpreter::{Context, Interpreter, MAX_CALL_DEPTH};
pub use module::Module;
pub use output::{RecordingRenderer, Rendered, Renderer, TerminalRenderer};
pub use registry::{ModuleCatalog, ModuleRegistry};
pub use rule::Rule;
