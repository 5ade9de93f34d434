//! Where values, echoed lines and errors end up.

use crate::data::{Color, Value};
use crate::error::{Fault, ShellError};
use ansi_term::{Colour, Style};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Presentation of everything the interpreter produces.
///
/// Implementations are moved into the worker thread together with the interpreter.
pub trait Renderer: Send {
    /// Shows a command result. Lists are shown element by element.
    fn render(&mut self, value: &Value) -> io::Result<()>;

    /// Shows the line about to be executed.
    fn echo(&mut self, line: &str) -> io::Result<()>;

    /// Shows a failed step. Internal faults are marked as such.
    fn report_error(&mut self, err: &ShellError) -> io::Result<()>;
}

/// Prefix shown before errors caused by a module rather than by the user.
pub const INTERNAL_FAULT_PREFIX: &str = "A module returned an error:";

fn style(color: Color) -> Style {
    match color {
        Color::Plain => Style::new(),
        Color::Yellow => Colour::Yellow.normal(),
        Color::Aqua => Colour::RGB(0, 255, 255).normal(),
        Color::Gold => Colour::RGB(255, 215, 0).normal(),
        Color::Green => Colour::Green.normal(),
        Color::Red => Colour::Red.normal(),
        Color::Magenta => Colour::Purple.normal(),
        Color::Cyan => Colour::Cyan.normal(),
        Color::Gray => Colour::Fixed(244).normal(),
        Color::Rgb(r, g, b) => Colour::RGB(r, g, b).normal(),
    }
}

/// Writes colored output to a terminal or any other byte sink.
pub struct TerminalRenderer {
    out: Box<dyn Write + Send>,
    colors: bool,
}

impl TerminalRenderer {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, colors: true }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Disables ANSI escapes, e.g. when output is redirected.
    pub fn plain(mut self) -> Self {
        self.colors = false;
        self
    }

    fn line(&mut self, text: &str, color: Color) -> io::Result<()> {
        if self.colors {
            writeln!(self.out, "{}", style(color).paint(text))
        } else {
            writeln!(self.out, "{}", text)
        }
    }

    fn value(&mut self, value: &Value) -> io::Result<()> {
        match value {
            Value::None => Ok(()),
            Value::Text(text, color) => self.line(text, *color),
            Value::Integer(i) => self.line(&i.to_string(), Color::INTEGER),
            Value::Image(_) => self.line(&value.to_string(), Color::IMAGE),
            Value::List(items) => items.iter().try_for_each(|item| self.value(item)),
        }
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, value: &Value) -> io::Result<()> {
        self.value(value)?;
        self.out.flush()
    }

    fn echo(&mut self, line: &str) -> io::Result<()> {
        self.line(&format!("> {}", line), Color::Gray)
    }

    fn report_error(&mut self, err: &ShellError) -> io::Result<()> {
        if err.fault() == Fault::Internal {
            self.line(INTERNAL_FAULT_PREFIX, Color::Red)?;
        }
        self.line(&err.to_string(), Color::Red)?;
        self.out.flush()
    }
}

/// One call made on a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Echo(String),
    Value(Value),
    Error { fault: Fault, message: String },
}

/// Keeps everything it is given in memory.
///
/// Use [`RecordingRenderer::with_handle`] to keep reading the record after the renderer
/// has moved into the worker thread.
#[derive(Default)]
pub struct RecordingRenderer {
    record: Arc<Mutex<Vec<Rendered>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer and returns a shared handle to its record.
    pub fn with_handle() -> (Self, Arc<Mutex<Vec<Rendered>>>) {
        let renderer = Self::new();
        let handle = Arc::clone(&renderer.record);
        (renderer, handle)
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, value: &Value) -> io::Result<()> {
        self.record.lock().push(Rendered::Value(value.clone()));
        Ok(())
    }

    fn echo(&mut self, line: &str) -> io::Result<()> {
        self.record.lock().push(Rendered::Echo(line.to_string()));
        Ok(())
    }

    fn report_error(&mut self, err: &ShellError) -> io::Result<()> {
        self.record.lock().push(Rendered::Error {
            fault: err.fault(),
            message: err.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Image, ValueKind};

    /// Byte sink shared with the test after being boxed into the renderer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn plain_output(f: impl FnOnce(&mut TerminalRenderer) -> io::Result<()>) -> String {
        let buf = SharedBuf::default();
        let mut renderer = TerminalRenderer::new(Box::new(buf.clone())).plain();
        f(&mut renderer).unwrap();
        let bytes = buf.0.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_render_all_tags() {
        let out = plain_output(|r| {
            r.render(&Value::List(vec![
                Value::None,
                Value::text("hi"),
                Value::Integer(-3),
                Value::Image(Image::blank(2, 3).unwrap()),
                Value::List(vec![Value::text("nested")]),
            ]))
        });
        assert_eq!(out, "hi\n-3\nImage@2x3\nnested\n");
    }

    #[test]
    fn test_internal_faults_are_marked() {
        let out = plain_output(|r| {
            r.report_error(&ShellError::WrongType {
                expected: ValueKind::Text,
                found: ValueKind::Integer,
            })
        });
        assert!(out.starts_with(INTERNAL_FAULT_PREFIX));

        let out = plain_output(|r| r.report_error(&ShellError::NoPreviousOutput));
        assert_eq!(out, "There is no previous output to use\n");
    }

    #[test]
    fn test_colored_output_uses_ansi() {
        let buf = SharedBuf::default();
        let mut renderer = TerminalRenderer::new(Box::new(buf.clone()));
        renderer.render(&Value::text("x")).unwrap();
        let bytes = buf.0.lock().clone();
        assert!(String::from_utf8(bytes).unwrap().contains("\u{1b}["));
    }

    #[test]
    fn test_recording_renderer() {
        let (mut renderer, handle) = RecordingRenderer::with_handle();
        renderer.echo("wah!").unwrap();
        renderer.render(&Value::text("Wah!")).unwrap();
        renderer.report_error(&ShellError::Cancelled).unwrap();
        assert_eq!(
            *handle.lock(),
            vec![
                Rendered::Echo("wah!".into()),
                Rendered::Value(Value::text("Wah!")),
                Rendered::Error {
                    fault: Fault::User,
                    message: "Command was cancelled".into()
                },
            ]
        );
    }
}
