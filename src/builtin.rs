//! The `builtin` library: the `text` and `util` modules.

use crate::bundle::Bundle;
use crate::command::Command;
use crate::data::{Color, Image, Value, ValueKind};
use crate::error::ShellError;
use crate::interpreter::Context;
use crate::module::Module;
use crate::registry::{ModuleCatalog, ModuleConstructor};
use crate::rule::Rule;
use regex::RegexBuilder;

pub const BUILTIN_LIBRARY: &str = "builtin";

/// A catalog holding the `builtin` library.
pub fn catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    catalog.register(
        BUILTIN_LIBRARY,
        vec![text_module as ModuleConstructor, util_module],
    );
    catalog
}

/// Commands known at compile time, each a unit struct.
///
/// Rules and the result tag are declared once per type; [`Builtin`] turns the type into
/// a [`Command`].
pub(crate) trait BuiltinCommand: Default + Send + Sync + 'static {
    /// Canonical name of the command, e.g. "echo" or "grep".
    fn name() -> &'static str;

    fn description() -> &'static str;

    fn rules() -> Vec<Rule> {
        Vec::new()
    }

    fn returns() -> ValueKind;

    fn execute(&self, ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError>;
}

pub(crate) struct Builtin<T> {
    command: T,
    rules: Vec<Rule>,
}

impl<T: BuiltinCommand> Default for Builtin<T> {
    fn default() -> Self {
        Self {
            command: T::default(),
            rules: T::rules(),
        }
    }
}

impl<T: BuiltinCommand> Command for Builtin<T> {
    fn name(&self) -> &str {
        T::name()
    }

    fn description(&self) -> &str {
        T::description()
    }

    fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn returns(&self) -> Option<ValueKind> {
        Some(T::returns())
    }

    fn invoke(&self, ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        self.command.execute(ctx, bun)
    }
}

fn text_module() -> Result<Module, ShellError> {
    Module::builder("text", "1.0")
        .color(Color::Green)
        .command(Builtin::<Echo>::default())
        .command(Builtin::<Wc>::default())
        .command(Builtin::<Grep>::default())
        .command(Builtin::<Upper>::default())
        .build()
}

fn util_module() -> Result<Module, ShellError> {
    Module::builder("util", "1.0")
        .color(Color::Cyan)
        .command(Builtin::<Concat>::default())
        .command(Builtin::<BImage>::default())
        .command(Builtin::<Sum>::default())
        .build()
}

/// Elements of a value given either as a single item or as a list.
fn items(value: &Value) -> &[Value] {
    match value {
        Value::List(items) => items,
        single => std::slice::from_ref(single),
    }
}

#[derive(Default)]
pub struct Echo;

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn description() -> &'static str {
        "Joins words=<list> with spaces; -n joins them without"
    }

    fn rules() -> Vec<Rule> {
        vec![Rule::require("words")]
    }

    fn returns() -> ValueKind {
        ValueKind::Text
    }

    fn execute(&self, _ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        let separator = if bun.has_flag("n") { "" } else { " " };
        let words: Vec<String> = items(bun.argument("words")?)
            .iter()
            .map(Value::to_string)
            .collect();
        Ok(Value::text(words.join(separator)))
    }
}

#[derive(Default)]
pub struct Wc;

impl BuiltinCommand for Wc {
    fn name() -> &'static str {
        "wc"
    }

    fn description() -> &'static str {
        "Counts the lines, words and bytes of text=<text>"
    }

    fn rules() -> Vec<Rule> {
        vec![Rule::require("text"), Rule::type_of(ValueKind::Text, "text")]
    }

    fn returns() -> ValueKind {
        ValueKind::List
    }

    fn execute(&self, _ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        let s = bun.text("text")?;
        let lines = s.lines().count();
        let words = s.split_whitespace().count();
        let bytes = s.len();
        Ok(Value::List(
            [lines, words, bytes]
                .into_iter()
                .map(|n| Value::Integer(n as i64))
                .collect(),
        ))
    }
}

#[derive(Default)]
pub struct Grep;

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    fn description() -> &'static str {
        "Lines of text=<text> matching pattern=<regex>; -i ignores case, -w matches whole words"
    }

    fn rules() -> Vec<Rule> {
        vec![
            Rule::require("pattern"),
            Rule::require("text"),
            Rule::type_of(ValueKind::Text, "pattern"),
            Rule::type_of(ValueKind::Text, "text"),
        ]
    }

    fn returns() -> ValueKind {
        ValueKind::List
    }

    fn execute(&self, ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        let user_pattern = bun.text("pattern")?;
        let pattern = if bun.has_flag("w") {
            format!(r"\b({})\b", user_pattern)
        } else {
            user_pattern.to_string()
        };

        let re = RegexBuilder::new(&pattern)
            .case_insensitive(bun.has_flag("i"))
            .build()
            .map_err(|err| {
                ShellError::BadUsage(format!("Invalid regex pattern {}: {}", user_pattern, err))
            })?;

        let mut matches = Vec::new();
        for line in bun.text("text")?.lines() {
            ctx.checkpoint()?;
            if re.is_match(line) {
                matches.push(Value::text(line));
            }
        }
        Ok(Value::List(matches))
    }
}

#[derive(Default)]
pub struct Upper;

impl BuiltinCommand for Upper {
    fn name() -> &'static str {
        "upper"
    }

    fn description() -> &'static str {
        "Upper-cases text=<text>"
    }

    fn rules() -> Vec<Rule> {
        vec![Rule::require("text"), Rule::type_of(ValueKind::Text, "text")]
    }

    fn returns() -> ValueKind {
        ValueKind::Text
    }

    fn execute(&self, _ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        Ok(Value::text(bun.text("text")?.to_uppercase()))
    }
}

#[derive(Default)]
pub struct Concat;

impl BuiltinCommand for Concat {
    fn name() -> &'static str {
        "concat"
    }

    fn description() -> &'static str {
        "Puts m=<text> between s=<text> and e=<text>"
    }

    fn rules() -> Vec<Rule> {
        vec![
            Rule::type_of(ValueKind::Text, "s"),
            Rule::type_of(ValueKind::Text, "m"),
            Rule::type_of(ValueKind::Text, "e"),
            Rule::require("m"),
            Rule::corequire("s", "e"),
        ]
    }

    fn returns() -> ValueKind {
        ValueKind::Text
    }

    fn execute(&self, _ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        let middle = bun.text("m")?;
        if !bun.has_argument("s") {
            return Ok(Value::text(middle));
        }
        Ok(Value::text(format!(
            "{}{}{}",
            bun.text("s")?,
            middle,
            bun.text("e")?
        )))
    }
}

#[derive(Default)]
pub struct BImage;

impl BuiltinCommand for BImage {
    fn name() -> &'static str {
        "bimage"
    }

    fn description() -> &'static str {
        "Creates a blank image of w=<width> by h=<height> pixels"
    }

    fn rules() -> Vec<Rule> {
        vec![
            Rule::type_of(ValueKind::Integer, "w"),
            Rule::type_of(ValueKind::Integer, "h"),
            Rule::require("w"),
            Rule::corequire("w", "h"),
        ]
    }

    fn returns() -> ValueKind {
        ValueKind::Image
    }

    fn execute(&self, _ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        let dimension = |id: &str| -> Result<u32, ShellError> {
            let n = bun.integer(id)?;
            u32::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ShellError::BadUsage(format!("{} must be a positive size, got {}", id, n)))
        };
        Ok(Value::Image(Image::blank(dimension("w")?, dimension("h")?)?))
    }
}

#[derive(Default)]
pub struct Sum;

impl BuiltinCommand for Sum {
    fn name() -> &'static str {
        "sum"
    }

    fn description() -> &'static str {
        "Adds up values=<list of integers>"
    }

    fn rules() -> Vec<Rule> {
        vec![Rule::require("values")]
    }

    fn returns() -> ValueKind {
        ValueKind::Integer
    }

    fn execute(&self, _ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
        let values = bun.argument("values")?;
        let total = match values {
            Value::Integer(n) => *n,
            list => list
                .list_of(ValueKind::Integer)?
                .iter()
                .map(Value::as_integer)
                .sum::<Result<i64, ShellError>>()?,
        };
        Ok(Value::Integer(total))
    }
}
