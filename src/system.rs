//! The `wah` module: shell management commands, always loaded.

use crate::bundle::Bundle;
use crate::command::{CheckedCommand, UncheckedCommand};
use crate::data::{Color, Value, ValueKind};
use crate::error::ShellError;
use crate::interpreter::Context;
use crate::module::Module;
use crate::rule::Rule;
use std::time::Duration;

pub const SYSTEM_MODULE: &str = "wah";
pub const SYSTEM_VERSION: &str = "Ichi alpha 0";

pub fn system_module() -> Result<Module, ShellError> {
    Module::builder(SYSTEM_MODULE, SYSTEM_VERSION)
        .color(Color::Gold)
        .command(
            CheckedCommand::new("modlist", ValueKind::List, modlist)
                .describe("Lists the loaded modules"),
        )
        .command(
            CheckedCommand::new("macro", ValueKind::None, macro_command)
                .rule(Rule::type_of(ValueKind::Text, "name"))
                .rule(Rule::type_of(ValueKind::Text, "body"))
                .describe("Manages macros: -add name= body=, -edit name= body=, -delete name=, -list"),
        )
        .command(
            UncheckedCommand::new("call", call)
                .describe("Runs line=<text> as a nested call and returns its result"),
        )
        .command(
            CheckedCommand::new("load", ValueKind::None, load)
                .rule(Rule::require("lib"))
                .rule(Rule::type_of(ValueKind::Text, "lib"))
                .rule(Rule::type_of(ValueKind::Text, "mod"))
                .describe("Loads a library, or only its module mod="),
        )
        .command(
            CheckedCommand::new("unload", ValueKind::None, unload)
                .rule(Rule::require("mod"))
                .rule(Rule::type_of(ValueKind::Text, "mod"))
                .describe("Unloads a module"),
        )
        .command(
            CheckedCommand::new("exit", ValueKind::None, |ctx, _bun| {
                ctx.request_exit();
                Ok(Value::None)
            })
            .describe("Stops the shell"),
        )
        .command(
            CheckedCommand::new("wah!", ValueKind::Text, |_ctx, _bun| Ok(Value::text("Wah!")))
                .describe("Wah!"),
        )
        .command(
            UncheckedCommand::new("wah?", |ctx, _bun| {
                ctx.print(&Value::text("Wah?"))?;
                ctx.call("wah!")
            })
            .describe("Asks, then answers"),
        )
        .command(
            CheckedCommand::new("sleep", ValueKind::None, |ctx, bun| {
                let ms = bun.integer("ms")?.max(0);
                ctx.sleep(Duration::from_millis(ms as u64))?;
                Ok(Value::None)
            })
            .rule(Rule::require("ms"))
            .rule(Rule::type_of(ValueKind::Integer, "ms"))
            .describe("Waits ms=<n> milliseconds; can be interrupted"),
        )
        .command(
            CheckedCommand::new("string", ValueKind::Text, |_ctx, bun| {
                Ok(Value::text(bun.argument("i")?.to_string()))
            })
            .rule(Rule::require("i"))
            .describe("Turns i=<value> into text"),
        )
        .build()
}

fn modlist(ctx: &mut Context<'_>, _bun: &Bundle) -> Result<Value, ShellError> {
    let names = ctx
        .registry()
        .modules()
        .map(|module| Value::colored(module.name(), module.color()))
        .collect();
    Ok(Value::List(names))
}

fn macro_command(ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
    let actions: Vec<&str> = ["add", "edit", "delete", "list"]
        .into_iter()
        .filter(|action| bun.has_flag(action))
        .collect();
    let [action] = actions.as_slice() else {
        return Err(ShellError::BadUsage(
            "macro needs exactly one of -add, -edit, -delete or -list".to_string(),
        ));
    };

    match *action {
        "list" => {
            let lines: Vec<Value> = ctx
                .macros()
                .list()
                .map(|(name, body)| Value::text(format!("{} => {}", name, body)))
                .collect();
            if !lines.is_empty() {
                ctx.print(&Value::List(lines))?;
            }
        }
        "delete" => {
            let name = required_text(bun, "name", action)?;
            ctx.macros_mut().delete(name)?;
        }
        add_or_edit => {
            let name = required_text(bun, "name", action)?;
            let body = required_text(bun, "body", action)?;
            if add_or_edit == "add" {
                ctx.macros_mut().add(name, body)?;
            } else {
                ctx.macros_mut().edit(name, body)?;
            }
        }
    }
    Ok(Value::None)
}

fn required_text<'b>(bun: &'b Bundle, id: &str, action: &str) -> Result<&'b str, ShellError> {
    if !bun.has_argument(id) {
        return Err(ShellError::BadUsage(format!(
            "macro -{} needs the {} argument",
            action, id
        )));
    }
    bun.text(id)
}

fn call(ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
    let line = match bun.get("line") {
        Some(Value::Text(line, _)) => line.clone(),
        Some(other) => other.to_string(),
        None => return Err(ShellError::BadUsage("call needs line=<text>".to_string())),
    };
    let value = ctx.call(&line)?;
    ctx.print(&Value::colored("Call Results:", Color::Gray))?;
    Ok(value)
}

fn load(ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
    let library = bun.text("lib")?;
    match bun.get("mod") {
        Some(_) => ctx.load_module(library, bun.text("mod")?)?,
        None => {
            ctx.load_library(library)?;
        }
    }
    Ok(Value::None)
}

fn unload(ctx: &mut Context<'_>, bun: &Bundle) -> Result<Value, ShellError> {
    ctx.unload_module(bun.text("mod")?)?;
    Ok(Value::None)
}
