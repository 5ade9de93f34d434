//! Keeping macros between sessions.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Storage the interpreter forwards committed macro changes to.
pub trait MacroStore: Send {
    /// Every stored macro.
    fn load(&self) -> anyhow::Result<BTreeMap<String, String>>;

    /// Records a new expansion for `name`, or its removal when `expansion` is `None`.
    fn persist(&mut self, name: &str, expansion: Option<&str>) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MacroFile {
    #[serde(default)]
    macros: BTreeMap<String, String>,
}

/// Macros kept in a TOML file under a `[macros]` table.
///
/// The file is rewritten on every change. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct TomlMacroStore {
    path: PathBuf,
}

impl TomlMacroStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> anyhow::Result<MacroFile> {
        if !self.path.exists() {
            return Ok(MacroFile::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("can't read macro file {}", self.path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("can't parse macro file {}", self.path.display()))
    }
}

impl MacroStore for TomlMacroStore {
    fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(self.read()?.macros)
    }

    fn persist(&mut self, name: &str, expansion: Option<&str>) -> anyhow::Result<()> {
        let mut file = self.read()?;
        match expansion {
            Some(body) => {
                file.macros.insert(name.to_string(), body.to_string());
            }
            None => {
                file.macros.remove(name);
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("can't create {}", parent.display()))?;
        }
        let content = toml::to_string(&file).context("can't serialize macros")?;
        fs::write(&self.path, content)
            .with_context(|| format!("can't write macro file {}", self.path.display()))?;
        tracing::debug!(macro_name = name, path = %self.path.display(), "macro persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlMacroStore::new(dir.path().join("macros.toml"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("macros.toml");
        let mut store = TomlMacroStore::new(&path);
        store.persist("home", Some("echo words=\"a b\"")).unwrap();
        store.persist("gone", Some("wah!")).unwrap();
        store.persist("gone", None).unwrap();

        let reloaded = TomlMacroStore::new(&path).load().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded["home"], "echo words=\"a b\"");
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.toml");
        fs::write(&path, "macros = 5").unwrap();
        assert!(TomlMacroStore::new(&path).load().is_err());
    }
}
