//! Shell configuration loaded from a TOML file.

use crate::module::is_valid_name;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not valid TOML: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("bad setting: {0}")]
    Invalid(String),
}

/// ```toml
/// prompt = "Wah!~"
/// log = "warn"
/// autoload = ["builtin"]
/// macro_file = "/home/me/.config/wah/macros.toml"
///
/// [macros]
/// hi = "echo words=hello"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text shown before each input line.
    pub prompt: String,
    /// Default log filter, used when `RUST_LOG` is not set.
    pub log: String,
    /// Libraries loaded at start-up.
    pub autoload: Vec<String>,
    /// Where macros are kept between sessions. Macros only live in memory when unset.
    pub macro_file: Option<PathBuf>,
    /// Macros defined at start-up.
    pub macros: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: "Wah!~".to_string(),
            log: "warn".to_string(),
            autoload: vec![crate::builtin::BUILTIN_LIBRARY.to_string()],
            macro_file: None,
            macros: BTreeMap::new(),
        }
    }
}

impl Config {
    /// `wah/config.toml` under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wah").join("config.toml"))
    }

    /// Reads `path`, or the default location when `None`, and checks the result.
    ///
    /// A file that does not exist gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Ok(Config::default());
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(source) => return Err(ConfigError::Unreadable { path, source }),
        };
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::Malformed { path, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::Invalid("prompt is blank".to_string()));
        }
        match self.macros.keys().find(|name| !is_valid_name(name)) {
            Some(name) => Err(ConfigError::Invalid(format!("macro name {:?}", name))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("config.toml"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.autoload, vec!["builtin".to_string()]);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
prompt = "λ"
autoload = []

[macros]
hi = "echo words=hello"
"#,
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.prompt, "λ");
        assert!(config.autoload.is_empty());
        assert_eq!(config.log, "warn");
        assert_eq!(config.macros.get("hi").map(String::as_str), Some("echo words=hello"));
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("prompt = [");
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_validation_errors() {
        let file = write_config("prompt = \"  \"");
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));

        let file = write_config("[macros]\n\"a b\" = \"wah!\"");
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }
}
