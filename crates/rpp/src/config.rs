//! Token tables that drive the grammar's special cases.
//!
//! Environment variables:
//! - `RPP_MAX_DEPTH`: nesting limit for untrusted input
//!
//! A TOML file may hold the fields at top level or under `[codec]`:
//! ```toml
//! [codec]
//! binary_tokens = ["VST", "RECORD_CFG"]
//! max_depth = 64
//! ```

use std::collections::BTreeSet;
use std::env;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_MAX_DEPTH: &str = "RPP_MAX_DEPTH";

/// Codec configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Blocks whose body carries wrapped base64 payload lines.
    pub binary_tokens: BTreeSet<String>,
    /// Free-text blocks whose `|` lines join into one string parameter.
    pub text_tokens: BTreeSet<String>,
    /// Plugin blocks that own the adjacent FX-chain attributes.
    pub plugin_tokens: BTreeSet<String>,
    /// Structs whose parameters stay strings even when they look numeric.
    pub string_tokens: BTreeSet<String>,
    /// Deepest allowed block nesting.
    pub max_depth: usize,
}

fn set(tokens: &[&str]) -> BTreeSet<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            binary_tokens: set(&[
                "VST", "AU", "DX", "LV2", "CLAP", "RECORD_CFG", "APPLYFX_CFG", "RENDER_CFG",
            ]),
            text_tokens: set(&["NOTES"]),
            plugin_tokens: set(&["VST", "AU", "DX", "LV2", "CLAP", "JS"]),
            string_tokens: set(&["NAME"]),
            max_depth: 256,
        }
    }
}

impl CodecConfig {
    /// The process-wide default, built on first use.
    pub fn global() -> &'static CodecConfig {
        static GLOBAL: OnceLock<CodecConfig> = OnceLock::new();
        GLOBAL.get_or_init(CodecConfig::default)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = env::var(ENV_MAX_DEPTH) {
            self.max_depth = value.trim().parse().map_err(|e| ConfigError::Parse {
                origin: ENV_MAX_DEPTH.to_string(),
                message: format!("{value:?}: {e}"),
            })?;
        }
        Ok(self)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_toml(contents, "<string>")
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_toml(&contents, &path.display().to_string())
    }

    fn parse_toml(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        let parse_err = |e: toml::de::Error| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        };

        let table: toml::Table = contents.parse().map_err(parse_err)?;
        match table.get("codec") {
            Some(section) => section.clone().try_into().map_err(parse_err),
            None => toml::Value::Table(table).try_into().map_err(parse_err),
        }
    }

    pub fn is_binary(&self, token: &str) -> bool {
        self.binary_tokens.contains(token)
    }

    pub fn is_text(&self, token: &str) -> bool {
        self.text_tokens.contains(token)
    }

    pub fn is_plugin(&self, token: &str) -> bool {
        self.plugin_tokens.contains(token)
    }

    pub fn is_string_struct(&self, token: &str) -> bool {
        self.string_tokens.contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_tables() {
        let config = CodecConfig::default();
        assert!(config.is_binary("VST"));
        assert!(config.is_binary("RECORD_CFG"));
        assert!(!config.is_binary("JS"));
        assert!(config.is_plugin("JS"));
        assert!(config.is_text("NOTES"));
        assert!(config.is_string_struct("NAME"));
        assert_eq!(config.max_depth, 256);
    }

    #[test]
    fn test_from_toml_str_top_level() {
        let config = CodecConfig::from_toml_str("max_depth = 8\ntext_tokens = [\"NOTES\", \"COMMENT\"]")
            .unwrap();
        assert_eq!(config.max_depth, 8);
        assert!(config.is_text("COMMENT"));
        // untouched tables keep their defaults
        assert!(config.is_binary("VST"));
    }

    #[test]
    fn test_from_toml_str_codec_section() {
        let config = CodecConfig::from_toml_str("[codec]\nbinary_tokens = [\"VST\"]\n").unwrap();
        assert_eq!(config.binary_tokens, set(&["VST"]));
        assert_eq!(config.max_depth, 256);
    }

    #[test]
    fn test_from_toml_str_rejects_bad_types() {
        let err = CodecConfig::from_toml_str("max_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[codec]\nmax_depth = 12").unwrap();

        let config = CodecConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_depth, 12);
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = CodecConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_env_override() {
        env::set_var(ENV_MAX_DEPTH, " 32 ");
        assert_eq!(CodecConfig::from_env().unwrap().max_depth, 32);

        env::set_var(ENV_MAX_DEPTH, "deep");
        let err = CodecConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref origin, .. } if origin == ENV_MAX_DEPTH));

        env::remove_var(ENV_MAX_DEPTH);
        assert_eq!(CodecConfig::from_env().unwrap(), CodecConfig::default());
    }

    #[test]
    fn test_global_is_default() {
        assert_eq!(CodecConfig::global(), &CodecConfig::default());
    }
}
