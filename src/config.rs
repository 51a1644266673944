//! Engine configuration
//!
//! Configuration is plain data deserialized from JSON. Every field has a
//! default, so an empty object `{}` is a valid configuration. Languages given
//! in a configuration file are merged over the builtin defaults by id.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where the grammar of a language comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarKind {
    /// Compiled into this binary.
    Builtin,
    /// Shared library in the grammar directory.
    #[default]
    Library,
}

/// Per-language settings supplied to the grammar registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Language id as reported by the host (e.g. `javascript`).
    pub id: String,

    /// Grammar name; defaults to the language id. Several language ids may
    /// share one grammar.
    #[serde(default)]
    pub grammar: Option<String>,

    #[serde(default)]
    pub kind: GrammarKind,

    /// Explicit shared library path, overriding the grammar directory lookup.
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// File extensions (without the dot) mapped to this language.
    #[serde(default)]
    pub file_types: Vec<String>,

    /// Node kinds that act as sibling-bracketing containers.
    #[serde(default)]
    pub list_node_kinds: Vec<String>,
}

impl LanguageConfig {
    pub fn grammar_name(&self) -> &str {
        self.grammar.as_deref().unwrap_or(&self.id)
    }

    fn builtin(id: &str, file_types: &[&str], list_node_kinds: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            grammar: None,
            kind: GrammarKind::Builtin,
            library: None,
            file_types: file_types.iter().map(|s| s.to_string()).collect(),
            list_node_kinds: list_node_kinds.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay after the last edit before a scheduled reparse runs.
    pub debounce_ms: u64,

    /// Upper bound on a single parse call.
    pub parse_timeout_ms: u64,

    /// Consecutive failed scheduled parses before the scheduler stops
    /// retrying on its own.
    pub max_parse_retries: u32,

    /// Whether applying edits requests a scheduled reparse.
    pub schedule_on_edit: bool,

    /// Buffer size of the tree-update broadcast channel.
    pub event_capacity: usize,

    /// Directory holding grammar shared libraries.
    pub grammar_dir: Option<PathBuf>,

    pub languages: Vec<LanguageConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            parse_timeout_ms: 500,
            max_parse_retries: 3,
            schedule_on_edit: true,
            event_capacity: 64,
            grammar_dir: None,
            languages: default_languages(),
        }
    }
}

impl EngineConfig {
    /// Reads a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: EngineConfig = serde_json::from_str(raw)?;
        config.merge_default_languages();
        config.validate()?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }

    pub fn language(&self, id: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|language| language.id == id)
    }

    /// Configured grammar directory, or `<data dir>/syntax-sync/grammars`.
    pub fn grammar_dir(&self) -> PathBuf {
        if let Some(dir) = &self.grammar_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("syntax-sync")
            .join("grammars")
    }

    /// Appends builtin languages whose id the configuration does not mention.
    fn merge_default_languages(&mut self) {
        for language in default_languages() {
            if self.language(&language.id).is_none() {
                self.languages.push(language);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.parse_timeout_ms == 0 {
            return Err(ConfigError::Invalid("parse_timeout_ms must be greater than zero".into()));
        }
        let mut seen = HashSet::new();
        for language in &self.languages {
            if !seen.insert(language.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "language '{}' configured twice",
                    language.id
                )));
            }
        }
        Ok(())
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig::builtin(
            "javascript",
            &["js", "mjs", "cjs", "jsx"],
            &[
                "program",
                "statement_block",
                "class_body",
                "switch_body",
                "arguments",
                "formal_parameters",
                "array",
                "object",
                "array_pattern",
                "object_pattern",
                "named_imports",
                "export_clause",
                "template_string",
                "sequence_expression",
                "jsx_element",
            ],
        ),
        LanguageConfig::builtin(
            "rust",
            &["rs"],
            &[
                "source_file",
                "block",
                "declaration_list",
                "field_declaration_list",
                "ordered_field_declaration_list",
                "enum_variant_list",
                "field_initializer_list",
                "match_block",
                "arguments",
                "parameters",
                "closure_parameters",
                "type_arguments",
                "type_parameters",
                "tuple_expression",
                "array_expression",
                "tuple_pattern",
                "tuple_type",
                "use_list",
                "token_tree",
                "where_clause",
            ],
        ),
        LanguageConfig::builtin("json", &["json"], &["document", "object", "array"]),
    ]
}
