//! Grammar registry
//!
//! Maps language ids to tree-sitter languages. A grammar is loaded at most
//! once per language id: the first request creates a shared load future and
//! every concurrent request awaits that same future. The future records its
//! own outcome in the registry and, inside a tokio runtime, runs on its own
//! task, so a load finishes even when every caller waiting on it goes away.
//! A failed load clears the slot, so the next request tries again instead of
//! caching the failure.
//!
//! Grammars come either from the tree-sitter language crates compiled into
//! this binary or from shared libraries found in the grammar directory.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tree_sitter::Language;
use tree_sitter_language::LanguageFn;

use crate::config::{EngineConfig, GrammarKind, LanguageConfig};
use crate::error::GrammarError;

/// A loaded grammar plus the per-language data the query layer needs.
#[derive(Clone)]
pub struct Grammar {
    inner: Arc<GrammarInner>,
}

struct GrammarInner {
    language_id: String,
    language: Language,
    list_node_kinds: HashSet<String>,
    // Keeps the shared object mapped for as long as the language is in use.
    _library: Option<Library>,
}

impl Grammar {
    fn new(config: &LanguageConfig, language: Language, library: Option<Library>) -> Self {
        Self {
            inner: Arc::new(GrammarInner {
                language_id: config.id.clone(),
                language,
                list_node_kinds: config.list_node_kinds.iter().cloned().collect(),
                _library: library,
            }),
        }
    }

    pub fn language_id(&self) -> &str {
        &self.inner.language_id
    }

    pub fn language(&self) -> &Language {
        &self.inner.language
    }

    /// Whether nodes of `kind` act as sibling-bracketing containers.
    pub fn is_list_kind(&self, kind: &str) -> bool {
        self.inner.list_node_kinds.contains(kind)
    }

    pub fn list_node_kinds(&self) -> &HashSet<String> {
        &self.inner.list_node_kinds
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("language_id", &self.inner.language_id)
            .field("list_node_kinds", &self.inner.list_node_kinds.len())
            .finish()
    }
}

type LoadFuture = Shared<BoxFuture<'static, Result<Grammar, GrammarError>>>;
type Slots = Arc<Mutex<HashMap<String, Slot>>>;

enum Slot {
    Loading(LoadFuture),
    Loaded(Grammar),
}

/// Lazily loads and caches grammars by language id.
pub struct GrammarRegistry {
    languages: HashMap<String, LanguageConfig>,
    extensions: HashMap<String, String>,
    grammar_dir: PathBuf,
    slots: Slots,
}

impl GrammarRegistry {
    pub fn new(config: &EngineConfig) -> Self {
        let mut languages = HashMap::new();
        let mut extensions = HashMap::new();
        for language in &config.languages {
            for file_type in &language.file_types {
                extensions.insert(file_type.to_ascii_lowercase(), language.id.clone());
            }
            languages.insert(language.id.clone(), language.clone());
        }
        debug!("Grammar registry configured with {} languages", languages.len());
        Self {
            languages,
            extensions,
            grammar_dir: config.grammar_dir(),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True if a grammar is configured for `language_id`.
    pub fn is_supported(&self, language_id: &str) -> bool {
        self.languages.contains_key(language_id)
    }

    pub fn is_loading(&self, language_id: &str) -> bool {
        matches!(self.slots.lock().get(language_id), Some(Slot::Loading(_)))
    }

    pub fn did_load(&self, language_id: &str) -> bool {
        matches!(self.slots.lock().get(language_id), Some(Slot::Loaded(_)))
    }

    /// Returns the grammar if it has finished loading.
    pub fn loaded(&self, language_id: &str) -> Option<Grammar> {
        match self.slots.lock().get(language_id) {
            Some(Slot::Loaded(grammar)) => Some(grammar.clone()),
            _ => None,
        }
    }

    /// Language id configured for the extension of `path`.
    pub fn language_for_path(&self, path: &Path) -> Option<&str> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extensions.get(&extension).map(String::as_str)
    }

    pub fn language_config(&self, language_id: &str) -> Option<&LanguageConfig> {
        self.languages.get(language_id)
    }

    /// Loads the grammar for `language_id`, sharing any load already in flight.
    pub async fn load(&self, language_id: &str) -> Result<Grammar, GrammarError> {
        let future = {
            let mut slots = self.slots.lock();
            match slots.get(language_id) {
                Some(Slot::Loaded(grammar)) => return Ok(grammar.clone()),
                Some(Slot::Loading(future)) => future.clone(),
                None => {
                    let config = self
                        .languages
                        .get(language_id)
                        .cloned()
                        .ok_or_else(|| GrammarError::Unsupported(language_id.to_string()))?;
                    let grammar_dir = self.grammar_dir.clone();
                    let future = load_future(config, grammar_dir, Arc::clone(&self.slots));
                    slots.insert(language_id.to_string(), Slot::Loading(future.clone()));
                    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                        runtime.spawn(future.clone().map(|_| ()));
                    }
                    future
                }
            }
        };

        future.await
    }

    /// Synchronous load for callers that cannot await.
    ///
    /// Fails with [`GrammarError::Pending`] when an asynchronous load is
    /// already in flight, rather than loading the grammar a second time.
    pub fn load_blocking(&self, language_id: &str) -> Result<Grammar, GrammarError> {
        let mut slots = self.slots.lock();
        match slots.get(language_id) {
            Some(Slot::Loaded(grammar)) => return Ok(grammar.clone()),
            Some(Slot::Loading(_)) => return Err(GrammarError::Pending(language_id.to_string())),
            None => {}
        }
        let config = self
            .languages
            .get(language_id)
            .ok_or_else(|| GrammarError::Unsupported(language_id.to_string()))?;

        match open_grammar(config, &self.grammar_dir) {
            Ok((language, library)) => {
                let grammar = Grammar::new(config, language, library);
                info!("Loaded grammar for '{}'", language_id);
                slots.insert(language_id.to_string(), Slot::Loaded(grammar.clone()));
                Ok(grammar)
            }
            Err(e) => {
                warn!("Failed to load grammar for '{}': {}", language_id, e);
                Err(e)
            }
        }
    }
}

fn load_future(config: LanguageConfig, grammar_dir: PathBuf, slots: Slots) -> LoadFuture {
    async move {
        let opened = match config.kind {
            GrammarKind::Builtin => open_grammar(&config, &grammar_dir),
            GrammarKind::Library => {
                let task_config = config.clone();
                tokio::task::spawn_blocking(move || open_grammar(&task_config, &grammar_dir))
                    .await
                    .unwrap_or_else(|e| Err(GrammarError::Task(e.to_string())))
            }
        };
        let result = opened.map(|(language, library)| Grammar::new(&config, language, library));
        settle(&slots, &config.id, &result);
        result
    }
    .boxed()
    .shared()
}

/// Records the outcome of a load in its slot. Only the future stored in a
/// `Loading` slot settles it, and a new load is only started for an empty
/// slot, so the slot still belongs to this load.
fn settle(
    slots: &Mutex<HashMap<String, Slot>>,
    language_id: &str,
    result: &Result<Grammar, GrammarError>,
) {
    let mut slots = slots.lock();
    if !matches!(slots.get(language_id), Some(Slot::Loading(_))) {
        return;
    }
    match result {
        Ok(grammar) => {
            info!("Loaded grammar for '{}'", language_id);
            slots.insert(language_id.to_string(), Slot::Loaded(grammar.clone()));
        }
        Err(e) => {
            warn!("Failed to load grammar for '{}': {}", language_id, e);
            slots.remove(language_id);
        }
    }
}

fn open_grammar(
    config: &LanguageConfig,
    grammar_dir: &Path,
) -> Result<(Language, Option<Library>), GrammarError> {
    match config.kind {
        GrammarKind::Builtin => {
            let language_fn = builtin_language(config.grammar_name())
                .ok_or_else(|| GrammarError::UnknownBuiltin(config.grammar_name().to_string()))?;
            Ok((Language::new(language_fn), None))
        }
        GrammarKind::Library => {
            let path = config
                .library
                .clone()
                .unwrap_or_else(|| grammar_dir.join(library_file_name(config.grammar_name())));
            if !path.exists() {
                return Err(GrammarError::NotFound { language: config.id.clone(), path });
            }
            let (language, library) = load_library(&path, config.grammar_name())?;
            Ok((language, Some(library)))
        }
    }
}

/// Tree-sitter grammars compiled into this binary.
pub fn builtin_language(grammar: &str) -> Option<LanguageFn> {
    match grammar {
        "javascript" => Some(tree_sitter_javascript::LANGUAGE),
        "rust" => Some(tree_sitter_rust::LANGUAGE),
        "json" => Some(tree_sitter_json::LANGUAGE),
        _ => None,
    }
}

fn load_library(path: &Path, grammar: &str) -> Result<(Language, Library), GrammarError> {
    let symbol = format!("tree_sitter_{}", grammar.replace('-', "_"));
    debug!("Loading grammar library {} ({})", path.display(), symbol);

    // SAFETY: the library is a tree-sitter grammar; its `tree_sitter_<name>`
    // export takes no arguments and returns a pointer to a static TSLanguage.
    // The library is stored next to the language so the pointer stays valid.
    unsafe {
        let library = Library::new(path).map_err(|e| GrammarError::Library {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let constructor = *library
            .get::<unsafe extern "C" fn() -> *const ()>(symbol.as_bytes())
            .map_err(|_| GrammarError::MissingSymbol {
                path: path.to_path_buf(),
                symbol: symbol.clone(),
            })?;
        let language = Language::new(LanguageFn::from_raw(constructor));
        Ok((language, library))
    }
}

/// Platform-specific file name of a grammar library.
pub fn library_file_name(grammar: &str) -> String {
    let name = grammar.replace('-', "_");
    if cfg!(target_os = "macos") {
        format!("lib{name}.dylib")
    } else if cfg!(target_os = "windows") {
        format!("{name}.dll")
    } else {
        format!("lib{name}.so")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageConfig;

    fn registry_with(languages: Vec<LanguageConfig>, grammar_dir: &Path) -> GrammarRegistry {
        let mut config = EngineConfig::default();
        config.languages.extend(languages);
        config.grammar_dir = Some(grammar_dir.to_path_buf());
        GrammarRegistry::new(&config)
    }

    fn library_language(id: &str) -> LanguageConfig {
        LanguageConfig {
            id: id.to_string(),
            grammar: None,
            kind: GrammarKind::Library,
            library: None,
            file_types: vec!["zz".to_string()],
            list_node_kinds: vec![],
        }
    }

    #[test]
    fn test_builtin_grammars_resolve() {
        assert!(builtin_language("javascript").is_some());
        assert!(builtin_language("rust").is_some());
        assert!(builtin_language("json").is_some());
        assert!(builtin_language("cobol").is_none());
    }

    #[tokio::test]
    async fn test_load_builtin_once() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(vec![], dir.path());
        assert!(registry.is_supported("javascript"));
        assert!(!registry.did_load("javascript"));

        let (first, second) =
            tokio::join!(registry.load("javascript"), registry.load("javascript"));
        let first = first.unwrap();
        let second = second.unwrap();
        assert!(Arc::ptr_eq(&first.inner, &second.inner), "concurrent loads share one grammar");
        assert!(registry.did_load("javascript"));
        assert!(!registry.is_loading("javascript"));
        assert!(first.is_list_kind("arguments"));
        assert!(!first.is_list_kind("identifier"));
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(vec![], dir.path());
        assert!(!registry.is_supported("cobol"));
        assert_eq!(
            registry.load("cobol").await.unwrap_err(),
            GrammarError::Unsupported("cobol".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_library_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(vec![library_language("zlang")], dir.path());

        let err = registry.load("zlang").await.unwrap_err();
        assert!(matches!(err, GrammarError::NotFound { .. }));
        assert!(!registry.is_loading("zlang"));
        assert!(!registry.did_load("zlang"));

        // The failure is not cached: a corrupt file now yields a different error.
        std::fs::write(dir.path().join(library_file_name("zlang")), b"not a library").unwrap();
        let err = registry.load("zlang").await.unwrap_err();
        assert!(matches!(err, GrammarError::Library { .. }), "got {err:?}");
    }

    #[test]
    fn test_load_blocking_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(vec![], dir.path());
        let grammar = registry.load_blocking("json").unwrap();
        assert_eq!(grammar.language_id(), "json");
        assert!(registry.did_load("json"));
        assert!(registry.loaded("json").is_some());
    }

    #[test]
    fn test_language_for_path() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(vec![library_language("zlang")], dir.path());
        assert_eq!(registry.language_for_path(Path::new("src/main.rs")), Some("rust"));
        assert_eq!(registry.language_for_path(Path::new("index.JS")), Some("javascript"));
        assert_eq!(registry.language_for_path(Path::new("a.zz")), Some("zlang"));
        assert_eq!(registry.language_for_path(Path::new("README")), None);
    }

    #[test]
    fn test_library_file_name() {
        let name = library_file_name("tree-sitter-x");
        assert!(name.contains("tree_sitter_x"));
    }
}
