//! Engine configuration files and grammar sources.

use std::io::Write;
use std::time::Duration;

use futures::FutureExt;
use syntax_sync::grammar::library_file_name;
use syntax_sync::{
    ConfigError, EngineConfig, EngineError, GrammarError, GrammarKind, QueryError, SyncState,
    SyntaxEngine, TextDocument,
};
use tempfile::{NamedTempFile, TempDir};
use url::Url;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn config_with_grammar_dir(dir: &TempDir) -> EngineConfig {
    let raw = format!(
        r#"{{
            "debounce_ms": 50,
            "grammar_dir": {},
            "languages": [
                {{
                    "id": "javascript",
                    "kind": "builtin",
                    "file_types": ["js"],
                    "list_node_kinds": ["array"]
                }},
                {{ "id": "custom", "file_types": ["cst"] }}
            ]
        }}"#,
        serde_json::to_string(dir.path()).unwrap()
    );
    let file = write_config(&raw);
    EngineConfig::from_path(file.path()).unwrap()
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config_with_grammar_dir(&dir);
    assert_eq!(config.debounce(), Duration::from_millis(50));
    assert_eq!(config.grammar_dir(), dir.path());
    assert_eq!(config.language("custom").unwrap().kind, GrammarKind::Library);
    assert!(config.language("json").is_some());

    let engine = SyntaxEngine::new(config);
    assert_eq!(engine.registry().language_for_path("lib/main.cst".as_ref()), Some("custom"));
    assert_eq!(engine.registry().language_for_path("index.js".as_ref()), Some("javascript"));
    assert_eq!(engine.registry().language_for_path("index.mjs".as_ref()), None);
}

#[test]
fn test_bad_config_files() {
    let missing = std::env::temp_dir().join("syntax-sync-no-such-config.json");
    assert!(matches!(EngineConfig::from_path(&missing), Err(ConfigError::Io { .. })));

    let malformed = write_config("{ \"debounce_ms\": ");
    assert!(matches!(EngineConfig::from_path(malformed.path()), Err(ConfigError::Parse(_))));

    let zero = write_config(r#"{ "parse_timeout_ms": 0 }"#);
    assert!(matches!(EngineConfig::from_path(zero.path()), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_configured_list_kinds_drive_bracketing() {
    let dir = TempDir::new().unwrap();
    let engine = SyntaxEngine::new(config_with_grammar_dir(&dir));
    let uri = Url::parse("file:///cfg/list.js").unwrap();
    let text = "foo(a, [1, 2, 3]);";
    engine.open_document(TextDocument::new(uri.clone(), "javascript", text).shared());

    // Only arrays count as lists here, so the arguments do not.
    let err = engine.bracketing_children(&uri, 4..5).unwrap_err();
    assert_eq!(err, EngineError::Query(QueryError::AmbiguousBoundary { start: 4, end: 5 }));

    let (tree, bracket) = engine.bracketing_children(&uri, 8..12).unwrap();
    assert_eq!(tree.kind(bracket.list), "array");
    assert_eq!(tree.range(bracket.first).bytes(), 8..9);
    assert_eq!(tree.range(bracket.last).bytes(), 11..12);
}

#[test]
fn test_missing_library_grammar() {
    let dir = TempDir::new().unwrap();
    let engine = SyntaxEngine::new(config_with_grammar_dir(&dir));
    let expected_path = dir.path().join(library_file_name("custom"));

    let err = engine.registry().load_blocking("custom").unwrap_err();
    assert_eq!(err, GrammarError::NotFound { language: "custom".to_string(), path: expected_path });
    assert!(!engine.registry().did_load("custom"));

    let uri = Url::parse("file:///cfg/a.cst").unwrap();
    engine.open_document(TextDocument::new(uri.clone(), "custom", "anything").shared());
    assert!(matches!(
        engine.tree_now(&uri),
        Err(EngineError::Grammar(GrammarError::NotFound { .. }))
    ));
    assert_eq!(engine.state(&uri), Some(SyncState::NoTree));
}

#[test]
fn test_invalid_library_file() {
    let dir = TempDir::new().unwrap();
    let engine = SyntaxEngine::new(config_with_grammar_dir(&dir));
    std::fs::write(dir.path().join(library_file_name("custom")), b"not a shared library").unwrap();

    let err = engine.registry().load_blocking("custom").unwrap_err();
    assert!(matches!(err, GrammarError::Library { .. }), "{err:?}");
}

#[tokio::test]
async fn test_failed_async_load_can_be_retried() {
    let dir = TempDir::new().unwrap();
    let engine = SyntaxEngine::new(config_with_grammar_dir(&dir));

    let first = engine.registry().load("custom").await.unwrap_err();
    assert!(matches!(first, GrammarError::NotFound { .. }));
    assert!(!engine.registry().is_loading("custom"));

    // A failed load leaves no slot behind, so the next request tries again.
    let second = engine.registry().load("custom").await.unwrap_err();
    assert_eq!(first, second);

    let unsupported = engine.registry().load("cobol").await.unwrap_err();
    assert_eq!(unsupported, GrammarError::Unsupported("cobol".to_string()));
}

#[tokio::test]
async fn test_abandoned_load_still_settles() {
    let dir = TempDir::new().unwrap();
    let engine = SyntaxEngine::new(config_with_grammar_dir(&dir));
    let uri = Url::parse("file:///cfg/abandoned.cst").unwrap();
    engine.open_document(TextDocument::new(uri.clone(), "custom", "anything").shared());

    // Poll once and drop the request while the library lookup is in flight.
    assert!(engine.tree(&uri).now_or_never().is_none());
    assert!(engine.registry().is_loading("custom"));

    tokio::time::timeout(Duration::from_secs(10), async {
        while engine.registry().is_loading("custom") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("load stayed in flight after its caller went away");

    assert!(matches!(
        engine.tree_now(&uri),
        Err(EngineError::Grammar(GrammarError::NotFound { .. }))
    ));
    let again = engine.registry().load("custom").await.unwrap_err();
    assert!(matches!(again, GrammarError::NotFound { .. }));
}
