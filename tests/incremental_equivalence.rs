//! Trees maintained through edit deltas must match a full parse of the same
//! text, whether edits are reparsed one at a time or in batches.

use quickcheck::{QuickCheck, TestResult};
use syntax_sync::verify::compare_trees;
use syntax_sync::{ContentChange, EngineConfig, SyntaxEngine, TextDocument};
use test_utils::edits::EditScript;
use url::Url;

fn engine() -> SyntaxEngine {
    let _ = syntax_sync::logging::init_logger(false, Some("warn"), false);
    SyntaxEngine::new(EngineConfig::default())
}

/// Parses `text` in a fresh engine.
fn full_parse(text: &str) -> syntax_sync::SyntaxTree {
    let engine = engine();
    let uri = Url::parse("file:///reference.js").unwrap();
    engine.open_document(TextDocument::new(uri.clone(), "javascript", text).shared());
    engine.tree_now(&uri).unwrap()
}

#[test]
fn test_reparse_after_each_edit() {
    fn prop(script: EditScript) -> TestResult {
        let steps = script.replay();
        if steps.is_empty() {
            return TestResult::discard();
        }
        let engine = engine();
        let uri = Url::parse("file:///each.js").unwrap();
        let doc = TextDocument::new(uri.clone(), "javascript", &script.initial_text()).shared();
        engine.open_document(doc.clone());
        engine.tree_now(&uri).unwrap();

        for (edit, expected) in &steps {
            let (version, change) = {
                let mut doc = doc.write();
                let change = doc.replace(edit.range.clone(), &edit.text).unwrap();
                (doc.version(), change)
            };
            engine.on_document_edited(&uri, version, &[change]).unwrap();
            let tree = engine.tree_now(&uri).unwrap();
            assert_eq!(&doc.read().text().to_string(), expected);
            if let Err(mismatch) = compare_trees(&full_parse(expected), &tree) {
                return TestResult::error(format!("{mismatch}"));
            }
        }

        let summary = engine.metrics().summary();
        assert_eq!(summary.incremental_parses, steps.len() as u64);
        assert_eq!(summary.full_parses, 1);
        TestResult::passed()
    }
    QuickCheck::new().tests(100).max_tests(1000).quickcheck(prop as fn(EditScript) -> TestResult);
}

#[test]
fn test_reparse_after_batch() {
    fn prop(script: EditScript) -> TestResult {
        let steps = script.replay();
        if steps.is_empty() {
            return TestResult::discard();
        }
        let engine = engine();
        let uri = Url::parse("file:///batch.js").unwrap();
        let doc = TextDocument::new(uri.clone(), "javascript", &script.initial_text()).shared();
        engine.open_document(doc.clone());
        engine.tree_now(&uri).unwrap();

        // All edits land in one document version and one change report.
        let changes = {
            let mut doc = doc.write();
            let mut changes = Vec::with_capacity(steps.len());
            for (edit, _) in &steps {
                changes.push(doc.replace(edit.range.clone(), &edit.text).unwrap());
            }
            changes
        };
        let version = doc.read().version();
        engine.on_document_edited(&uri, version, &changes).unwrap();
        let tree = engine.tree_now(&uri).unwrap();
        assert_eq!(tree.version(), version);

        match compare_trees(&full_parse(&script.final_text()), &tree) {
            Ok(()) => TestResult::passed(),
            Err(mismatch) => TestResult::error(format!("{mismatch}")),
        }
    }
    QuickCheck::new().tests(100).max_tests(1000).quickcheck(prop as fn(EditScript) -> TestResult);
}

#[test]
fn test_unreported_edit_falls_back_to_full_parse() {
    let engine = engine();
    let uri = Url::parse("file:///unreported.js").unwrap();
    let doc = TextDocument::new(uri.clone(), "javascript", "let a = 1;\n").shared();
    engine.open_document(doc.clone());
    engine.tree_now(&uri).unwrap();

    // The host changes the text without reporting it.
    doc.write().replace(0..0, "foo(a, b);\n").unwrap();
    let tree = engine.tree_now(&uri).unwrap();
    assert!(compare_trees(&full_parse("foo(a, b);\nlet a = 1;\n"), &tree).is_ok());
    assert_eq!(engine.metrics().summary().full_parses, 2);
    engine.verify(&uri).unwrap();
}

#[test]
fn test_late_reports_apply_in_order() {
    let engine = engine();
    let uri = Url::parse("file:///late.js").unwrap();
    let doc = TextDocument::new(uri.clone(), "javascript", "foo(a, b);\n").shared();
    engine.open_document(doc.clone());
    engine.tree_now(&uri).unwrap();

    // The host applies two edits before delivering either notification.
    let (first, second) = {
        let mut doc = doc.write();
        let first = doc.replace(0..0, "let x = 1;\n").unwrap();
        let second = doc.replace(22..22, "bar();\n").unwrap();
        (first, second)
    };
    assert_eq!(doc.read().version(), 2);

    assert_eq!(engine.on_document_edited(&uri, 1, &[first]).unwrap(), 1);
    assert_eq!(engine.on_document_edited(&uri, 2, &[second]).unwrap(), 1);
    assert_eq!(engine.metrics().summary().edits_dropped, 0);

    let tree = engine.tree_now(&uri).unwrap();
    let text = doc.read().text().to_string();
    assert_eq!(text, "let x = 1;\nfoo(a, b);\nbar();\n");
    assert_eq!(tree.range(tree.root()).end_byte, text.len());
    assert!(compare_trees(&full_parse(&text), &tree).is_ok());
    assert_eq!(engine.metrics().summary().incremental_parses, 1);

    // A repeated notification is already part of the tree.
    let stale = ContentChange::from_offsets(doc.read().text(), 0, 0, "z");
    assert_eq!(engine.on_document_edited(&uri, 2, &[stale]).unwrap(), 0);
    engine.verify(&uri).unwrap();
}
