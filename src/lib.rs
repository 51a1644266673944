//! Incremental tree-sitter synchronization for open text buffers, plus
//! structural queries over the synchronized trees.

pub mod config;
pub mod document;
pub mod edit;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod logging;
pub mod metrics;
pub mod parser_pool;
pub mod query;
pub mod tree;
pub mod verify;

pub use config::{EngineConfig, GrammarKind, LanguageConfig};
pub use document::{
    DocumentSnapshot, DocumentSource, SharedDocument, TextDocument, TextEdit, TextSource,
};
pub use edit::{ContentChange, TreeEdit};
pub use engine::{SwappedSiblings, SyncState, SyntaxEngine, TreeUpdate};
pub use error::{ConfigError, EditError, EngineError, GrammarError, QueryError};
pub use query::Direction;
pub use tree::{NodeId, Point, SyntaxTree, TextRange};
