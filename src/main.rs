use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use url::Url;

use syntax_sync::query::{self, bracket_trimmer};
use syntax_sync::{EngineConfig, SharedDocument, SyntaxEngine, TextDocument};

#[derive(Parser, Debug)]
#[command(name = "syntax-sync")]
#[command(about = "Incremental tree-sitter synchronization and structural queries")]
#[command(version)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Language id to use instead of detecting it from the file extension
    #[arg(long, global = true)]
    language: Option<String>,

    /// Log level filter (e.g. "debug", "syntax_sync=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable ANSI colors in log output
    #[arg(long, global = true)]
    no_color: bool,

    /// Also write a session log to the user cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the named-node outline of a file
    Tree {
        file: PathBuf,
        /// Print the tree-sitter s-expression instead
        #[arg(long)]
        sexp: bool,
    },
    /// Print the expand-selection chain at a byte offset
    Select {
        file: PathBuf,
        #[arg(long)]
        offset: usize,
    },
    /// Print the list node and children bracketing a byte range
    Bracket {
        file: PathBuf,
        #[arg(long)]
        start: usize,
        #[arg(long)]
        end: usize,
    },
    /// Replay a file as a series of edits, then check the incremental tree
    /// against a full parse
    Verify {
        file: PathBuf,
        /// Number of edits the file is split into
        #[arg(long, default_value_t = 16)]
        chunks: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard =
        syntax_sync::logging::init_logger(cli.no_color, cli.log_level.as_deref(), cli.log_file)
            .context("failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let engine = SyntaxEngine::new(config);

    match &cli.command {
        Command::Tree { file, sexp } => {
            let (uri, _) = open(&engine, file, cli.language.as_deref(), None)?;
            let tree = engine.tree(&uri).await?;
            if *sexp {
                println!("{}", tree.to_sexp());
            } else {
                print!("{}", tree.outline());
            }
        }
        Command::Select { file, offset } => {
            let (uri, document) = open(&engine, file, cli.language.as_deref(), None)?;
            let tree = engine.tree(&uri).await?;
            let text = document.read().text().clone();
            let ranges =
                query::selection_range_hierarchy(&tree, &text, *offset, bracket_trimmer(&text))?;
            for range in ranges {
                println!("{range}");
            }
        }
        Command::Bracket { file, start, end } => {
            let (uri, document) = open(&engine, file, cli.language.as_deref(), None)?;
            engine.tree(&uri).await?;
            let (tree, bracket) = engine.bracketing_children(&uri, *start..*end)?;
            let text = document.read().text().clone();
            println!("list  {} {}", tree.kind(bracket.list), tree.range(bracket.list));
            println!("first {} {:?}", tree.range(bracket.first), tree.text(bracket.first, &text));
            println!("last  {} {:?}", tree.range(bracket.last), tree.text(bracket.last, &text));
        }
        Command::Verify { file, chunks } => {
            let source = read(file)?;
            let pieces = split_chars(&source, (*chunks).max(1));
            let (uri, document) = open(&engine, file, cli.language.as_deref(), Some(""))?;
            engine.tree(&uri).await?;

            for piece in &pieces {
                let (version, change) = {
                    let mut document = document.write();
                    let end = document.len_bytes();
                    let change = document.replace(end..end, piece)?;
                    (document.version(), change)
                };
                engine.on_document_edited(&uri, version, &[change])?;
                engine.tree_now(&uri)?;
            }
            engine.verify(&uri)?;

            let summary = engine.metrics().summary();
            println!(
                "verified {} after {} edits ({} incremental, {} full parses)",
                file.display(),
                pieces.len(),
                summary.incremental_parses,
                summary.full_parses
            );
        }
    }

    if let Some(stats) = engine.metrics().operation_stats("parse") {
        info!(
            "parse: {} runs, mean {}µs, max {}µs",
            stats.count, stats.mean_micros, stats.max_micros
        );
    }
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Opens `path` in the engine. `text` overrides the file contents.
fn open(
    engine: &SyntaxEngine,
    path: &Path,
    language: Option<&str>,
    text: Option<&str>,
) -> anyhow::Result<(Url, SharedDocument)> {
    let language_id = match language {
        Some(language) => language.to_string(),
        None => engine
            .registry()
            .language_for_path(path)
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow!("cannot detect the language of {}; pass --language", path.display())
            })?,
    };
    if !engine.is_language_supported(&language_id) {
        bail!("no grammar configured for '{language_id}'");
    }

    let absolute =
        std::path::absolute(path).with_context(|| format!("invalid path {}", path.display()))?;
    let uri = Url::from_file_path(&absolute)
        .map_err(|_| anyhow!("cannot build a URI for {}", absolute.display()))?;
    let contents = match text {
        Some(text) => text.to_string(),
        None => read(path)?,
    };
    let document = TextDocument::new(uri, language_id, &contents).shared();
    Ok((engine.open_document(document.clone()), document))
}

/// Splits `source` into at most `count` pieces on character boundaries.
fn split_chars(source: &str, count: usize) -> Vec<&str> {
    let size = source.len().div_ceil(count).max(1);
    let mut pieces = Vec::with_capacity(count);
    let mut start = 0;
    while start < source.len() {
        let mut end = (start + size).min(source.len());
        while !source.is_char_boundary(end) {
            end += 1;
        }
        pieces.push(&source[start..end]);
        start = end;
    }
    pieces
}
