use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use racode::{
    Indexer,
    IndexStore,
    SearchEngine,
    cli::{Cli, Command},
    error::{self, Error},
    mcp,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RACODE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Completions(args)) = &cli.command {
        args.generate();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);

    if !cli.project_root.is_dir() {
        return Err(Error::Config(format!(
            "project root does not exist: {}",
            cli.project_root.display()
        )));
    }
    let project_root = cli.project_root.canonicalize().map_err(|e| {
        Error::Config(format!(
            "cannot resolve project root {}: {e}",
            cli.project_root.display()
        ))
    })?;
    // Resolve against the canonical root so the indexer's own-database
    // exclusion always matches during traversal.
    let db_path = cli
        .db_path
        .clone()
        .unwrap_or_else(|| project_root.join(".code_search.db"));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(
                project_root = %project_root.display(),
                db_path = %db_path.display(),
                "starting racode"
            );
            mcp::run_mcp(project_root, db_path)?;
        }
        Command::Search(args) => {
            let store = Arc::new(IndexStore::open(&db_path)?);
            let indexer = Indexer::new(project_root, store.clone());
            indexer.refresh()?;

            let engine = SearchEngine::new(store);
            let hits = engine.search(&args.query, &args.extensions, args.limit)?;

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&hits)
                        .expect("results serialize to JSON")
                );
            } else if hits.is_empty() {
                println!("No results found.");
            } else {
                for hit in &hits {
                    println!(
                        "{:.3} {}:{}-{} [{}] {}",
                        hit.score,
                        hit.file_path,
                        hit.line_start,
                        hit.line_end,
                        hit.chunk_type,
                        hit.symbol_name
                    );
                }
            }
        }
        Command::Rebuild => {
            let store = Arc::new(IndexStore::open(&db_path)?);
            let indexer = Indexer::new(project_root, store);
            let stats = indexer.rebuild()?;
            println!(
                "Indexed {} files ({} chunks) in {} ms",
                stats.indexed_files, stats.chunks, stats.elapsed_ms
            );
        }
        Command::Status(args) => {
            let store = Arc::new(IndexStore::open(&db_path)?);
            let files = store.all_paths()?.len();
            let chunks = store.chunk_count()?;

            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "project_root": project_root.display().to_string(),
                        "db_path": db_path.display().to_string(),
                        "files": files,
                        "chunks": chunks,
                    })
                );
            } else {
                println!("Project root: {}", project_root.display());
                println!("Database: {}", db_path.display());
                println!("Indexed files: {files}");
                println!("Chunks: {chunks}");
            }
        }
        Command::Completions(_) => unreachable!("handled above"),
    }

    Ok(())
}
