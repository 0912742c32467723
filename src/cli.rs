use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::search::{DEFAULT_EXTENSIONS, DEFAULT_LIMIT};

#[derive(Debug, Parser)]
#[command(
    name = "racode",
    about = "Local code search: BM25-ranked full-text index plus symbol resolution, served over MCP"
)]
pub struct Cli {
    /// Root directory of the project to index
    #[arg(long)]
    pub project_root: PathBuf,

    /// Index database path (default: <project-root>/.code_search.db)
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the MCP server over stdio (the default)
    Serve,
    /// One-shot search from the command line
    Search(SearchArgs),
    /// Drop the index and rebuild it from scratch
    Rebuild,
    /// Show index status
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Comma-separated extension suffixes (e.g. ".py,.ts"), or "*"
    #[arg(short, long, default_value = DEFAULT_EXTENSIONS)]
    pub extensions: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "racode",
            &mut std::io::stdout(),
        );
    }
}
