use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::candidate::Combine;
use crate::core::finding::UnitSide;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "fixtrace")]
#[command(
    about = "Map security findings to the commits and code units that introduced or fixed them"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without writing files
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logs on stderr (FIXTRACE_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a unified diff into hunks with their changed lines
    Hunks(HunksArgs),

    /// List code units touched by a patch
    Units(UnitsArgs),

    /// Rank commits as candidates for a finding
    Rank(RankArgs),

    /// Resolve a unit name to before/after blob references
    Resolve(ResolveArgs),

    /// Extract a function body from a source file
    Snippet(SnippetArgs),

    /// Write a context entry into a finding
    Attach(AttachArgs),

    /// Render the relevance (or query-extraction) prompt
    Prompt(PromptArgs),

    /// List findings and their linked context
    Findings(FindingsArgs),

    /// Initialize a fixtrace.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
pub struct HunksArgs {
    /// Unified diff or bare patch body
    pub patch: PathBuf,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct UnitsArgs {
    /// Patch applied to the source
    #[arg(long)]
    pub patch: PathBuf,

    /// Full source of the revision the patch side refers to
    #[arg(long, required_unless_present = "hunk_only")]
    pub source: Option<PathBuf>,

    /// Which side of the patch the source belongs to
    #[arg(long, value_enum, default_value_t = UnitSide::After)]
    pub side: UnitSide,

    /// Only tag declarations visible in the hunk lines
    #[arg(long)]
    pub hunk_only: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RankArgs {
    /// Commit records (JSON array, object, or NDJSON)
    #[arg(long)]
    pub commits: PathBuf,

    /// Scorer output files, each replayed as its own source
    #[arg(long)]
    pub scores: Vec<PathBuf>,

    /// Literal search queries
    #[arg(short, long)]
    pub query: Vec<String>,

    /// Findings file; its query candidates feed the search pass
    #[arg(long)]
    pub finding: Option<PathBuf>,

    /// Which finding in --finding to use
    #[arg(long, default_value_t = 0)]
    pub index: usize,

    /// Score combination (overrides config)
    #[arg(long, value_enum)]
    pub combine: Option<Combine>,

    /// Keep at most N candidates (overrides config)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Write ranked candidates as JSON to this file
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Commit records (JSON array, object, or NDJSON)
    #[arg(long)]
    pub commits: PathBuf,

    /// Commit id or URL
    #[arg(long)]
    pub commit: String,

    /// Unit name, e.g. Vault::withdraw
    #[arg(long)]
    pub unit: String,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct SnippetArgs {
    /// Source file to search
    #[arg(long)]
    pub source: PathBuf,

    /// Function name, optionally qualified
    #[arg(long)]
    pub name: String,

    /// 1-based line hint used when no declaration matches
    #[arg(long)]
    pub line: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct AttachArgs {
    /// Findings file (rewritten in place unless --out is given)
    #[arg(long)]
    pub findings: PathBuf,

    /// Index of the finding to edit
    #[arg(long)]
    pub index: usize,

    /// Ranked candidates written by `fixtrace rank --out`
    #[arg(long)]
    pub ranked: PathBuf,

    /// Commit id or URL of the chosen candidate
    #[arg(long)]
    pub commit: String,

    /// Add only these units instead of the whole candidate
    #[arg(long)]
    pub unit: Vec<String>,

    /// Side the --unit names were taken from
    #[arg(long, value_enum, default_value_t = UnitSide::After)]
    pub side: UnitSide,

    /// Restrict the candidate to these files first
    #[arg(long)]
    pub file: Vec<String>,

    /// Write the edited findings here instead
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct PromptArgs {
    /// Findings file
    #[arg(long)]
    pub finding: PathBuf,

    /// Which finding to render
    #[arg(long, default_value_t = 0)]
    pub index: usize,

    /// Commit records for the relevance prompt
    #[arg(long, required_unless_present = "queries")]
    pub commits: Option<PathBuf>,

    /// Render the query-extraction prompt instead
    #[arg(long)]
    pub queries: bool,
}

#[derive(Parser, Debug)]
pub struct FindingsArgs {
    /// Findings file
    pub findings: PathBuf,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,

    /// Write `fixtrace.<ext>` into this directory instead of stdout
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}
