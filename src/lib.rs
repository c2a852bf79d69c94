//! **fixtrace** - Map security findings to the commits that introduced or fixed them
//!
//! Diff-to-structure extraction (hunks, changed lines, touched code units) and a
//! deterministic candidate-ranking pipeline that merges evidence from several
//! independent scoring passes.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Command handlers that sit between the CLI and the core pipeline
pub mod cli_ext {
    /// `hunks`, `units` and `snippet` commands
    pub mod inspect_cmd;

    /// `rank` and `prompt` commands
    pub mod rank_cmd;

    /// `findings`, `resolve` and `attach` commands
    pub mod finding_cmd;
}

/// Core pipeline - pure extraction, scoring passes and aggregation
pub mod core {
    /// Unified diff hunk splitting and `@@` header parsing
    pub mod hunk;
    pub use hunk::{Hunk, HunkHeader, split_hunks};

    /// Old/new line-number mapping over patch bodies
    pub mod changed_lines;
    pub use changed_lines::{ChangedLineSet, Side, changed_lines};

    /// Brace-depth scanner for contracts, functions and modifiers
    pub mod units;
    pub use units::{CodeUnit, UnitKind, changed_units, scan_units};

    /// Declaration tagging from hunk lines only
    pub mod tagger;
    pub use tagger::tag_hunk_functions;

    /// Commit URLs, canonical ids and blob references
    pub mod url;
    pub use url::{CommitId, RepoRef, canonical_commit_id};

    /// Fetched commit records (external input shape)
    pub mod commit;
    pub use commit::{CommitRecord, FileRecord, FileStatus};

    /// Source-file predicate (include globs, exclude substrings)
    pub mod filter;
    pub use filter::SourceFilter;

    /// Per-commit structural analysis with rayon fan-out
    pub mod analyze;
    pub use analyze::{CommitAnalysis, FileAnalysis, HunkAnalysis, analyze_commits};

    /// Case-insensitive query matching over messages and patches
    pub mod search;
    pub use search::QueryMatcher;

    /// Score-scale reconciliation and failure records
    pub mod normalize;
    pub use normalize::{Evidence, ScoreRecord, ScoringFailure, normalize_score, parse_rankings};

    /// Candidate merge, dedupe and ranking
    pub mod candidate;
    pub use candidate::{Candidate, CandidateAggregator, Combine, FileEvidence, SharedAggregator};

    /// Scoring pass trait, built-in passes and the parallel runner
    pub mod scoring;
    pub use scoring::{PassInput, ScoringPass, run_passes};

    /// Relevance and query-extraction prompt rendering
    pub mod prompt;

    /// Unit name to before/after blob reference resolution
    pub mod resolve;
    pub use resolve::{MatchRule, Resolution, resolve_blob_refs};

    /// Function body extraction from full source
    pub mod snippet;
    pub use snippet::extract_function_code;

    /// Findings, context entries and the undo log
    pub mod finding;
    pub use finding::{ContextEntry, Finding, FindingSession};

    /// End-to-end ranking pipeline
    pub mod rank;
    pub use rank::{RankOptions, RankedSet, rank_commits};
}

/// Infrastructure - configuration and JSON/NDJSON input
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Flexible JSON / NDJSON loading
    pub mod io;
    pub use io::{load_records, load_values, write_json};
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, load_config};

// Core types for external consumers
pub use core::{Candidate, CandidateAggregator, CodeUnit, CommitRecord, HunkHeader};
