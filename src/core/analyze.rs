//! Per-commit structural analysis
//!
//! Pure fan-out over commits with rayon; output order follows input order.

use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::changed_lines::{ChangedLineSet, Side};
use crate::core::commit::{CommitRecord, FileRecord, FileStatus};
use crate::core::filter::SourceFilter;
use crate::core::hunk::{Hunk, HunkHeader};
use crate::core::tagger::tag_hunk_functions;
use crate::core::units::{CodeUnit, changed_units};
use crate::core::url::CommitId;

/// One hunk with its derived line set and tagged declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkAnalysis
{
    pub header_line: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<HunkHeader>,

    /// New-file line numbers added by this hunk
    pub changed_lines: ChangedLineSet,

    /// Functions/modifiers declared on the hunk's own lines
    pub functions: Vec<String>,

    /// Raw body lines with markers
    pub lines: Vec<String>,
}

impl HunkAnalysis
{
    fn from_hunk(hunk: &Hunk) -> Self
    {
        Self {
            header_line: hunk
                .header_line
                .clone(),
            header: hunk
                .header
                .clone(),
            changed_lines: hunk.changed_lines(Side::New),
            functions: tag_hunk_functions(hunk.body()),
            lines: hunk
                .raw_lines
                .clone(),
        }
    }

    /// Trimmed `+`/`-` lines, file markers excluded
    pub fn change_lines(&self) -> impl Iterator<Item = &str>
    {
        self.lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| {
                (l.starts_with('+') || l.starts_with('-')) && !l.starts_with("+++") && !l.starts_with("---")
            })
    }
}

/// Structural view of one changed source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis
{
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,

    pub status: FileStatus,
    pub additions: usize,
    pub deletions: usize,
    pub hunks: Vec<HunkAnalysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_after: Option<String>,

    /// Qualified units touched in the old revision
    pub units_before: Vec<String>,

    /// Qualified units touched in the new revision
    pub units_after: Vec<String>,
}

/// Structural view of one commit (source files only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAnalysis
{
    /// Canonical merge key
    pub commit_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub message: String,

    pub files: Vec<FileAnalysis>,
}

impl CommitAnalysis
{
    /// Every unit name across files and sides, first-seen order
    pub fn all_units(&self) -> impl Iterator<Item = &str>
    {
        self.files
            .iter()
            .flat_map(|f| {
                f.units_before
                    .iter()
                    .chain(&f.units_after)
            })
            .map(String::as_str)
            .unique()
    }

    /// After-side units across files, first-seen order
    pub fn units_after(&self) -> impl Iterator<Item = &str>
    {
        self.files
            .iter()
            .flat_map(|f| &f.units_after)
            .map(String::as_str)
            .unique()
    }
}

fn qualified(units: Vec<CodeUnit>) -> Vec<String>
{
    units
        .iter()
        .map(CodeUnit::qualified_name)
        .unique()
        .collect()
}

/// Analyze a single file record.
///
/// Full source yields brace-scanned units; without it the hunk tagger's bare
/// names stand in.
pub fn analyze_file(
    record: &FileRecord,
    commit: Option<&CommitId>,
    parent_sha: Option<&str>,
) -> FileAnalysis
{
    let raw_hunks = record.split();
    let hunks: Vec<HunkAnalysis> = raw_hunks
        .iter()
        .map(HunkAnalysis::from_hunk)
        .collect();

    let new_lines: ChangedLineSet = hunks
        .iter()
        .flat_map(|h| {
            h.changed_lines
                .iter()
                .copied()
        })
        .collect();
    let old_lines: ChangedLineSet = raw_hunks
        .iter()
        .flat_map(|h| h.changed_lines(Side::Old))
        .collect();

    let tagged = || -> Vec<String> {
        hunks
            .iter()
            .flat_map(|h| {
                h.functions
                    .iter()
                    .cloned()
            })
            .unique()
            .collect()
    };

    let units_before = match (record.status, record.before_source())
    {
        (FileStatus::Added, _) => Vec::new(),
        (_, Some(src)) => qualified(changed_units(src, &old_lines)),
        (_, None) => tagged(),
    };
    let units_after = match (record.status, record.after_source())
    {
        (FileStatus::Removed, _) => Vec::new(),
        (_, Some(src)) => qualified(changed_units(src, &new_lines)),
        (_, None) => tagged(),
    };

    let (blob_before, blob_after) = record.blob_refs(commit, parent_sha);

    FileAnalysis {
        filename: record
            .filename
            .clone(),
        previous_filename: record
            .previous_filename
            .clone(),
        status: record.status,
        additions: record.additions,
        deletions: record.deletions,
        hunks,
        blob_before,
        blob_after,
        units_before,
        units_after,
    }
}

/// Analyze one commit, keeping only files the filter accepts
pub fn analyze_commit(
    record: &CommitRecord,
    filter: &SourceFilter,
) -> CommitAnalysis
{
    let parsed = record.parsed_id();
    let parent = record
        .parent_sha
        .as_deref();

    let sources: Vec<&FileRecord> = record
        .files
        .iter()
        .filter(|f| filter.is_source(&f.filename))
        .collect();

    // commit-level source only names a file when there is exactly one
    let sole = sources.len() == 1 && record.has_full_source();
    if record.has_full_source() && !sole
    {
        debug!(commit = %record.commit_id, source_files = sources.len(), "commit-level source not attributable; ignored");
    }

    let files: Vec<FileAnalysis> = sources
        .into_iter()
        .map(|f| {
            if sole
            {
                analyze_file(&record.with_commit_sources(f), parsed.as_ref(), parent)
            }
            else
            {
                analyze_file(f, parsed.as_ref(), parent)
            }
        })
        .collect();

    debug!(
        commit = %record.commit_id,
        source_files = files.len(),
        total_files = record.files.len(),
        "analyzed commit"
    );

    CommitAnalysis {
        commit_id: record.canonical_id(),
        url: parsed
            .as_ref()
            .map(CommitId::url),
        message: record
            .message
            .clone(),
        files,
    }
}

/// Analyze all commits in parallel; results keep input order
#[instrument(skip_all, fields(commits = records.len()))]
pub fn analyze_commits(
    records: &[CommitRecord],
    filter: &SourceFilter,
    quiet: bool,
) -> Vec<CommitAnalysis>
{
    let progress = if quiet
    {
        ProgressBar::hidden()
    }
    else
    {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    };

    let out: Vec<CommitAnalysis> = records
        .par_iter()
        .map(|record| {
            let analysis = analyze_commit(record, filter);
            progress.inc(1);
            analysis
        })
        .collect();

    progress.finish_and_clear();
    out
}
