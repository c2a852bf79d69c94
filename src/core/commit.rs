//! Commit records as fetched from a code host
//!
//! Field names follow the host's REST shape; aliases accept the variants
//! produced by older fetch scripts (`url`, `files_changed`, `before_blob`, ...).

use serde::{Deserialize, Serialize};

use crate::core::hunk::{Hunk, split_hunks};
use crate::core::url::{CommitId, canonical_commit_id};

/// Per-file change status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus
{
    Added,
    #[default]
    #[serde(alias = "changed", alias = "copied", alias = "unchanged")]
    Modified,
    #[serde(alias = "deleted")]
    Removed,
    Renamed,
}

/// Pre-split hunk as some fetchers deliver it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHunk
{
    pub header: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

/// One file of a commit record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord
{
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,

    #[serde(default)]
    pub status: FileStatus,

    #[serde(default)]
    pub additions: usize,

    #[serde(default)]
    pub deletions: usize,

    /// Unified diff of the file (no `diff --git` preamble required)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Alternative to `patch`: hunks already split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunks: Option<Vec<RawHunk>>,

    #[serde(default, alias = "full_source_before", skip_serializing_if = "Option::is_none")]
    pub source_before: Option<String>,

    #[serde(default, alias = "full_source_after", skip_serializing_if = "Option::is_none")]
    pub source_after: Option<String>,

    #[serde(default, alias = "before_blob", skip_serializing_if = "Option::is_none")]
    pub blob_before: Option<String>,

    #[serde(default, alias = "after_blob", skip_serializing_if = "Option::is_none")]
    pub blob_after: Option<String>,
}

impl FileRecord
{
    /// Hunks from the pre-split list when present, else from the patch text
    pub fn split(&self) -> Vec<Hunk>
    {
        if let Some(raw) = &self.hunks
        {
            return raw
                .iter()
                .map(|h| {
                    let mut hunk = Hunk::new(&h.header);
                    hunk.raw_lines = h
                        .lines
                        .clone();
                    hunk
                })
                .collect();
        }

        self.patch
            .as_deref()
            .map(split_hunks)
            .unwrap_or_default()
    }

    /// Pre-change content. Added files have none.
    pub fn before_source(&self) -> Option<&str>
    {
        match self.status
        {
            FileStatus::Added => None,
            _ => self
                .source_before
                .as_deref(),
        }
    }

    /// Post-change content. Removed files have none.
    pub fn after_source(&self) -> Option<&str>
    {
        match self.status
        {
            FileStatus::Removed => None,
            _ => self
                .source_after
                .as_deref(),
        }
    }

    /// `(before, after)` blob references.
    ///
    /// References carried on the record win. Otherwise the before side points
    /// at the parent commit (under the previous name for renames) and the after
    /// side at the commit itself.
    pub fn blob_refs(
        &self,
        commit: Option<&CommitId>,
        parent_sha: Option<&str>,
    ) -> (Option<String>, Option<String>)
    {
        let before = match self.status
        {
            FileStatus::Added => None,
            _ => self
                .blob_before
                .clone()
                .or_else(|| {
                    let path = self
                        .previous_filename
                        .as_deref()
                        .unwrap_or(&self.filename);
                    Some(commit?.blob_url(parent_sha?, path))
                }),
        };

        let after = match self.status
        {
            FileStatus::Removed => None,
            _ => self
                .blob_after
                .clone()
                .or_else(|| commit.map(|c| c.blob_url(&c.sha, &self.filename))),
        };

        (before, after)
    }
}

/// A fetched commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord
{
    #[serde(alias = "url", alias = "commit_url")]
    pub commit_id: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, alias = "parent", skip_serializing_if = "Option::is_none")]
    pub parent_sha: Option<String>,

    #[serde(default, alias = "files_changed")]
    pub files: Vec<FileRecord>,

    /// Full pre-change source when the fetcher attached it to the commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_source_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_source_after: Option<String>,
}

impl CommitRecord
{
    /// Merge key shared by every pass
    pub fn canonical_id(&self) -> String
    {
        canonical_commit_id(&self.commit_id)
    }

    /// Structured id when `commit_id` is a host URL
    pub fn parsed_id(&self) -> Option<CommitId>
    {
        CommitId::parse(&self.commit_id).ok()
    }

    pub fn has_full_source(&self) -> bool
    {
        self.full_source_before
            .is_some()
            || self
                .full_source_after
                .is_some()
    }

    /// `file` with the commit-level sources filling whichever side it lacks
    pub fn with_commit_sources(
        &self,
        file: &FileRecord,
    ) -> FileRecord
    {
        let mut file = file.clone();
        if file
            .source_before
            .is_none()
        {
            file.source_before = self
                .full_source_before
                .clone();
        }
        if file
            .source_after
            .is_none()
        {
            file.source_after = self
                .full_source_after
                .clone();
        }
        file
    }
}
