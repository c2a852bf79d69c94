//! Security findings, their context entries and the edit undo log
//!
//! A finding is a free-form JSON object from an audit report. Only a handful
//! of keys are interpreted; everything else round-trips untouched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::candidate::Candidate;
use crate::core::changed_lines::Side;
use crate::core::resolve::{resolve_blob_refs, unit_prefix};
use crate::core::search::QueryCandidates;
use crate::core::url::RepoRef;

/// Errors when writing a context entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError
{
    #[error("commit {0} has no parseable code changes")]
    NoCodeChanges(String),

    #[error("could not find file for {0}")]
    FileNotFound(String),

    #[error("no finding at index {0}")]
    NoSuchFinding(usize),
}

/// Which revision a unit was picked from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnitSide
{
    Before,
    After,
}

impl From<UnitSide> for Side
{
    fn from(side: UnitSide) -> Self
    {
        match side
        {
            UnitSide::Before => Side::Old,
            UnitSide::After => Side::New,
        }
    }
}

/// The `context` value a finding carries once linked to a commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextEntry
{
    /// Blob reference of the vulnerable revision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Blob reference of the fixed revision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions_before: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions_after: Vec<String>,
}

impl ContextEntry
{
    pub fn is_empty(&self) -> bool
    {
        self.source
            .is_none()
            && self
                .fix
                .is_none()
            && self
                .functions_before
                .is_empty()
            && self
                .functions_after
                .is_empty()
    }

    /// Entry for a whole candidate: first refs plus every touched unit
    pub fn from_candidate(cand: &Candidate) -> Result<Self, ContextError>
    {
        let entry = Self {
            source: cand
                .first_before_ref()
                .map(str::to_string),
            fix: cand
                .first_after_ref()
                .map(str::to_string),
            functions_before: cand.units_before(),
            functions_after: cand.units_after(),
        };

        if entry.is_empty()
        {
            return Err(ContextError::NoCodeChanges(
                cand.commit_id
                    .clone(),
            ));
        }
        Ok(entry)
    }

    /// Add one unit, resolving refs against the candidate's files.
    ///
    /// Refs already present are kept; the unit is appended once.
    pub fn add_unit(
        &mut self,
        cand: &Candidate,
        unit: &str,
        side: UnitSide,
    ) -> Result<(), ContextError>
    {
        let resolved = resolve_blob_refs(unit, &cand.files)
            .ok_or_else(|| ContextError::FileNotFound(unit_prefix(unit).to_string()))?;

        if self
            .source
            .is_none()
        {
            self.source = resolved.before;
        }
        if self
            .fix
            .is_none()
        {
            self.fix = resolved.after;
        }

        let list = match side
        {
            UnitSide::Before => &mut self.functions_before,
            UnitSide::After => &mut self.functions_after,
        };
        if !list
            .iter()
            .any(|u| u == unit)
        {
            list.push(unit.to_string());
        }
        Ok(())
    }
}

/// One audit finding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Finding(pub Map<String, Value>);

impl Finding
{
    /// Objects only; anything else is not a finding
    pub fn from_value(v: Value) -> Option<Self>
    {
        match v
        {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// String field, empty when absent or not a string
    pub fn text(
        &self,
        key: &str,
    ) -> &str
    {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn title(&self) -> &str
    {
        self.text("title")
    }

    /// Identifier for listings: `id`, `finding_number`, then `title`
    pub fn id(&self) -> Option<String>
    {
        ["id", "finding_number", "title"]
            .iter()
            .find_map(|k| match self.0.get(*k)?
            {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    pub fn label(
        &self,
        index: usize,
    ) -> String
    {
        self.id()
            .unwrap_or_else(|| format!("#{}", index))
    }

    /// Finding text used for similarity: title, description, recommendation
    pub fn similarity_text(&self) -> String
    {
        format!("{} {} {}", self.title(), self.text("description"), self.text("recommendation"))
    }

    pub fn broken_snippets(&self) -> Vec<&str>
    {
        string_or_list(self.0.get("broken_code_snippets"))
    }

    /// Fix URLs, falling back to source URLs when none are given
    pub fn repo_urls(&self) -> Vec<&str>
    {
        let fixes = string_or_list(self.0.get("fix_commit_url"));
        if !fixes.is_empty()
        {
            return fixes;
        }
        string_or_list(self.0.get("source_code_url"))
    }

    /// Classified repository URLs
    pub fn repo_refs(&self) -> Vec<RepoRef>
    {
        self.repo_urls()
            .into_iter()
            .map(RepoRef::classify)
            .collect()
    }

    /// Query lists stored under `candidates`, if any
    pub fn query_candidates(&self) -> Option<QueryCandidates>
    {
        let v = self
            .0
            .get("candidates")?;
        serde_json::from_value(v.clone()).ok()
    }

    /// Current context entry; malformed values read as absent
    pub fn context(&self) -> Option<ContextEntry>
    {
        let v = self
            .0
            .get("context")?;
        serde_json::from_value(v.clone()).ok()
    }

    pub fn set_context(
        &mut self,
        entry: ContextEntry,
    )
    {
        // ContextEntry always serializes to an object
        let value = serde_json::to_value(entry).unwrap_or(Value::Null);
        self.0
            .insert("context".to_string(), value);
    }

    /// Report without its `context`, as fed to the query-extraction prompt
    pub fn without_context(&self) -> Map<String, Value>
    {
        let mut copy = self
            .0
            .clone();
        copy.remove("context");
        copy
    }
}

fn string_or_list(v: Option<&Value>) -> Vec<&str>
{
    match v
    {
        Some(Value::String(s)) if !s.is_empty() => vec![s.as_str()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect(),
        _ => Vec::new(),
    }
}

/// Findings being edited, with a snapshot of each one's pre-edit value
#[derive(Debug, Default)]
pub struct FindingSession
{
    findings: Vec<Finding>,
    undo: IndexMap<usize, Finding>,
}

impl FindingSession
{
    pub fn new(findings: Vec<Finding>) -> Self
    {
        Self { findings, undo: IndexMap::new() }
    }

    pub fn findings(&self) -> &[Finding]
    {
        &self.findings
    }

    pub fn into_findings(self) -> Vec<Finding>
    {
        self.findings
    }

    pub fn get(
        &self,
        index: usize,
    ) -> Option<&Finding>
    {
        self.findings
            .get(index)
    }

    pub fn is_edited(
        &self,
        index: usize,
    ) -> bool
    {
        self.undo
            .contains_key(&index)
    }

    /// Mutate a finding; the first edit snapshots its original value
    pub fn edit<F, R>(
        &mut self,
        index: usize,
        f: F,
    ) -> Result<R, ContextError>
    where
        F: FnOnce(&mut Finding) -> Result<R, ContextError>,
    {
        let finding = self
            .findings
            .get_mut(index)
            .ok_or(ContextError::NoSuchFinding(index))?;

        let before = finding.clone();
        let out = f(finding);
        match out
        {
            Ok(_) =>
            {
                self.undo
                    .entry(index)
                    .or_insert(before);
            }
            // A failed edit must leave the finding as it was
            Err(_) => *finding = before,
        }
        out
    }

    /// Replace the context with one built from a whole candidate
    pub fn fix_from_candidate(
        &mut self,
        index: usize,
        cand: &Candidate,
    ) -> Result<(), ContextError>
    {
        let entry = ContextEntry::from_candidate(cand)?;
        self.edit(index, |f| {
            f.set_context(entry);
            Ok(())
        })
    }

    /// Add one unit to the finding's context
    pub fn add_unit(
        &mut self,
        index: usize,
        cand: &Candidate,
        unit: &str,
        side: UnitSide,
    ) -> Result<(), ContextError>
    {
        self.edit(index, |f| {
            let mut entry = f
                .context()
                .unwrap_or_default();
            entry.add_unit(cand, unit, side)?;
            f.set_context(entry);
            Ok(())
        })
    }

    /// Restore one finding to its pre-edit value. False if it was never edited.
    pub fn reset(
        &mut self,
        index: usize,
    ) -> bool
    {
        match self
            .undo
            .shift_remove(&index)
        {
            Some(original) =>
            {
                self.findings[index] = original;
                true
            }
            None => false,
        }
    }

    /// Restore every edited finding; returns how many were restored
    pub fn undo_all(&mut self) -> usize
    {
        let restored = self
            .undo
            .len();
        for (index, original) in self
            .undo
            .drain(..)
        {
            self.findings[index] = original;
        }
        restored
    }
}
