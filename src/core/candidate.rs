//! Candidate merge, dedupe and ranking
//!
//! One candidate per canonical commit id. Merging is idempotent: unions for
//! evidence, per-source maximum for scores. Ties in the final order fall back
//! to first-seen order, which the `IndexMap` preserves.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::analyze::{CommitAnalysis, FileAnalysis};
use crate::core::commit::FileStatus;
use crate::core::normalize::Evidence;
use crate::core::resolve::{loosely_matches, unit_prefix};

/// How per-source scores fold into the final score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Combine
{
    /// Strongest single signal
    #[default]
    Max,
    /// Average over scoring sources
    Mean,
}

impl Combine
{
    pub fn apply<I>(
        self,
        scores: I,
    ) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        let (sum, max, n) = scores
            .into_iter()
            .fold((0.0_f64, 0.0_f64, 0usize), |(sum, max, n), s| (sum + s, max.max(s), n + 1));

        if n == 0
        {
            return 0.0;
        }

        match self
        {
            Combine::Max => max,
            Combine::Mean => sum / n as f64,
        }
    }
}

/// Per-file evidence carried on a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvidence
{
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FileStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_after: Option<String>,

    #[serde(default)]
    pub units_before: IndexSet<String>,

    #[serde(default)]
    pub units_after: IndexSet<String>,
}

impl FileEvidence
{
    fn absorb(
        &mut self,
        other: FileEvidence,
    )
    {
        self.status = self
            .status
            .or(other.status);
        if self
            .blob_before
            .is_none()
        {
            self.blob_before = other.blob_before;
        }
        if self
            .blob_after
            .is_none()
        {
            self.blob_after = other.blob_after;
        }
        self.units_before
            .extend(other.units_before);
        self.units_after
            .extend(other.units_after);
    }
}

impl From<&FileAnalysis> for FileEvidence
{
    fn from(file: &FileAnalysis) -> Self
    {
        Self {
            filename: file
                .filename
                .clone(),
            status: Some(file.status),
            blob_before: file
                .blob_before
                .clone(),
            blob_after: file
                .blob_after
                .clone(),
            units_before: file
                .units_before
                .iter()
                .cloned()
                .collect(),
            units_after: file
                .units_after
                .iter()
                .cloned()
                .collect(),
        }
    }
}

/// A commit that may relate to a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate
{
    pub commit_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub matched_queries: IndexSet<String>,

    #[serde(default)]
    pub matched_units: BTreeSet<String>,

    /// Normalised score per scoring source
    #[serde(default)]
    pub raw_scores: BTreeMap<String, f64>,

    /// Reason attached to each source's retained score
    #[serde(default)]
    pub reasons: BTreeMap<String, String>,

    /// Sources whose collaborator failed for this commit
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub failed_sources: BTreeSet<String>,

    #[serde(default)]
    pub files: Vec<FileEvidence>,

    #[serde(default)]
    pub final_score: f64,
}

impl Candidate
{
    pub fn new(commit_id: &str) -> Self
    {
        Self {
            commit_id: commit_id.to_string(),
            url: None,
            message: String::new(),
            matched_queries: IndexSet::new(),
            matched_units: BTreeSet::new(),
            raw_scores: BTreeMap::new(),
            reasons: BTreeMap::new(),
            failed_sources: BTreeSet::new(),
            files: Vec::new(),
            final_score: 0.0,
        }
    }

    fn file_mut(
        &mut self,
        filename: &str,
    ) -> &mut FileEvidence
    {
        let idx = match self
            .files
            .iter()
            .position(|f| f.filename == filename)
        {
            Some(i) => i,
            None =>
            {
                self.files
                    .push(FileEvidence { filename: filename.to_string(), ..Default::default() });
                self.files
                    .len()
                    - 1
            }
        };
        &mut self.files[idx]
    }

    fn add_file(
        &mut self,
        file: FileEvidence,
    )
    {
        let name = file
            .filename
            .clone();
        self.file_mut(&name)
            .absorb(file);
    }

    /// Before-side units across files, file order
    pub fn units_before(&self) -> Vec<String>
    {
        let set: IndexSet<&String> = self
            .files
            .iter()
            .flat_map(|f| &f.units_before)
            .collect();
        set.into_iter()
            .cloned()
            .collect()
    }

    /// After-side units across files, file order
    pub fn units_after(&self) -> Vec<String>
    {
        let set: IndexSet<&String> = self
            .files
            .iter()
            .flat_map(|f| &f.units_after)
            .collect();
        set.into_iter()
            .cloned()
            .collect()
    }

    pub fn first_before_ref(&self) -> Option<&str>
    {
        self.files
            .iter()
            .find_map(|f| f.blob_before.as_deref())
    }

    pub fn first_after_ref(&self) -> Option<&str>
    {
        self.files
            .iter()
            .find_map(|f| f.blob_after.as_deref())
    }

    /// Keep only `keep` files; units must name a kept file's contract
    pub fn retain_files(
        &mut self,
        keep: &[String],
    )
    {
        self.files
            .retain(|f| keep.contains(&f.filename));

        let kept: Vec<String> = self
            .files
            .iter()
            .map(|f| {
                f.filename
                    .clone()
            })
            .collect();
        let belongs = |unit: &String| {
            kept.iter()
                .any(|path| loosely_matches(unit_prefix(unit), path))
        };

        for file in &mut self.files
        {
            file.units_before
                .retain(|u| belongs(u));
            file.units_after
                .retain(|u| belongs(u));
        }
        self.matched_units
            .retain(|u| belongs(u));
    }
}

/// Merges evidence from any number of passes into candidates
#[derive(Debug, Default)]
pub struct CandidateAggregator
{
    candidates: IndexMap<String, Candidate>,
}

impl CandidateAggregator
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn len(&self) -> usize
    {
        self.candidates
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.candidates
            .is_empty()
    }

    pub fn get(
        &self,
        commit_id: &str,
    ) -> Option<&Candidate>
    {
        self.candidates
            .get(commit_id)
    }

    /// Fold one pass result in. Merging the same evidence twice is a no-op.
    pub fn merge(
        &mut self,
        ev: Evidence,
    )
    {
        let cand = self
            .candidates
            .entry(
                ev.commit_id
                    .clone(),
            )
            .or_insert_with(|| Candidate::new(&ev.commit_id));

        if cand
            .message
            .is_empty()
        {
            if let Some(msg) = ev.message
            {
                cand.message = msg;
            }
        }

        cand.matched_queries
            .extend(ev.matched_queries);
        cand.matched_units
            .extend(ev.matched_units);
        for filename in &ev.files
        {
            cand.file_mut(filename);
        }

        if ev.failed
        {
            cand.failed_sources
                .insert(
                    ev.source
                        .clone(),
                );
        }

        match ev.score
        {
            Some(score) =>
            {
                let better = cand
                    .raw_scores
                    .get(&ev.source)
                    .is_none_or(|&old| score > old);
                if better
                {
                    cand.raw_scores
                        .insert(
                            ev.source
                                .clone(),
                            score,
                        );
                    match ev.reason
                    {
                        Some(reason) =>
                        {
                            cand.reasons
                                .insert(ev.source, reason);
                        }
                        None =>
                        {
                            cand.reasons
                                .remove(&ev.source);
                        }
                    }
                }
            }
            None =>
            {
                if let Some(reason) = ev.reason
                {
                    cand.reasons
                        .entry(ev.source)
                        .or_insert(reason);
                }
            }
        }
    }

    /// Attach structural detail to candidates that already exist
    pub fn attach_analysis(
        &mut self,
        analyses: &[CommitAnalysis],
    )
    {
        for analysis in analyses
        {
            let Some(cand) = self
                .candidates
                .get_mut(&analysis.commit_id)
            else
            {
                continue;
            };

            if cand
                .message
                .is_empty()
            {
                cand.message = analysis
                    .message
                    .clone();
            }
            if cand
                .url
                .is_none()
            {
                cand.url = analysis
                    .url
                    .clone();
            }
            for file in &analysis.files
            {
                cand.add_file(FileEvidence::from(file));
            }
        }
    }

    /// Compute final scores and order: score descending, first-seen on ties
    pub fn finish(
        self,
        combine: Combine,
        limit: Option<usize>,
    ) -> Vec<Candidate>
    {
        let mut ranked: Vec<Candidate> = self
            .candidates
            .into_values()
            .map(|mut c| {
                c.final_score = combine.apply(
                    c.raw_scores
                        .values()
                        .copied(),
                );
                c
            })
            .collect();

        // stable: equal scores keep insertion order
        ranked.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
        });

        if let Some(n) = limit
        {
            ranked.truncate(n);
        }

        debug!(candidates = ranked.len(), "ranking finished");
        ranked
    }
}

/// Aggregator behind a mutex for incremental merges from worker threads
#[derive(Debug, Default)]
pub struct SharedAggregator
{
    inner: Mutex<CandidateAggregator>,
}

impl SharedAggregator
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn merge(
        &self,
        ev: Evidence,
    )
    {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(ev);
    }

    pub fn into_inner(self) -> CandidateAggregator
    {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests
{
    use rayon::prelude::*;

    use super::*;

    fn ev(
        source: &str,
        id: &str,
        score: Option<f64>,
    ) -> Evidence
    {
        Evidence {
            source: source.into(),
            commit_id: id.into(),
            message: Some(format!("msg {}", id)),
            score,
            reason: Some(format!("{} says {}", source, id)),
            matched_queries: vec!["withdraw".into()],
            matched_units: vec!["Vault::withdraw".into()],
            files: vec!["Vault.sol".into()],
            failed: false,
        }
    }

    #[test]
    fn test_merge_is_idempotent()
    {
        let batch = vec![ev("llm", "c1", Some(0.9)), ev("search", "c1", None), ev("llm", "c2", Some(0.3))];

        let mut once = CandidateAggregator::new();
        batch
            .iter()
            .cloned()
            .for_each(|e| once.merge(e));

        let mut twice = CandidateAggregator::new();
        for _ in 0..2
        {
            batch
                .iter()
                .cloned()
                .for_each(|e| twice.merge(e));
        }

        assert_eq!(once.finish(Combine::Max, None), twice.finish(Combine::Max, None));
    }

    #[test]
    fn test_ordering_and_ties()
    {
        let mut agg = CandidateAggregator::new();
        agg.merge(ev("llm", "a", Some(0.5)));
        agg.merge(ev("llm", "b", Some(0.9)));
        agg.merge(ev("llm", "c", Some(0.5)));
        agg.merge(ev("search", "d", None));

        let ids: Vec<_> = agg
            .finish(Combine::Max, None)
            .into_iter()
            .map(|c| c.commit_id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_per_source_max_and_combine()
    {
        let mut agg = CandidateAggregator::new();
        agg.merge(ev("llm", "c1", Some(0.4)));
        agg.merge(ev("llm", "c1", Some(0.8)));
        agg.merge(ev("llm", "c1", Some(0.6)));
        agg.merge(ev("embedding", "c1", Some(0.2)));

        let cand = agg
            .get("c1")
            .unwrap()
            .clone();
        assert_eq!(cand.raw_scores["llm"], 0.8);
        assert_eq!(cand.raw_scores.len(), 2);
        assert_eq!(Combine::Max.apply(cand.raw_scores.values().copied()), 0.8);
        assert!((Combine::Mean.apply(cand.raw_scores.values().copied()) - 0.5).abs() < 1e-12);
        assert_eq!(Combine::Mean.apply(Vec::new()), 0.0);
    }

    #[test]
    fn test_limit_truncates()
    {
        let mut agg = CandidateAggregator::new();
        for i in 0..5
        {
            agg.merge(ev("llm", &format!("c{}", i), Some(i as f64 / 10.0)));
        }
        let out = agg.finish(Combine::Max, Some(2));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].commit_id, "c4");
    }

    #[test]
    fn test_shared_aggregator_under_rayon()
    {
        let shared = SharedAggregator::new();
        (0..200)
            .into_par_iter()
            .for_each(|i| shared.merge(ev("llm", &format!("c{}", i % 10), Some((i % 7) as f64 / 10.0))));

        let out = shared
            .into_inner()
            .finish(Combine::Max, None);
        assert_eq!(out.len(), 10);
        assert!(
            out.iter()
                .all(|c| c.final_score == 0.6)
        );
    }

    #[test]
    fn test_retain_files_filters_units()
    {
        let mut cand = Candidate::new("c1");
        cand.add_file(FileEvidence {
            filename: "src/Vault.sol".into(),
            units_after: ["Vault::withdraw".to_string()].into_iter().collect(),
            ..Default::default()
        });
        cand.add_file(FileEvidence {
            filename: "src/Token.sol".into(),
            units_after: ["Token::mint".to_string()].into_iter().collect(),
            ..Default::default()
        });
        cand.matched_units = ["Vault::withdraw", "Token::mint"]
            .into_iter()
            .map(String::from)
            .collect();

        cand.retain_files(&["src/Vault.sol".to_string()]);
        assert_eq!(cand.files.len(), 1);
        assert_eq!(cand.units_after(), vec!["Vault::withdraw"]);
        assert_eq!(cand.matched_units.into_iter().collect::<Vec<_>>(), vec!["Vault::withdraw"]);
    }
}
