//! End-to-end ranking: analyze, run passes, join, merge, order

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::analyze::{CommitAnalysis, analyze_commits};
use crate::core::candidate::{Candidate, CandidateAggregator, Combine};
use crate::core::commit::CommitRecord;
use crate::core::filter::SourceFilter;
use crate::core::finding::Finding;
use crate::core::scoring::{PassInput, QueryPass, ScoringPass, StructuralPass, run_passes};
use crate::core::search::QueryMatcher;
use crate::infra::config::Config;

/// Knobs for one ranking run
#[derive(Debug, Clone, Default)]
pub struct RankOptions
{
    pub combine: Combine,
    pub limit: Option<usize>,

    /// Literal queries for the search pass (merged with the finding's own)
    pub queries: Vec<String>,

    /// Hide the analysis progress bar
    pub quiet: bool,
}

impl RankOptions
{
    pub fn from_config(cfg: &Config) -> Self
    {
        Self {
            combine: cfg
                .ranking
                .combine,
            limit: cfg
                .ranking
                .limit,
            ..Default::default()
        }
    }
}

/// Ranked candidates plus what produced them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSet
{
    /// Pass names in run order
    pub sources: Vec<String>,

    /// Commits analyzed before merging
    pub analyzed: usize,

    pub candidates: Vec<Candidate>,
}

/// Built-in passes: structural always, search when there is anything to look for
fn builtin_passes(
    finding: Option<&Finding>,
    queries: &[String],
) -> Result<Vec<Box<dyn ScoringPass>>>
{
    let mut all: Vec<String> = queries.to_vec();
    if let Some(extracted) = finding.and_then(Finding::query_candidates)
    {
        all.extend(extracted.into_queries());
    }

    let mut passes: Vec<Box<dyn ScoringPass>> = vec![Box::new(StructuralPass)];
    let matcher = QueryMatcher::new(&all)?;
    if !matcher.is_empty()
    {
        passes.push(Box::new(QueryPass::new(matcher)));
    }
    Ok(passes)
}

/// Rank `records` against an optional finding.
///
/// `extra` passes run after the built-in ones; their order is kept in the
/// joined evidence, so first-seen ties stay reproducible.
#[instrument(skip_all, fields(commits = records.len(), extra = extra.len()))]
pub fn rank_commits(
    records: &[CommitRecord],
    finding: Option<&Finding>,
    extra: Vec<Box<dyn ScoringPass>>,
    filter: &SourceFilter,
    opts: &RankOptions,
) -> Result<RankedSet>
{
    let analyses: Vec<CommitAnalysis> = analyze_commits(records, filter, opts.quiet);

    let mut passes = builtin_passes(finding, &opts.queries)?;
    passes.extend(extra);
    let sources: Vec<String> = passes
        .iter()
        .map(|p| {
            p.name()
                .to_string()
        })
        .collect();

    let input = PassInput { finding, commits: &analyses };
    let evidence = run_passes(&passes, &input);

    let mut agg = CandidateAggregator::new();
    for ev in evidence
    {
        agg.merge(ev);
    }
    agg.attach_analysis(&analyses);

    let candidates = agg.finish(opts.combine, opts.limit);
    info!(
        analyzed = analyses.len(),
        candidates = candidates.len(),
        "ranking complete"
    );

    Ok(RankedSet { sources, analyzed: analyses.len(), candidates })
}
