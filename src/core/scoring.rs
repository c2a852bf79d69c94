//! Scoring passes and the parallel pass runner
//!
//! Each pass looks at the same analyzed commits and reports records keyed by
//! commit id. Passes run on the rayon pool; their outputs are joined in pass
//! order before anything reaches the aggregator.

use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::core::analyze::CommitAnalysis;
use crate::core::finding::Finding;
use crate::core::normalize::{Evidence, ScoreRecord, ScoringFailure, parse_rankings};
use crate::core::prompt::relevance_prompt;
use crate::core::search::QueryMatcher;
use crate::infra::config::PromptConfig;

/// What every pass sees
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a>
{
    pub finding: Option<&'a Finding>,
    pub commits: &'a [CommitAnalysis],
}

/// One independent source of evidence about commits
pub trait ScoringPass: Send + Sync
{
    /// Source name recorded on every score this pass produces
    fn name(&self) -> &str;

    /// False for passes that only contribute evidence, never a score
    fn scored(&self) -> bool
    {
        true
    }

    fn score(
        &self,
        input: &PassInput<'_>,
    ) -> Result<Vec<ScoreRecord>, ScoringFailure>;
}

/// Text embedding collaborator
pub trait Embedder: Send + Sync
{
    fn embed(
        &self,
        text: &str,
    ) -> Result<Vec<f32>, ScoringFailure>;
}

/// Chat/completion collaborator returning raw model text
pub trait TextCompleter: Send + Sync
{
    fn complete(
        &self,
        prompt: &str,
    ) -> Result<String, ScoringFailure>;
}

/// Every commit that touched at least one source file, with its units
#[derive(Debug, Default)]
pub struct StructuralPass;

impl ScoringPass for StructuralPass
{
    fn name(&self) -> &str
    {
        "structural"
    }

    fn scored(&self) -> bool
    {
        false
    }

    fn score(
        &self,
        input: &PassInput<'_>,
    ) -> Result<Vec<ScoreRecord>, ScoringFailure>
    {
        Ok(input
            .commits
            .iter()
            .filter(|c| !c.files.is_empty())
            .map(|c| ScoreRecord {
                commit_id: c
                    .commit_id
                    .clone(),
                message: Some(
                    c.message
                        .clone(),
                ),
                matched_units: c
                    .all_units()
                    .map(str::to_string)
                    .collect(),
                files: c
                    .files
                    .iter()
                    .map(|f| {
                        f.filename
                            .clone()
                    })
                    .collect(),
                ..Default::default()
            })
            .collect())
    }
}

/// Literal query hits in messages and source patches
#[derive(Debug)]
pub struct QueryPass
{
    matcher: QueryMatcher,
}

impl QueryPass
{
    pub fn new(matcher: QueryMatcher) -> Self
    {
        Self { matcher }
    }
}

impl ScoringPass for QueryPass
{
    fn name(&self) -> &str
    {
        "search"
    }

    fn scored(&self) -> bool
    {
        false
    }

    fn score(
        &self,
        input: &PassInput<'_>,
    ) -> Result<Vec<ScoreRecord>, ScoringFailure>
    {
        Ok(input
            .commits
            .iter()
            .filter_map(|c| {
                let matched = self
                    .matcher
                    .match_commit(c);
                (!matched.is_empty()).then(|| ScoreRecord {
                    commit_id: c
                        .commit_id
                        .clone(),
                    message: Some(
                        c.message
                            .clone(),
                    ),
                    reasoning: Some(format!("matched {}", matched.join(", "))),
                    matched_queries: matched,
                    ..Default::default()
                })
            })
            .collect())
    }
}

/// Cosine similarity clamped to `[0, 1]`; zero vectors score 0
pub fn cosine_similarity(
    a: &[f32],
    b: &[f32],
) -> f64
{
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .fold((0.0_f64, 0.0_f64, 0.0_f64), |(dot, na, nb), (&x, &y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            (dot + x * y, na + x * x, nb + y * y)
        });

    if na == 0.0 || nb == 0.0
    {
        return 0.0;
    }
    let sim = dot / (na.sqrt() * nb.sqrt());
    if sim.is_finite() { sim.clamp(0.0, 1.0) } else { 0.0 }
}

/// Embedding prefilter: keeps the `top_n` commits most similar to the finding
pub struct EmbeddingPass<E>
{
    embedder: E,
    top_n: usize,
}

impl<E: Embedder> EmbeddingPass<E>
{
    pub fn new(
        embedder: E,
        top_n: usize,
    ) -> Self
    {
        Self { embedder, top_n }
    }
}

impl<E: Embedder> ScoringPass for EmbeddingPass<E>
{
    fn name(&self) -> &str
    {
        "embedding"
    }

    fn score(
        &self,
        input: &PassInput<'_>,
    ) -> Result<Vec<ScoreRecord>, ScoringFailure>
    {
        let Some(finding) = input.finding
        else
        {
            return Ok(Vec::new());
        };

        let target = self
            .embedder
            .embed(&finding.similarity_text())?;

        let mut scored = Vec::with_capacity(
            input
                .commits
                .len(),
        );
        for commit in input.commits
        {
            let units: Vec<&str> = commit
                .units_after()
                .collect();
            let text = if units.is_empty()
            {
                commit
                    .message
                    .clone()
            }
            else
            {
                format!("{} {}", commit.message, units.join(" "))
            };
            let vector = self
                .embedder
                .embed(&text)?;
            scored.push((commit, cosine_similarity(&target, &vector)));
        }

        // stable: equal similarity keeps commit order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(self.top_n);

        Ok(scored
            .into_iter()
            .map(|(commit, sim)| ScoreRecord {
                commit_id: commit
                    .commit_id
                    .clone(),
                score: Some(sim),
                reasoning: Some(format!("embedding similarity {:.2}", sim)),
                ..Default::default()
            })
            .collect())
    }
}

/// Language-model relevance ranking over the rendered prompt
pub struct LlmPass<T>
{
    completer: T,
    prompt: PromptConfig,
}

impl<T: TextCompleter> LlmPass<T>
{
    pub fn new(
        completer: T,
        prompt: PromptConfig,
    ) -> Self
    {
        Self { completer, prompt }
    }
}

impl<T: TextCompleter> ScoringPass for LlmPass<T>
{
    fn name(&self) -> &str
    {
        "llm"
    }

    fn score(
        &self,
        input: &PassInput<'_>,
    ) -> Result<Vec<ScoreRecord>, ScoringFailure>
    {
        let Some(finding) = input.finding
        else
        {
            return Ok(Vec::new());
        };
        if input
            .commits
            .is_empty()
        {
            return Ok(Vec::new());
        }

        let prompt = relevance_prompt(finding, input.commits, &self.prompt);
        let raw = self
            .completer
            .complete(&prompt)?;
        parse_rankings(&raw)
    }
}

/// Scores read from a file, replayed as their own source
#[derive(Debug, Clone)]
pub struct ReplayPass
{
    name: String,
    records: Vec<ScoreRecord>,
}

impl ReplayPass
{
    pub fn new(
        name: impl Into<String>,
        records: Vec<ScoreRecord>,
    ) -> Self
    {
        Self { name: name.into(), records }
    }
}

impl ScoringPass for ReplayPass
{
    fn name(&self) -> &str
    {
        &self.name
    }

    fn score(
        &self,
        _input: &PassInput<'_>,
    ) -> Result<Vec<ScoreRecord>, ScoringFailure>
    {
        Ok(self
            .records
            .clone())
    }
}

/// Run every pass on the rayon pool and join.
///
/// A pass that fails yields one zero-score failure record per input commit.
#[instrument(skip_all, fields(passes = passes.len(), commits = input.commits.len()))]
pub fn run_passes(
    passes: &[Box<dyn ScoringPass>],
    input: &PassInput<'_>,
) -> Vec<Evidence>
{
    let per_pass: Vec<Vec<Evidence>> = passes
        .par_iter()
        .map(|pass| {
            let name = pass.name();
            match pass.score(input)
            {
                Ok(records) =>
                {
                    debug!(pass = name, records = records.len(), "pass finished");
                    records
                        .into_iter()
                        .map(|r| Evidence::from_record(name, r, pass.scored()))
                        .collect()
                }
                Err(failure) =>
                {
                    warn!(pass = name, error = %failure, "pass failed; recording zero scores");
                    input
                        .commits
                        .iter()
                        .map(|c| Evidence::failure(name, &c.commit_id, &failure))
                        .collect()
                }
            }
        })
        .collect();

    per_pass
        .into_iter()
        .flatten()
        .collect()
}
