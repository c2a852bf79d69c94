//! CLI handlers for `rank` and `prompt`.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tabled::{Table, Tabled};
use tracing::{info, instrument};

use crate::cli::{AppContext, PromptArgs, RankArgs};
use crate::cli_ext::finding_cmd::{load_findings, pick};
use crate::core::analyze::analyze_commits;
use crate::core::candidate::Candidate;
use crate::core::commit::CommitRecord;
use crate::core::filter::SourceFilter;
use crate::core::normalize::ScoreRecord;
use crate::core::prompt::{query_prompt, relevance_prompt};
use crate::core::rank::{RankOptions, RankedSet, rank_commits};
use crate::core::scoring::{ReplayPass, ScoringPass};
use crate::infra::config::Config;
use crate::infra::io::{load_records, load_values, write_json};

const MESSAGE_WIDTH: usize = 60;
const UNITS_SHOWN: usize = 3;

/// Scorer output file as a replay pass named `file:<stem>`
pub fn replay_pass(path: &Path) -> Result<ReplayPass>
{
    let stem = path
        .file_stem()
        .map(|s| {
            s.to_string_lossy()
                .into_owned()
        })
        .context("scores path has no file name")?;

    let records: Vec<ScoreRecord> = load_values(path)?
        .iter()
        .filter_map(ScoreRecord::from_value)
        .collect();
    info!(file = %path.display(), records = records.len(), "loaded scores");

    Ok(ReplayPass::new(format!("file:{}", stem), records))
}

#[derive(Tabled)]
struct CandidateRow
{
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Commit")]
    commit: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Sources")]
    sources: String,
    #[tabled(rename = "Units")]
    units: String,
}

fn first_line_clipped(
    text: &str,
    width: usize,
) -> String
{
    let line = text
        .lines()
        .next()
        .unwrap_or_default();
    if line
        .chars()
        .count()
        <= width
    {
        return line.to_string();
    }
    let mut clipped: String = line
        .chars()
        .take(width.saturating_sub(1))
        .collect();
    clipped.push('…');
    clipped
}

impl CandidateRow
{
    fn new(
        rank: usize,
        c: &Candidate,
    ) -> Self
    {
        let mut sources: Vec<String> = c
            .raw_scores
            .iter()
            .map(|(src, s)| format!("{}={:.2}", src, s))
            .collect();
        sources.extend(
            c.failed_sources
                .iter()
                .map(|s| format!("{}!", s)),
        );
        if !c
            .matched_queries
            .is_empty()
        {
            sources.push(format!("search({})", c.matched_queries.len()));
        }

        let units = c.units_after();
        let mut shown: Vec<&str> = units
            .iter()
            .take(UNITS_SHOWN)
            .map(String::as_str)
            .collect();
        let more = units
            .len()
            .saturating_sub(UNITS_SHOWN);
        let extra = format!("+{}", more);
        if more > 0
        {
            shown.push(&extra);
        }

        Self {
            rank,
            score: format!("{:.3}", c.final_score),
            commit: c
                .commit_id
                .clone(),
            message: first_line_clipped(&c.message, MESSAGE_WIDTH),
            sources: sources.join(" "),
            units: shown.join(", "),
        }
    }
}

fn print_table(
    ranked: &RankedSet,
    ctx: &AppContext,
)
{
    let summary = format!(
        "{} candidates from {} commits ({})",
        ranked
            .candidates
            .len(),
        ranked.analyzed,
        ranked
            .sources
            .join(", ")
    );
    if ctx.no_color
    {
        println!("{}", summary);
    }
    else
    {
        println!(
            "{}",
            summary
                .green()
                .bold()
        );
    }

    if ranked
        .candidates
        .is_empty()
    {
        return;
    }

    let rows: Vec<CandidateRow> = ranked
        .candidates
        .iter()
        .enumerate()
        .map(|(i, c)| CandidateRow::new(i + 1, c))
        .collect();
    println!("{}", Table::new(rows));
}

/// `fixtrace rank --commits <FILE> [--scores <FILE>...] [--query Q...]`
#[instrument(skip_all, fields(commits = %args.commits.display()))]
pub fn rank(
    args: RankArgs,
    cfg: &Config,
    ctx: &AppContext,
) -> Result<()>
{
    let records: Vec<CommitRecord> = load_records(&args.commits)?;

    let findings = match &args.finding
    {
        Some(path) => load_findings(path)?,
        None => Vec::new(),
    };
    let finding = match &args.finding
    {
        Some(_) => Some(pick(&findings, args.index)?),
        None => None,
    };

    let mut extra: Vec<Box<dyn ScoringPass>> = Vec::new();
    for path in &args.scores
    {
        extra.push(Box::new(replay_pass(path)?));
    }

    let mut opts = RankOptions::from_config(cfg);
    if let Some(combine) = args.combine
    {
        opts.combine = combine;
    }
    if args
        .limit
        .is_some()
    {
        opts.limit = args.limit;
    }
    opts.queries = args.query;
    opts.quiet = ctx.quiet;

    let filter = SourceFilter::new(&cfg.filter)?;
    let ranked = rank_commits(&records, finding, extra, &filter, &opts)?;

    if let Some(out) = &args.out
    {
        if ctx.dry_run
        {
            println!("Would write {} candidates to {}", ranked.candidates.len(), out.display());
        }
        else
        {
            write_json(Some(out.as_path()), &ranked.candidates)?;
            if !ctx.quiet
            {
                eprintln!("Wrote ranked candidates to {}", out.display());
            }
        }
    }

    if args.json
    {
        return write_json(None, &ranked.candidates);
    }
    print_table(&ranked, ctx);
    Ok(())
}

/// `fixtrace prompt --finding <FILE> [--index N] (--commits <FILE> | --queries)`
#[instrument(skip_all, fields(finding = %args.finding.display(), index = args.index))]
pub fn prompt(
    args: PromptArgs,
    cfg: &Config,
    ctx: &AppContext,
) -> Result<()>
{
    let findings = load_findings(&args.finding)?;
    let finding = pick(&findings, args.index)?;

    if args.queries
    {
        println!("{}", query_prompt(finding));
        return Ok(());
    }

    let path = args
        .commits
        .context("--commits is required for the relevance prompt")?;
    let records: Vec<CommitRecord> = load_records(&path)?;
    let filter = SourceFilter::new(&cfg.filter)?;
    let analyses = analyze_commits(&records, &filter, ctx.quiet);

    println!("{}", relevance_prompt(finding, &analyses, &cfg.prompt));
    Ok(())
}

#[cfg(test)]
mod tests
{
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_clip_message()
    {
        assert_eq!(first_line_clipped("short\nsecond", 10), "short");
        assert_eq!(first_line_clipped("abcdefghijk", 5), "abcd…");
        assert_eq!(first_line_clipped("", 5), "");
    }

    #[test]
    fn test_row_lists_sources_and_units()
    {
        let mut c = Candidate::new("github.com/o/r@abc");
        c.final_score = 0.95;
        c.raw_scores = BTreeMap::from([("llm".to_string(), 0.95), ("file:s".to_string(), 0.4)]);
        c.failed_sources
            .insert("embedding".into());

        let row = CandidateRow::new(1, &c);
        assert_eq!(row.score, "0.950");
        assert_eq!(row.sources, "file:s=0.40 llm=0.95 embedding!");
        assert_eq!(row.units, "");
    }

    #[test]
    fn test_replay_pass_name_from_stem()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("gpt_scores.json");
        std::fs::write(&path, r#"[{"url":"https://github.com/o/r/commit/ABC","score":80}]"#).unwrap();

        let pass = replay_pass(&path).unwrap();
        assert_eq!(pass.name(), "file:gpt_scores");
    }
}
