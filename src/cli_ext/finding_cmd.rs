//! CLI handlers for findings: `findings`, `resolve` and `attach`.
//!
//! `attach` edits findings through a [`FindingSession`] so a batch of unit
//! additions either lands completely or leaves the file untouched.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use miette::Diagnostic;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::{debug, instrument, warn};

use crate::cli::{AppContext, AttachArgs, FindingsArgs, ResolveArgs};
use crate::core::analyze::analyze_commit;
use crate::core::candidate::{Candidate, FileEvidence};
use crate::core::commit::CommitRecord;
use crate::core::filter::SourceFilter;
use crate::core::finding::{ContextEntry, ContextError, Finding, FindingSession};
use crate::core::resolve::{Resolution, resolve_blob_refs, unit_prefix};
use crate::core::url::{RepoRef, UrlError, blob_to_commit_url, canonical_commit_id};
use crate::infra::config::Config;
use crate::infra::io::{load_records, load_values, write_json};

/// Findings from a JSON array, object, or NDJSON file; non-objects are skipped
pub fn load_findings(path: &Path) -> Result<Vec<Finding>>
{
    let values = load_values(path)?;
    let total = values.len();
    let findings: Vec<Finding> = values
        .into_iter()
        .filter_map(Finding::from_value)
        .collect();
    if findings.len() < total
    {
        warn!(file = %path.display(), skipped = total - findings.len(), "non-object findings skipped");
    }
    Ok(findings)
}

pub fn pick(
    findings: &[Finding],
    index: usize,
) -> Result<&Finding>
{
    findings
        .get(index)
        .ok_or(ContextError::NoSuchFinding(index))
        .with_context(|| format!("{} findings loaded", findings.len()))
}

#[derive(Tabled)]
struct FindingRow
{
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Finding")]
    label: String,
    #[tabled(rename = "Repo")]
    repo: String,
    #[tabled(rename = "Context")]
    context: String,
}

fn describe_context(entry: Option<&ContextEntry>) -> String
{
    match entry
    {
        None => "-".to_string(),
        Some(e) =>
        {
            let mut parts = Vec::new();
            if e.source
                .is_some()
            {
                parts.push("source".to_string());
            }
            if e.fix
                .is_some()
            {
                parts.push("fix".to_string());
            }
            let units = e
                .functions_before
                .len()
                + e.functions_after
                    .len();
            if units > 0
            {
                parts.push(format!("{} units", units));
            }
            parts.join(", ")
        }
    }
}

fn repo_summary(refs: &[RepoRef]) -> String
{
    if refs.is_empty()
    {
        return "-".to_string();
    }
    refs.iter()
        .map(RepoRef::label)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `fixtrace findings <FILE>`
#[instrument(skip_all, fields(findings = %args.findings.display()))]
pub fn list(
    args: FindingsArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let findings = load_findings(&args.findings)?;

    if args.json
    {
        let out: Vec<_> = findings
            .iter()
            .enumerate()
            .map(|(i, f)| {
                json!({
                    "index": i,
                    "label": f.label(i),
                    "repo_refs": f.repo_refs(),
                    "context": f.context(),
                })
            })
            .collect();
        return write_json(None, &out);
    }

    if findings.is_empty()
    {
        if !ctx.quiet
        {
            eprintln!("No findings in {}", args.findings.display());
        }
        return Ok(());
    }

    let rows: Vec<FindingRow> = findings
        .iter()
        .enumerate()
        .map(|(i, f)| FindingRow {
            index: i,
            label: f.label(i),
            repo: repo_summary(&f.repo_refs()),
            context: describe_context(
                f.context()
                    .as_ref(),
            ),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

/// URL errors keep their diagnostic help line
fn url_error(e: UrlError) -> anyhow::Error
{
    match e.help()
    {
        Some(help) => anyhow!("{}\n  help: {}", e, help),
        None => anyhow!("{}", e),
    }
}

/// `--commit` as given, or the commit a `/blob/<ref>/...` URL points at
fn commit_arg(raw: &str) -> Result<String>
{
    if !raw.contains("/blob/")
    {
        return Ok(raw.to_string());
    }
    let url = blob_to_commit_url(raw).map_err(url_error)?;
    debug!(blob = raw, commit = %url, "blob reference taken as its commit");
    Ok(url)
}

fn find_record<'a>(
    records: &'a [CommitRecord],
    commit: &str,
) -> Option<&'a CommitRecord>
{
    let target = canonical_commit_id(commit);
    records
        .iter()
        .find(|r| r.canonical_id() == target)
}

fn find_candidate<'a>(
    candidates: &'a [Candidate],
    commit: &str,
) -> Option<&'a Candidate>
{
    let target = canonical_commit_id(commit);
    candidates
        .iter()
        .find(|c| c.commit_id == target)
}

#[derive(Serialize)]
struct ResolveReport<'a>
{
    unit: &'a str,
    commit: String,
    #[serde(flatten)]
    resolution: Resolution,
}

/// `fixtrace resolve --commits <FILE> --commit <ID> --unit <NAME>`
#[instrument(skip_all, fields(commit = %args.commit, unit = %args.unit))]
pub fn resolve(
    args: ResolveArgs,
    cfg: &Config,
    ctx: &AppContext,
) -> Result<()>
{
    let commit = commit_arg(&args.commit)?;
    let records: Vec<CommitRecord> = load_records(&args.commits)?;
    let record = find_record(&records, &commit)
        .with_context(|| format!("commit {} not found in {}", args.commit, args.commits.display()))?;

    let filter = SourceFilter::new(&cfg.filter)?;
    let analysis = analyze_commit(record, &filter);
    let files: Vec<FileEvidence> = analysis
        .files
        .iter()
        .map(FileEvidence::from)
        .collect();
    debug!(files = files.len(), "resolving against source files");

    let resolution = resolve_blob_refs(&args.unit, &files)
        .ok_or_else(|| ContextError::FileNotFound(unit_prefix(&args.unit).to_string()))?;

    if args.json
    {
        let report = ResolveReport { unit: &args.unit, commit: analysis.commit_id, resolution };
        return write_json(None, &report);
    }

    let file_line = format!("{} ({:?})", resolution.filename, resolution.rule);
    if ctx.no_color
    {
        println!("{}", file_line);
    }
    else
    {
        println!(
            "{}",
            file_line
                .green()
                .bold()
        );
    }
    println!(
        "  before: {}",
        resolution
            .before
            .as_deref()
            .unwrap_or("-")
    );
    println!(
        "  after:  {}",
        resolution
            .after
            .as_deref()
            .unwrap_or("-")
    );
    Ok(())
}

/// `fixtrace attach --findings <FILE> --index N --ranked <FILE> --commit <ID>`
#[instrument(skip_all, fields(index = args.index, commit = %args.commit))]
pub fn attach(
    args: AttachArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let findings = load_findings(&args.findings)?;
    let candidates: Vec<Candidate> = load_records(&args.ranked)?;

    let commit = commit_arg(&args.commit)?;
    let mut cand = find_candidate(&candidates, &commit)
        .with_context(|| format!("commit {} not among ranked candidates", args.commit))?
        .clone();
    if !args
        .file
        .is_empty()
    {
        cand.retain_files(&args.file);
    }

    let mut session = FindingSession::new(findings);
    if args
        .unit
        .is_empty()
    {
        session.fix_from_candidate(args.index, &cand)?;
    }
    else
    {
        for unit in &args.unit
        {
            if let Err(e) = session.add_unit(args.index, &cand, unit, args.side)
            {
                let restored = session.undo_all();
                debug!(restored, "rolled back partial edit");
                bail!("{}; findings left unchanged", e);
            }
        }
    }

    let entry = session
        .get(args.index)
        .and_then(Finding::context)
        .unwrap_or_default();

    let target = args
        .out
        .as_deref()
        .unwrap_or(&args.findings);
    if ctx.dry_run
    {
        println!("Would write context to {}:", target.display());
        return write_json(None, &entry);
    }

    write_json(Some(target), session.findings())?;
    if !ctx.quiet
    {
        let label = session
            .get(args.index)
            .map(|f| f.label(args.index))
            .unwrap_or_default();
        eprintln!("Linked {} to {} ({})", label, cand.commit_id, describe_context(Some(&entry)));
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_describe_context()
    {
        assert_eq!(describe_context(None), "-");
        let entry = ContextEntry {
            source: Some("s".into()),
            fix: None,
            functions_before: vec!["A::f".into()],
            functions_after: vec!["A::f".into(), "A::g".into()],
        };
        assert_eq!(describe_context(Some(&entry)), "source, 3 units");
    }

    #[test]
    fn test_pick_out_of_range()
    {
        let findings = vec![Finding::default()];
        assert!(pick(&findings, 0).is_ok());
        let err = pick(&findings, 3).unwrap_err();
        assert!(format!("{:#}", err).contains("no finding at index 3"));
    }

    #[test]
    fn test_find_candidate_by_url()
    {
        let cands = vec![Candidate::new("github.com/o/r@abc123")];
        assert!(find_candidate(&cands, "https://github.com/o/r/commit/ABC123").is_some());
        assert!(find_candidate(&cands, "github.com/o/r@fff").is_none());
    }

    #[test]
    fn test_commit_arg_accepts_blob_urls()
    {
        assert_eq!(commit_arg("github.com/o/r@abc").unwrap(), "github.com/o/r@abc");
        assert_eq!(
            commit_arg("https://github.com/o/r/blob/abc123/src/Vault.sol").unwrap(),
            "https://github.com/o/r/commit/abc123"
        );

        let err = commit_arg("https://github.com/o/r/blob/").unwrap_err();
        let text = format!("{:#}", err);
        assert!(text.contains("not a blob URL"));
        assert!(text.contains("help: expected https://<host>/<owner>/<repo>/blob/<ref>/<path>"));
    }
}
