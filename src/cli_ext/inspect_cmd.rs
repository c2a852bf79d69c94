//! CLI handlers for diff inspection: `hunks`, `units` and `snippet`.
//!
//! Thin wrappers over the pure extraction functions; all output goes to
//! stdout, either as text/tables or as pretty JSON.

use anyhow::Result;
use itertools::Itertools;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::{debug, instrument};

use crate::cli::{AppContext, HunksArgs, SnippetArgs, UnitsArgs};
use crate::core::changed_lines::{ChangedLineSet, Side};
use crate::core::hunk::{Hunk, HunkHeader, split_hunks};
use crate::core::snippet::extract_function_code;
use crate::core::tagger::tag_hunk_functions;
use crate::core::units::{CodeUnit, changed_units};
use crate::infra::io::{read_text, write_json};

#[derive(Debug, Serialize)]
struct HunkReport<'a>
{
    header_line: &'a str,
    header: Option<&'a HunkHeader>,
    old_lines: ChangedLineSet,
    new_lines: ChangedLineSet,
    additions: usize,
    functions: Vec<String>,
}

impl<'a> HunkReport<'a>
{
    fn new(hunk: &'a Hunk) -> Self
    {
        Self {
            header_line: &hunk.header_line,
            header: hunk
                .header
                .as_ref(),
            old_lines: hunk.changed_lines(Side::Old),
            new_lines: hunk.changed_lines(Side::New),
            additions: hunk.additions(),
            functions: tag_hunk_functions(hunk.body()),
        }
    }
}

fn join_lines(set: &ChangedLineSet) -> String
{
    if set.is_empty()
    {
        return "-".to_string();
    }
    set.iter()
        .join(",")
}

/// `fixtrace hunks <PATCH>`
#[instrument(skip_all, fields(patch = %args.patch.display()))]
pub fn hunks(
    args: HunksArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let patch = read_text(&args.patch)?;
    let hunks = split_hunks(&patch);
    let reports: Vec<HunkReport> = hunks
        .iter()
        .map(HunkReport::new)
        .collect();
    debug!(hunks = reports.len(), "split patch");

    if args.json
    {
        return write_json(None, &reports);
    }

    for report in &reports
    {
        let header = match report.header
        {
            Some(h) => h.to_string(),
            None => format!("{} (unparsed)", report.header_line),
        };
        if ctx.no_color
        {
            println!("{}", header);
        }
        else
        {
            println!(
                "{}",
                header
                    .cyan()
                    .bold()
            );
        }
        println!("  old: {}", join_lines(&report.old_lines));
        println!("  new: {}", join_lines(&report.new_lines));
        if !report
            .functions
            .is_empty()
        {
            println!("  declares: {}", report.functions.join(", "));
        }
    }

    if reports.is_empty() && !ctx.quiet
    {
        eprintln!("No hunks found in {}", args.patch.display());
    }
    Ok(())
}

#[derive(Tabled)]
struct UnitRow
{
    #[tabled(rename = "Unit")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Lines")]
    lines: String,
}

impl From<&CodeUnit> for UnitRow
{
    fn from(u: &CodeUnit) -> Self
    {
        Self {
            name: u.qualified_name(),
            kind: u
                .kind
                .to_string(),
            lines: format!("{}-{}", u.start_line, u.end_line),
        }
    }
}

/// `fixtrace units --patch <FILE> (--source <FILE> | --hunk-only)`
#[instrument(skip_all, fields(patch = %args.patch.display()))]
pub fn units(
    args: UnitsArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let patch = read_text(&args.patch)?;
    let hunks = split_hunks(&patch);

    let source = match (&args.source, args.hunk_only)
    {
        (Some(path), false) => Some(read_text(path)?),
        _ => None,
    };

    let Some(source) = source
    else
    {
        // Declarations visible in the hunk lines only
        let names: Vec<String> = hunks
            .iter()
            .flat_map(|h| tag_hunk_functions(h.body()))
            .unique()
            .collect();
        if args.json
        {
            return write_json(None, &names);
        }
        for name in names
        {
            println!("{}", name);
        }
        return Ok(());
    };

    let side = Side::from(args.side);
    let changed: ChangedLineSet = hunks
        .iter()
        .flat_map(|h| h.changed_lines(side))
        .collect();
    let found = changed_units(&source, &changed);
    debug!(changed = changed.len(), units = found.len(), "extracted units");

    if args.json
    {
        return write_json(None, &found);
    }

    if found.is_empty()
    {
        if !ctx.quiet
        {
            eprintln!("No code units touched");
        }
        return Ok(());
    }

    let rows: Vec<UnitRow> = found
        .iter()
        .map(UnitRow::from)
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

/// `fixtrace snippet --source <FILE> --name <NAME> [--line N]`
#[instrument(skip_all, fields(name = %args.name))]
pub fn snippet(
    args: SnippetArgs,
    _ctx: &AppContext,
) -> Result<()>
{
    let source = read_text(&args.source)?;
    let code = extract_function_code(&source, &args.name, args.line);

    if code.is_empty()
    {
        anyhow::bail!("No declaration of {} found in {}", args.name, args.source.display());
    }
    println!("{}", code);
    Ok(())
}
