//! `fixtrace completions <SHELL>`: scripts go to stdout unless `--out-dir` is set.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Generator, Shell, generate, generate_to};
use tracing::debug;

use crate::cli::{AppContext, Cli, CompletionsArgs};

pub const BIN_NAME: &str = "fixtrace";

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    match args.out_dir.as_deref() {
        Some(dir) => write_script(args.shell, dir, ctx),
        None => {
            let mut out = io::stdout().lock();
            generate(args.shell, &mut Cli::command(), BIN_NAME, &mut out);
            out.flush().context("Failed to flush completion script")
        }
    }
}

fn write_script(shell: Shell, dir: &Path, ctx: &AppContext) -> Result<()> {
    let target = dir.join(shell.file_name(BIN_NAME));
    if ctx.dry_run {
        println!("Would write {shell} completion to {}", target.display());
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = generate_to(shell, &mut Cli::command(), BIN_NAME, dir)
        .with_context(|| format!("Failed to write {shell} completion"))?;
    debug!(path = %path.display(), "completion written");

    if !ctx.quiet {
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}
