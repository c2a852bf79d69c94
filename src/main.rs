use anyhow::{Context, Result};
use clap::Parser;
use fixtrace::cli::{AppContext, Cli, Commands};
use fixtrace::cli_ext::{finding_cmd, inspect_cmd, rank_cmd};
use tracing_subscriber::EnvFilter;

fn init_tracing(ctx: &AppContext) {
    let fallback = if ctx.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("FIXTRACE_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

    // Logs on stderr; stdout carries results
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!ctx.no_color)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    init_tracing(&ctx);

    let cfg = fixtrace::load_config()?;
    if let Some(n) = cfg.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    match cli.command {
        Commands::Hunks(args) => inspect_cmd::hunks(args, &ctx),
        Commands::Units(args) => inspect_cmd::units(args, &ctx),
        Commands::Snippet(args) => inspect_cmd::snippet(args, &ctx),
        Commands::Rank(args) => rank_cmd::rank(args, &cfg, &ctx),
        Commands::Prompt(args) => rank_cmd::prompt(args, &cfg, &ctx),
        Commands::Resolve(args) => finding_cmd::resolve(args, &cfg, &ctx),
        Commands::Attach(args) => finding_cmd::attach(args, &ctx),
        Commands::Findings(args) => finding_cmd::list(args, &ctx),
        Commands::Init(args) => fixtrace::infra::config::init(args, &ctx),
        Commands::Completions(args) => fixtrace::completion::run(args, &ctx),
    }
}
