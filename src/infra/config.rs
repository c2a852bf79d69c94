use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::candidate::Combine;

pub const CONFIG_FILE: &str = "fixtrace.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Which changed files count as source for structural passes
    pub filter: FilterConfig,

    /// Score combination and output cap
    pub ranking: RankingConfig,

    /// Embedding prefilter settings
    pub prefilter: PrefilterConfig,

    /// Relevance prompt truncation limits
    pub prompt: PromptConfig,

    /// Worker threads for the analysis pool (defaults to rayon's choice)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig
{
    /// Glob patterns a path must match (`*` crosses `/`)
    pub include: Vec<String>,

    /// Case-insensitive substrings that disqualify a path
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig
{
    pub combine: Combine,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig
{
    pub top_n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig
{
    pub max_lines_per_hunk: usize,
    pub max_changes: usize,
    pub description_chars: usize,
    pub recommendation_chars: usize,
    pub snippet_chars: usize,
}

impl Default for FilterConfig
{
    fn default() -> Self
    {
        Self {
            include: vec!["*.sol".to_string()],
            exclude: vec![
                ".t.".to_string(),
                "interface".to_string(),
                "mock".to_string(),
                "test".to_string(),
            ],
        }
    }
}

impl Default for PrefilterConfig
{
    fn default() -> Self
    {
        Self { top_n: 5 }
    }
}

impl Default for PromptConfig
{
    fn default() -> Self
    {
        Self {
            max_lines_per_hunk: 5,
            max_changes: 10,
            description_chars: 300,
            recommendation_chars: 200,
            snippet_chars: 500,
        }
    }
}

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Layered load: first config file found in `dir`, then `FIXTRACE_*` env vars
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["fixtrace.toml", "fixtrace.yaml", "fixtrace.json", ".fixtrace.toml"];

    for name in &config_paths
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // FIXTRACE_RANKING__COMBINE=mean, FIXTRACE_THREADS=4, ...
    builder = builder.add_source(
        config::Environment::with_prefix("FIXTRACE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILE);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        println!("{}", toml_string);
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
