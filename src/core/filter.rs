//! Source-file predicate used by the structural passes

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::infra::config::FilterConfig;

/// Include globs plus case-insensitive exclude substrings
#[derive(Debug, Clone)]
pub struct SourceFilter
{
    include: GlobSet,
    exclude: Vec<String>,
}

impl SourceFilter
{
    pub fn new(cfg: &FilterConfig) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in &cfg.include
        {
            builder.add(Glob::new(pattern).with_context(|| format!("Invalid include glob: {}", pattern))?);
        }

        Ok(Self {
            include: builder.build()?,
            exclude: cfg
                .exclude
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        })
    }

    /// True when `path` is a source file worth structural analysis
    pub fn is_source(
        &self,
        path: &str,
    ) -> bool
    {
        if !self
            .include
            .is_match(path)
        {
            return false;
        }

        let lower = path.to_lowercase();
        !self
            .exclude
            .iter()
            .any(|needle| lower.contains(needle.as_str()))
    }
}

impl Default for SourceFilter
{
    fn default() -> Self
    {
        let cfg = FilterConfig::default();
        Self::new(&cfg).unwrap_or_else(|_| Self { include: GlobSet::empty(), exclude: cfg.exclude })
    }
}
