//! Unit name to blob reference resolution
//!
//! Maps a qualified unit (`Vault::withdraw`, `Vault is Ownable`, `withdraw`)
//! to the changed file it most plausibly lives in, using file names only.

use serde::{Deserialize, Serialize};

use crate::core::candidate::FileEvidence;

/// Which rule picked the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule
{
    /// Prefix equals the file's base name (case-insensitive)
    Exact,
    /// Prefix and base name contain one another (case-insensitive)
    Substring,
    /// Only one file to choose from
    SoleFile,
}

/// A resolved file with its reference pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution
{
    pub filename: String,
    pub rule: MatchRule,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Contract part of a qualified unit name
pub fn unit_prefix(name: &str) -> &str
{
    if let Some((prefix, _)) = name.split_once("::")
    {
        return prefix;
    }
    if let Some((prefix, _)) = name.split_once(" is ")
    {
        return prefix;
    }
    name
}

/// File name without directories or extension
pub fn base_name(path: &str) -> &str
{
    let file = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);
    match file.rfind('.')
    {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    }
}

/// True when prefix and base name contain one another, ignoring case
pub fn loosely_matches(
    prefix: &str,
    path: &str,
) -> bool
{
    let p = prefix.to_lowercase();
    let b = base_name(path).to_lowercase();
    !p.is_empty() && !b.is_empty() && (b.contains(&p) || p.contains(&b))
}

/// Index of the file a unit belongs to. Within a rule, list order wins.
pub fn match_file<S: AsRef<str>>(
    unit: &str,
    files: &[S],
) -> Option<(usize, MatchRule)>
{
    let prefix = unit_prefix(unit).trim();

    if let Some(i) = files
        .iter()
        .position(|f| base_name(f.as_ref()).eq_ignore_ascii_case(prefix))
    {
        return Some((i, MatchRule::Exact));
    }

    if let Some(i) = files
        .iter()
        .position(|f| loosely_matches(prefix, f.as_ref()))
    {
        return Some((i, MatchRule::Substring));
    }

    (files.len() == 1).then_some((0, MatchRule::SoleFile))
}

/// Pick the `(before, after)` references for `unit` among a candidate's files
pub fn resolve_blob_refs(
    unit: &str,
    files: &[FileEvidence],
) -> Option<Resolution>
{
    let names: Vec<&str> = files
        .iter()
        .map(|f| f.filename.as_str())
        .collect();
    let (idx, rule) = match_file(unit, &names)?;
    let file = &files[idx];

    Some(Resolution {
        filename: file
            .filename
            .clone(),
        rule,
        before: file
            .blob_before
            .clone(),
        after: file
            .blob_after
            .clone(),
    })
}
