//! Declaration tagging from hunk lines alone
//!
//! Fallback when full source is not available: names of functions and
//! modifiers whose declaration line itself appears in the hunk.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:function|modifier)\s+([A-Za-z0-9_]+)\s*\(").unwrap());

/// Strip one diff marker and surrounding whitespace
fn strip_marker(line: &str) -> &str
{
    let body = line
        .strip_prefix(['+', '-', ' '])
        .unwrap_or(line);
    body.trim()
}

/// Sorted, deduplicated bare names declared on the given hunk lines
pub fn tag_hunk_functions<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            DECL_RE
                .captures(strip_marker(line))
                .map(|caps| caps[1].to_string())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_tags_sorted_and_deduped()
    {
        let lines = [
            "+    function withdraw(uint256 amount) external {",
            "-    function withdraw(uint amount) public {",
            " modifier onlyOwner() {",
            "+function   deposit (",
            "+    uint256 x = withdraw(1);",
        ];
        assert_eq!(tag_hunk_functions(lines), vec!["deposit", "onlyOwner", "withdraw"]);
    }

    #[test]
    fn test_ignores_non_declarations()
    {
        let lines = ["+// function commented(", "+emit function(", "+contract C {", "+functionx y("];
        assert!(tag_hunk_functions(lines).is_empty());
    }

    #[test]
    fn test_marker_only_stripped_once()
    {
        assert_eq!(tag_hunk_functions(["+-function f("]), Vec::<String>::new());
        assert_eq!(tag_hunk_functions(["function g("]), vec!["g"]);
    }
}
