//! Prompt rendering for the language-model collaborators
//!
//! Rendering only. Sending a prompt and retrying is the caller's business.

use std::fmt::Write as _;

use serde_json::Value;

use crate::core::analyze::CommitAnalysis;
use crate::core::finding::Finding;
use crate::core::normalize::ScoringFailure;
use crate::core::search::QueryCandidates;
use crate::infra::config::PromptConfig;

const NO_CHANGES: &str = "No significant changes detected";

/// First `n` characters of `s` (char boundary safe)
fn truncate_chars(
    s: &str,
    n: usize,
) -> &str
{
    match s
        .char_indices()
        .nth(n)
    {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `file: line | line` summaries, capped per hunk and overall
pub fn change_summary(
    commit: &CommitAnalysis,
    cfg: &PromptConfig,
) -> Vec<String>
{
    commit
        .files
        .iter()
        .flat_map(|file| {
            file.hunks
                .iter()
                .filter_map(move |hunk| {
                    let lines: Vec<&str> = hunk
                        .change_lines()
                        .take(cfg.max_lines_per_hunk)
                        .collect();
                    (!lines.is_empty()).then(|| format!("{}: {}", file.filename, lines.join(" | ")))
                })
        })
        .take(cfg.max_changes)
        .collect()
}

/// Ask for a 0-100 relevance score per commit
pub fn relevance_prompt(
    finding: &Finding,
    commits: &[CommitAnalysis],
    cfg: &PromptConfig,
) -> String
{
    let mut blocks = String::new();
    for (idx, commit) in commits
        .iter()
        .enumerate()
    {
        let summary = change_summary(commit, cfg);
        let changes = if summary.is_empty()
        {
            NO_CHANGES.to_string()
        }
        else
        {
            summary.join("\n")
        };
        let url = commit
            .url
            .as_deref()
            .unwrap_or(&commit.commit_id);

        let _ = writeln!(
            blocks,
            "Commit {}:\nURL: {}\nMessage: {}\nKey Changes: {}\n",
            idx + 1,
            url,
            commit.message,
            changes
        );
    }

    let title = match finding.title()
    {
        "" => "Unknown",
        t => t,
    };
    let snippet = finding
        .broken_snippets()
        .first()
        .copied()
        .map(|s| truncate_chars(s, cfg.snippet_chars))
        .unwrap_or_default();

    format!(
        r#"You are analyzing commits to find which ones fix a specific vulnerability.

VULNERABILITY:
Title: {title}
Issue: {issue}
Fix Needed: {fix}
Broken Code Pattern: {snippet}

COMMITS TO ANALYZE:
{blocks}
TASK:
Score each commit from 0-100 based on how likely it fixes this specific vulnerability.

SCORING RULES:
1. Score 90-100: Commit directly fixes the exact issue described
2. Score 60-89: Commit is highly related but may be a partial fix
3. Score 30-59: Commit is somewhat related
4. Score 0-29: Commit is unrelated

OUTPUT REQUIRED (valid JSON):
{{
  "rankings": [
    {{"url": "commit_url_1", "score": 95, "reasoning": "Directly fixes the round calculation bug"}},
    {{"url": "commit_url_2", "score": 10, "reasoning": "Unrelated feature addition"}}
  ]
}}

Analyze each commit and provide scores:"#,
        issue = truncate_chars(finding.text("description"), cfg.description_chars),
        fix = truncate_chars(finding.text("recommendation"), cfg.recommendation_chars),
    )
}

/// Ask for search terms likely to appear in the fixing diff
pub fn query_prompt(finding: &Finding) -> String
{
    let report = serde_json::to_string_pretty(&Value::Object(finding.without_context())).unwrap_or_default();

    format!(
        r#"You are analyzing a Solidity vulnerability report. Based on the following data,
extract:
- Likely function names
- Likely variable names
- Any unique code patterns that could be searched in the repository

Return a JSON object with fields:
{{"function_names": [...], "variable_names": [...], "code_patterns": [...]}}

Report:
{report}
"#
    )
}

/// Read the query-extraction answer
pub fn parse_query_candidates(raw: &str) -> Result<QueryCandidates, ScoringFailure>
{
    serde_json::from_str(raw.trim()).map_err(|e| ScoringFailure::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests
{
    use serde_json::json;

    use super::*;
    use crate::core::analyze::{FileAnalysis, HunkAnalysis};
    use crate::core::commit::FileStatus;

    fn commit(lines: &[&str]) -> CommitAnalysis
    {
        let hunk = |ls: &[&str]| HunkAnalysis {
            header_line: "@@ -1 +1 @@".into(),
            header: None,
            changed_lines: Default::default(),
            functions: vec![],
            lines: ls
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        CommitAnalysis {
            commit_id: "github.com/o/r@abcdef1".into(),
            url: Some("https://github.com/o/r/commit/abcdef1".into()),
            message: "Fix H-1 reentrancy".into(),
            files: vec![FileAnalysis {
                filename: "src/Vault.sol".into(),
                previous_filename: None,
                status: FileStatus::Modified,
                additions: 0,
                deletions: 0,
                hunks: vec![hunk(lines), hunk(&[" context only"])],
                blob_before: None,
                blob_after: None,
                units_before: vec![],
                units_after: vec![],
            }],
        }
    }

    #[test]
    fn test_summary_caps_lines_per_hunk()
    {
        let cfg = PromptConfig { max_lines_per_hunk: 2, ..Default::default() };
        let c = commit(&["+a", " ctx", "-b", "+c", "+++ b/x"]);
        assert_eq!(change_summary(&c, &cfg), vec!["src/Vault.sol: +a | -b"]);
    }

    #[test]
    fn test_summary_caps_total_changes()
    {
        let cfg = PromptConfig { max_changes: 0, ..Default::default() };
        assert!(change_summary(&commit(&["+a"]), &cfg).is_empty());
    }

    #[test]
    fn test_relevance_prompt_contents()
    {
        let cfg = PromptConfig { description_chars: 5, ..Default::default() };
        let f = Finding::from_value(json!({
            "title": "Reentrancy in withdraw",
            "description": "abcdefghij",
            "broken_code_snippets": ["call{value: amount}(\"\")"]
        }))
        .unwrap();
        let prompt = relevance_prompt(&f, &[commit(&["+nonReentrant"]), commit(&[" ctx"])], &cfg);

        assert!(prompt.contains("Title: Reentrancy in withdraw"));
        assert!(prompt.contains("Issue: abcde\n"));
        assert!(prompt.contains("Commit 1:\nURL: https://github.com/o/r/commit/abcdef1"));
        assert!(prompt.contains("Key Changes: src/Vault.sol: +nonReentrant"));
        assert!(prompt.contains("Commit 2:"));
        assert!(prompt.contains(NO_CHANGES));
        assert!(prompt.contains("\"rankings\""));
    }

    #[test]
    fn test_query_prompt_hides_context()
    {
        let f = Finding::from_value(json!({"title": "T", "context": {"source": "secret-ref"}})).unwrap();
        let p = query_prompt(&f);
        assert!(p.contains("\"title\": \"T\""));
        assert!(!p.contains("secret-ref"));
    }

    #[test]
    fn test_parse_query_candidates()
    {
        let q = parse_query_candidates(r#"{"function_names":["withdraw"],"code_patterns":["call{value"]}"#).unwrap();
        assert_eq!(q.into_queries(), vec!["withdraw", "call{value"]);
        assert!(parse_query_candidates("nope").is_err());
    }

    #[test]
    fn test_truncate_is_char_safe()
    {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
