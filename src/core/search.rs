//! Literal query matching over commit messages and source patches

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use anyhow::Result;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::core::analyze::CommitAnalysis;

/// Query lists produced by the extraction prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryCandidates
{
    pub function_names: Vec<String>,
    pub variable_names: Vec<String>,
    pub code_patterns: Vec<String>,
}

impl QueryCandidates
{
    /// All queries in list order: functions, variables, patterns
    pub fn into_queries(self) -> Vec<String>
    {
        self.function_names
            .into_iter()
            .chain(self.variable_names)
            .chain(self.code_patterns)
            .collect()
    }
}

/// ASCII case-insensitive multi-pattern matcher
#[derive(Debug, Clone)]
pub struct QueryMatcher
{
    queries: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl QueryMatcher
{
    /// Build a matcher. Blank and repeated queries are dropped.
    pub fn new<I, S>(queries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let queries: Vec<String> = queries
            .into_iter()
            .map(|q| {
                q.as_ref()
                    .trim()
                    .to_string()
            })
            .filter(|q| !q.is_empty())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();

        let automaton = if queries.is_empty()
        {
            None
        }
        else
        {
            Some(
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::Standard)
                    .build(&queries)?,
            )
        };

        Ok(Self { queries, automaton })
    }

    pub fn is_empty(&self) -> bool
    {
        self.queries
            .is_empty()
    }

    pub fn queries(&self) -> &[String]
    {
        &self.queries
    }

    /// Queries found in `text`, in first-seen order
    pub fn find_in(
        &self,
        text: &str,
        seen: &mut IndexSet<usize>,
    )
    {
        let Some(ac) = &self.automaton
        else
        {
            return;
        };

        for m in ac.find_overlapping_iter(text)
        {
            seen.insert(
                m.pattern()
                    .as_usize(),
            );
        }
    }

    /// Match against the message and every source hunk of a commit.
    ///
    /// Commits without source files never match.
    pub fn match_commit(
        &self,
        commit: &CommitAnalysis,
    ) -> Vec<String>
    {
        if commit
            .files
            .is_empty()
        {
            return Vec::new();
        }

        let mut seen = IndexSet::new();
        self.find_in(&commit.message, &mut seen);

        for file in &commit.files
        {
            for hunk in &file.hunks
            {
                for line in &hunk.lines
                {
                    self.find_in(line, &mut seen);
                }
            }
        }

        seen.into_iter()
            .map(|i| {
                self.queries[i].clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::analyze::{FileAnalysis, HunkAnalysis};
    use crate::core::commit::FileStatus;

    fn commit(
        message: &str,
        lines: &[&str],
    ) -> CommitAnalysis
    {
        CommitAnalysis {
            commit_id: "c1".into(),
            url: None,
            message: message.into(),
            files: vec![FileAnalysis {
                filename: "Vault.sol".into(),
                previous_filename: None,
                status: FileStatus::Modified,
                additions: 0,
                deletions: 0,
                hunks: vec![HunkAnalysis {
                    header_line: "@@ -1 +1 @@".into(),
                    header: None,
                    changed_lines: Default::default(),
                    functions: vec![],
                    lines: lines
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                }],
                blob_before: None,
                blob_after: None,
                units_before: vec![],
                units_after: vec![],
            }],
        }
    }

    #[test]
    fn test_case_insensitive_first_seen_order()
    {
        let m = QueryMatcher::new(["reentrancy", "withdraw", "nonReentrant", "unused"]).unwrap();
        let c = commit("Fix REENTRANCY in vault", &["+    function withdraw() external NONREENTRANT {"]);
        assert_eq!(m.match_commit(&c), vec!["reentrancy", "withdraw", "nonReentrant"]);
    }

    #[test]
    fn test_overlapping_queries_both_match()
    {
        let m = QueryMatcher::new(["balance", "balanceOf"]).unwrap();
        let c = commit("", &["+ token.balanceOf(user)"]);
        assert_eq!(m.match_commit(&c), vec!["balance", "balanceOf"]);
    }

    #[test]
    fn test_no_source_files_no_match()
    {
        let m = QueryMatcher::new(["fix"]).unwrap();
        let mut c = commit("fix everything", &[]);
        c.files
            .clear();
        assert!(m.match_commit(&c).is_empty());
    }

    #[test]
    fn test_blank_and_duplicate_queries_dropped()
    {
        let m = QueryMatcher::new(["  ", "cap", "cap "]).unwrap();
        assert_eq!(m.queries(), ["cap".to_string()]);
        assert!(
            QueryMatcher::new(Vec::<String>::new())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_query_candidates_order()
    {
        let q = QueryCandidates {
            function_names: vec!["withdraw".into()],
            variable_names: vec!["cap".into()],
            code_patterns: vec!["msg.sender".into()],
        };
        assert_eq!(q.into_queries(), vec!["withdraw", "cap", "msg.sender"]);
    }
}
