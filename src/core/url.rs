//! Commit identifiers, repository URL classification and blob references

use std::fmt;
use std::sync::LazyLock;

use miette::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};

static COMMIT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?(?P<host>[^/\s]+)/(?P<owner>[^/\s]+)/(?P<repo>[^/\s]+)/commits?/(?P<sha>[0-9a-fA-F]{7,40})\b",
    )
    .unwrap()
});
static CANONICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<host>[^/\s@]+)/(?P<owner>[^/\s@]+)/(?P<repo>[^/\s@]+)@(?P<sha>[0-9a-fA-F]{7,40})$")
        .unwrap()
});
static REPO_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?(?P<host>[^/\s]+)/(?P<owner>[^/\s]+)/(?P<repo>[^/\s#?]+)(?:/(?P<kind>pull|commit|commits|compare|blob|tree)/(?P<rest>[^#?\s]+))?",
    )
    .unwrap()
});

/// Errors from commit URL parsing
#[derive(Debug, Diagnostic, thiserror::Error, PartialEq, Eq)]
pub enum UrlError
{
    #[error("not a commit URL: {0}")]
    #[diagnostic(
        code(fixtrace::url::not_a_commit),
        help("expected https://<host>/<owner>/<repo>/commit/<sha> or <host>/<owner>/<repo>@<sha>")
    )]
    NotACommit(String),

    #[error("not a blob URL: {0}")]
    #[diagnostic(
        code(fixtrace::url::not_a_blob),
        help("expected https://<host>/<owner>/<repo>/blob/<ref>/<path>")
    )]
    NotABlob(String),
}

/// A commit on a code host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId
{
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub sha: String,
}

impl CommitId
{
    /// Parse a commit URL or a canonical `host/owner/repo@sha` string
    pub fn parse(raw: &str) -> Result<Self, UrlError>
    {
        let trimmed = raw.trim();
        let caps = COMMIT_URL_RE
            .captures(trimmed)
            .or_else(|| CANONICAL_RE.captures(trimmed))
            .ok_or_else(|| UrlError::NotACommit(trimmed.to_string()))?;

        let repo = caps["repo"]
            .strip_suffix(".git")
            .unwrap_or(&caps["repo"]);

        Ok(Self {
            host: caps["host"].to_ascii_lowercase(),
            owner: caps["owner"].to_string(),
            repo: repo.to_string(),
            sha: caps["sha"].to_ascii_lowercase(),
        })
    }

    /// Browser URL of the commit
    pub fn url(&self) -> String
    {
        format!("https://{}/{}/{}/commit/{}", self.host, self.owner, self.repo, self.sha)
    }

    /// Blob URL of `path` at `reference` in this repository
    pub fn blob_url(
        &self,
        reference: &str,
        path: &str,
    ) -> String
    {
        format!(
            "https://{}/{}/{}/blob/{}/{}",
            self.host,
            self.owner,
            self.repo,
            reference,
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for CommitId
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        write!(f, "{}/{}/{}@{}", self.host, self.owner, self.repo, self.sha)
    }
}

/// Key every pass merges on: canonical form when parseable, trimmed input otherwise
pub fn canonical_commit_id(raw: &str) -> String
{
    match CommitId::parse(raw)
    {
        Ok(id) => id.to_string(),
        Err(_) => raw
            .trim()
            .to_string(),
    }
}

/// What a repository URL on a finding points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepoRef
{
    Pull
    {
        owner: String,
        repo: String,
        number: u64,
    },
    Commit
    {
        owner: String,
        repo: String,
        sha: String,
    },
    Compare
    {
        owner: String,
        repo: String,
        base: String,
        head: String,
    },
    Blob
    {
        owner: String,
        repo: String,
        reference: String,
        path: String,
    },
    Tree
    {
        owner: String,
        repo: String,
        reference: String,
    },
    Repository
    {
        owner: String,
        repo: String,
    },
    Unknown,
}

impl RepoRef
{
    /// Classify a URL. Never fails: unrecognised input is `Unknown`.
    pub fn classify(url: &str) -> Self
    {
        let Some(caps) = REPO_URL_RE.captures(url.trim())
        else
        {
            return RepoRef::Unknown;
        };

        // A bare word like "notes.txt" is not a repository
        if !caps["host"].contains('.')
        {
            return RepoRef::Unknown;
        }

        let owner = caps["owner"].to_string();
        let repo = caps["repo"]
            .strip_suffix(".git")
            .unwrap_or(&caps["repo"])
            .to_string();
        let rest = caps
            .name("rest")
            .map(|m| {
                m.as_str()
                    .trim_end_matches('/')
            })
            .unwrap_or_default();

        match caps
            .name("kind")
            .map(|m| m.as_str())
        {
            None => RepoRef::Repository { owner, repo },
            Some("pull") => rest
                .split('/')
                .next()
                .and_then(|n| n.parse().ok())
                .map(|number| RepoRef::Pull { owner, repo, number })
                .unwrap_or(RepoRef::Unknown),
            Some("commit" | "commits") =>
            {
                let sha = rest
                    .split('/')
                    .next()
                    .unwrap_or_default();
                if sha.len() >= 7
                    && sha
                        .chars()
                        .all(|c| c.is_ascii_hexdigit())
                {
                    RepoRef::Commit { owner, repo, sha: sha.to_ascii_lowercase() }
                }
                else
                {
                    RepoRef::Unknown
                }
            }
            Some("compare") => match rest.split_once("...")
            {
                Some((base, head)) => RepoRef::Compare {
                    owner,
                    repo,
                    base: base.to_string(),
                    head: head.to_string(),
                },
                None => RepoRef::Unknown,
            },
            Some("blob") => match rest.split_once('/')
            {
                Some((reference, path)) => RepoRef::Blob {
                    owner,
                    repo,
                    reference: reference.to_string(),
                    path: path.to_string(),
                },
                None => RepoRef::Unknown,
            },
            Some("tree") => RepoRef::Tree { owner, repo, reference: rest.to_string() },
            Some(_) => RepoRef::Unknown,
        }
    }

    /// Short label used when listing findings
    pub fn label(&self) -> &'static str
    {
        match self
        {
            RepoRef::Pull { .. } => "pull",
            RepoRef::Commit { .. } => "commit",
            RepoRef::Compare { .. } => "compare",
            RepoRef::Blob { .. } => "blob",
            RepoRef::Tree { .. } => "tree",
            RepoRef::Repository { .. } => "repository",
            RepoRef::Unknown => "unknown",
        }
    }
}

/// Rewrite `/blob/<ref>/<path>` into the commit URL of `<ref>`
pub fn blob_to_commit_url(blob_url: &str) -> Result<String, UrlError>
{
    let trimmed = blob_url.trim();
    let (repo_part, rest) = trimmed
        .split_once("/blob/")
        .ok_or_else(|| UrlError::NotABlob(trimmed.to_string()))?;
    let reference = rest
        .split('/')
        .next()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| UrlError::NotABlob(trimmed.to_string()))?;

    Ok(format!("{}/commit/{}", repo_part, reference))
}
