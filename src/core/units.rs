//! Code-unit extraction with a brace-depth state machine
//!
//! A single top-to-bottom scan over source text keeps an explicit stack of
//! partially opened units. Each record tracks its own brace depth and a
//! `started` flag, so multi-line signatures only begin counting once the first
//! `{` shows up. A unit closes when its depth returns to zero; units that never
//! close (truncated source) are dropped without error.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::changed_lines::ChangedLineSet;

static CONTAINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:abstract\s+)?(contract|interface|library)\s+([A-Za-z0-9_]+)\s*([^{]*)").unwrap()
});
static FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*function\s+([A-Za-z0-9_]+)\s*\(").unwrap());
static MODIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*modifier\s+([A-Za-z0-9_]+)\s*\(").unwrap());
static SPECIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(constructor|receive|fallback)\s*\(").unwrap());
static DECL_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:contract|interface|library|function|modifier|constructor|receive|fallback)\b").unwrap()
});

/// Kinds of named, brace-delimited units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind
{
    Contract,
    Interface,
    Library,
    Function,
    Modifier,
    Constructor,
    Fallback,
    Receive,
}

impl UnitKind
{
    /// Contract-like units that own members
    pub fn is_container(self) -> bool
    {
        matches!(self, UnitKind::Contract | UnitKind::Interface | UnitKind::Library)
    }

    fn from_keyword(word: &str) -> Option<Self>
    {
        match word
        {
            "contract" => Some(UnitKind::Contract),
            "interface" => Some(UnitKind::Interface),
            "library" => Some(UnitKind::Library),
            "function" => Some(UnitKind::Function),
            "modifier" => Some(UnitKind::Modifier),
            "constructor" => Some(UnitKind::Constructor),
            "fallback" => Some(UnitKind::Fallback),
            "receive" => Some(UnitKind::Receive),
            _ => None,
        }
    }
}

impl fmt::Display for UnitKind
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        let s = match self
        {
            UnitKind::Contract => "contract",
            UnitKind::Interface => "interface",
            UnitKind::Library => "library",
            UnitKind::Function => "function",
            UnitKind::Modifier => "modifier",
            UnitKind::Constructor => "constructor",
            UnitKind::Fallback => "fallback",
            UnitKind::Receive => "receive",
        };
        f.write_str(s)
    }
}

/// A closed unit with its inclusive 1-based line range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit
{
    /// Declared name (`constructor`/`receive`/`fallback` for special forms)
    pub name: String,

    /// Unit kind
    pub kind: UnitKind,

    /// Enclosing contract name, by name only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Inheritance clause of a contract-like unit (`is A, B`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heritage: Option<String>,

    /// Declaration line
    pub start_line: usize,

    /// Line holding the closing brace
    pub end_line: usize,
}

impl CodeUnit
{
    /// Best-available name: `Contract::member`, `Contract is Base`, or bare
    pub fn qualified_name(&self) -> String
    {
        if self
            .kind
            .is_container()
        {
            return match &self.heritage
            {
                Some(h) => format!("{} {}", self.name, h),
                None => self
                    .name
                    .clone(),
            };
        }

        match &self.owner
        {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self
                .name
                .clone(),
        }
    }

    /// True if any changed line falls inside the unit's range
    pub fn overlaps(
        &self,
        changed: &ChangedLineSet,
    ) -> bool
    {
        changed
            .range(self.start_line..=self.end_line)
            .next()
            .is_some()
    }

    pub fn contains_line(
        &self,
        line: usize,
    ) -> bool
    {
        self.start_line <= line && line <= self.end_line
    }
}

/// A unit whose closing brace has not been seen yet
#[derive(Debug)]
struct OpenUnit
{
    name: String,
    kind: UnitKind,
    owner: Option<String>,
    heritage: Option<String>,
    start_line: usize,
    depth: i64,
    started: bool,
}

impl OpenUnit
{
    fn close(
        self,
        end_line: usize,
    ) -> CodeUnit
    {
        CodeUnit {
            name: self.name,
            kind: self.kind,
            owner: self.owner,
            heritage: self.heritage,
            start_line: self.start_line,
            end_line,
        }
    }
}

/// Match a declaration on a comment-free line
fn match_declaration(code: &str) -> Option<(UnitKind, String, Option<String>)>
{
    if let Some(caps) = CONTAINER_RE.captures(code)
    {
        let kind = UnitKind::from_keyword(&caps[1])?;
        let heritage = caps
            .get(3)
            .map(|m| {
                m.as_str()
                    .trim()
            })
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        return Some((kind, caps[2].to_string(), heritage));
    }

    if let Some(caps) = FUNCTION_RE.captures(code)
    {
        return Some((UnitKind::Function, caps[1].to_string(), None));
    }

    if let Some(caps) = SPECIAL_RE.captures(code)
    {
        let kind = UnitKind::from_keyword(&caps[1])?;
        return Some((kind, caps[1].to_string(), None));
    }

    MODIFIER_RE
        .captures(code)
        .map(|caps| (UnitKind::Modifier, caps[1].to_string(), None))
}

/// Every declaration on a comment-free line with its byte offset
fn declarations(code: &str) -> Vec<(usize, UnitKind, String, Option<String>)>
{
    DECL_KEYWORD_RE
        .find_iter(code)
        .filter(|m| {
            code[..m.start()]
                .chars()
                .next_back()
                .is_none_or(|c| c.is_whitespace() || matches!(c, '{' | '}' | ';'))
        })
        .filter_map(|m| {
            let (kind, name, heritage) = match_declaration(&code[m.start()..])?;
            Some((m.start(), kind, name, heritage))
        })
        .collect()
}

fn brace_counts(code: &str) -> (i64, i64)
{
    (
        code.matches('{')
            .count() as i64,
        code.matches('}')
            .count() as i64,
    )
}

/// Strips comments and string contents so braces inside them are not counted
#[derive(Debug, Default)]
struct CommentStripper
{
    in_block: bool,
}

impl CommentStripper
{
    fn strip(
        &mut self,
        line: &str,
    ) -> String
    {
        let mut out = String::with_capacity(line.len());
        let mut chars = line
            .chars()
            .peekable();
        let mut quote: Option<char> = None;

        while let Some(c) = chars.next()
        {
            if self.in_block
            {
                if c == '*' && chars.peek() == Some(&'/')
                {
                    chars.next();
                    self.in_block = false;
                    out.push(' ');
                }
                continue;
            }

            if let Some(q) = quote
            {
                if c == '\\'
                {
                    chars.next();
                }
                else if c == q
                {
                    quote = None;
                    out.push(c);
                }
                continue;
            }

            match (c, chars.peek())
            {
                ('/', Some('/')) => break,
                ('/', Some('*')) =>
                {
                    chars.next();
                    self.in_block = true;
                }
                ('"' | '\'', _) =>
                {
                    quote = Some(c);
                    out.push(c);
                }
                _ => out.push(c),
            }
        }

        out
    }
}

/// Scan source text and return every closed unit in completion order
/// (innermost first).
pub fn scan_units(source: &str) -> Vec<CodeUnit>
{
    let mut stack: Vec<OpenUnit> = Vec::new();
    let mut closed: Vec<CodeUnit> = Vec::new();
    let mut stripper = CommentStripper::default();

    for (idx, raw) in source
        .lines()
        .enumerate()
    {
        let line_no = idx + 1;
        let code = stripper.strip(raw);

        let (opens, closes) = brace_counts(&code);

        // Signature terminated by `;` before any body: declaration only
        if opens == 0 && code.contains(';')
        {
            stack.retain(|u| u.started);
        }

        for unit in stack.iter_mut()
        {
            if !unit.started && opens > 0
            {
                unit.started = true;
            }
            if unit.started
            {
                unit.depth += opens - closes;
            }
        }

        // Units declared on this line only see braces from their own keyword on
        let decls = declarations(&code);
        for (n, (pos, kind, name, heritage)) in decls
            .iter()
            .enumerate()
        {
            let own_end = decls
                .get(n + 1)
                .map_or(code.len(), |d| d.0);
            let own = &code[*pos..own_end];
            if !own.contains('{') && own.contains(';')
            {
                continue;
            }

            let owner = if kind.is_container()
            {
                None
            }
            else
            {
                stack
                    .iter()
                    .rev()
                    .find(|u| {
                        u.kind
                            .is_container()
                    })
                    .map(|u| {
                        u.name
                            .clone()
                    })
            };

            let (opens, closes) = brace_counts(&code[*pos..]);
            stack.push(OpenUnit {
                name: name.clone(),
                kind: *kind,
                owner,
                heritage: heritage.clone(),
                start_line: line_no,
                depth: opens - closes,
                started: opens > 0,
            });
        }

        // Close from the innermost record outwards
        let mut i = stack.len();
        while i > 0
        {
            i -= 1;
            if stack[i].started && stack[i].depth <= 0
            {
                let unit = stack.remove(i);
                closed.push(unit.close(line_no));
            }
        }
    }

    if !stack.is_empty()
    {
        trace!(unclosed = stack.len(), "dropping units without a closing brace");
    }

    closed
}

/// Units of `source` that overlap `changed`, innermost first.
///
/// Members are reported when their range contains a changed line. A contract
/// is reported only for changed lines that no reported member already covers
/// (state variables, the declaration line, events, and so on).
pub fn changed_units(
    source: &str,
    changed: &ChangedLineSet,
) -> Vec<CodeUnit>
{
    if changed.is_empty()
    {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for unit in scan_units(source)
    {
        if unit
            .kind
            .is_container()
        {
            let uncovered = changed
                .range(unit.start_line..=unit.end_line)
                .any(|line| {
                    !claimed
                        .iter()
                        .any(|&(s, e)| s <= *line && *line <= e)
                });
            if uncovered
            {
                out.push(unit);
            }
        }
        else if unit.overlaps(changed)
        {
            claimed.push((unit.start_line, unit.end_line));
            out.push(unit);
        }
    }

    out
}
