//! Function body extraction from full source text

use std::sync::LazyLock;

use regex::{Captures, Regex};

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").unwrap());

/// Used when an opening brace never finds its partner
const UNBALANCED_FALLBACK_CHARS: usize = 1000;

/// Lines shown before and after a hint when no declaration matches
const HINT_BEFORE: usize = 10;
const HINT_AFTER: usize = 40;

/// Remove `//` and `/* */` comments, keeping line breaks so numbering holds
pub fn strip_comments(code: &str) -> String
{
    COMMENT_RE
        .replace_all(code, |caps: &Captures| "\n".repeat(caps[0].matches('\n').count()))
        .into_owned()
}

fn declaration_patterns(name: &str) -> Vec<Regex>
{
    let n = regex::escape(name);
    [
        format!(r"\bfunction\s+{n}\s*\([^)]*\)[^{{;]*\{{"),
        format!(r"\bmodifier\s+{n}\s*\([^)]*\)[^{{;]*\{{"),
        format!(r"\bfn\s+{n}\s*\([^)]*\)[^{{;]*\{{"),
        format!(r"(?:public\s+)?\bfun\s+{n}\s*\([^)]*\)[^{{;]*\{{"),
        format!(r"\bfunc\s+(?:\([^)]*\)\s*)?{n}\s*\([^)]*\)[^{{;]*\{{"),
        format!(r"\bdef\s+{n}\s*\([^)]*\)\s*(?:->[^:]+)?\s*:"),
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

fn leading_ws(line: &str) -> usize
{
    line.len()
        - line
            .trim_start()
            .len()
}

/// Brace-matched block starting at `open` (the index of `{`)
fn brace_block(
    code: &str,
    start: usize,
    open: usize,
) -> String
{
    let mut depth = 0usize;
    for (i, ch) in code[open..].char_indices()
    {
        match ch
        {
            '{' => depth += 1,
            '}' =>
            {
                depth = depth.saturating_sub(1);
                if depth == 0
                {
                    return code[start..open + i + 1]
                        .trim()
                        .to_string();
                }
            }
            _ => {}
        }
    }

    let tail = &code[start..];
    let end = tail
        .char_indices()
        .nth(UNBALANCED_FALLBACK_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(tail.len());
    tail[..end]
        .trim()
        .to_string()
}

/// Indentation-delimited block for `def name(...):` declarations
fn indented_block(
    code: &str,
    start: usize,
) -> String
{
    let first_line = code[..start]
        .matches('\n')
        .count();
    let lines: Vec<&str> = code
        .lines()
        .collect();
    let Some(head) = lines.get(first_line)
    else
    {
        return String::new();
    };
    let base = leading_ws(head);

    let mut block = vec![*head];
    for line in &lines[first_line + 1..]
    {
        if line
            .trim()
            .is_empty()
        {
            block.push(line);
            continue;
        }
        if leading_ws(line) <= base
        {
            break;
        }
        block.push(line);
    }

    block
        .join("\n")
        .trim()
        .to_string()
}

/// Extract the body of `name` from `source`.
///
/// Qualified names (`Vault::withdraw`) are looked up by their last segment.
/// Without a matching declaration, a line hint yields the surrounding window;
/// otherwise the result is empty.
pub fn extract_function_code(
    source: &str,
    name: &str,
    line_hint: Option<usize>,
) -> String
{
    let bare = name
        .rsplit("::")
        .next()
        .unwrap_or(name)
        .trim();
    if source.is_empty() || bare.is_empty()
    {
        return String::new();
    }

    let clean = strip_comments(source);
    let found = declaration_patterns(bare)
        .iter()
        .find_map(|re| re.find(&clean));

    match found
    {
        Some(m) if m.as_str().ends_with('{') => brace_block(&clean, m.start(), m.end() - 1),
        Some(m) => indented_block(&clean, m.start()),
        None => match line_hint.filter(|&l| l > 0)
        {
            Some(line) =>
            {
                let lines: Vec<&str> = clean
                    .lines()
                    .collect();
                let start = line
                    .saturating_sub(HINT_BEFORE)
                    .min(lines.len());
                let end = (line + HINT_AFTER).min(lines.len());
                lines[start..end].join("\n")
            }
            None => String::new(),
        },
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    const VAULT: &str = "\
contract Vault {
    // withdraw { is not here
    function withdraw(uint256 amount) external nonReentrant {
        if (amount > 0) {
            payable(msg.sender).transfer(amount); /* pay } */
        }
    }

    function deposit() external payable {}
}";

    #[test]
    fn test_brace_matched_body()
    {
        let body = extract_function_code(VAULT, "Vault::withdraw", None);
        assert!(body.starts_with("function withdraw(uint256 amount) external nonReentrant {"));
        assert!(body.ends_with("}\n    }"));
        assert!(!body.contains("deposit"));
        assert!(!body.contains("pay }"));
    }

    #[test]
    fn test_declaration_without_body_is_skipped()
    {
        let src = "interface I { function f() external; }\ncontract C { function f() external { x = 1; } }";
        assert_eq!(extract_function_code(src, "f", None), "function f() external { x = 1; }");
    }

    #[test]
    fn test_other_languages()
    {
        let rust = "impl A {\n    pub fn run(&self) -> u8 {\n        1\n    }\n}";
        assert_eq!(extract_function_code(rust, "run", None), "fn run(&self) -> u8 {\n        1\n    }");

        let py = "class A:\n    def run(self, x) -> int:\n        y = x\n\n        return y\n    def other(self):\n        pass";
        assert_eq!(extract_function_code(py, "run", None), "def run(self, x) -> int:\n        y = x\n\n        return y");
    }

    #[test]
    fn test_unbalanced_falls_back_to_prefix()
    {
        let src = format!("function broken() {{\n{}", "x".repeat(2000));
        let body = extract_function_code(&src, "broken", None);
        assert_eq!(body.chars().count(), 1000);
    }

    #[test]
    fn test_line_hint_window()
    {
        let src: String = (1..=100)
            .map(|i| format!("line{}\n", i))
            .collect();
        let window = extract_function_code(&src, "missing", Some(50));
        let lines: Vec<&str> = window
            .lines()
            .collect();
        assert_eq!(lines.first(), Some(&"line41"));
        assert_eq!(lines.last(), Some(&"line90"));
        assert_eq!(extract_function_code(&src, "missing", None), "");
        assert_eq!(extract_function_code(&src, "missing", Some(0)), "");
    }

    #[test]
    fn test_strip_comments_keeps_line_count()
    {
        let src = "a // x\n/* one\ntwo */b";
        assert_eq!(strip_comments(src), "a \n\nb");
    }
}
