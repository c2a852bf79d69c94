use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// Read a whole UTF-8 file with a path-bearing error
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Parse a JSON array, a single JSON object, or NDJSON into values.
///
/// NDJSON lines that are blank or malformed are skipped with a warning.
pub fn parse_values(text: &str, origin: &str) -> Vec<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => items,
            Value::Object(_) => vec![value],
            other => {
                warn!(origin, kind = %json_kind(&other), "expected object or array; ignoring");
                Vec::new()
            }
        };
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str::<Value>(line) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin, line = idx + 1, error = %e, "skipping malformed line");
                None
            }
        })
        .collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load values from a file; see [`parse_values`]
pub fn load_values<P: AsRef<Path>>(path: P) -> Result<Vec<Value>> {
    let path = path.as_ref();
    let text = read_text(path)?;
    Ok(parse_values(&text, &path.display().to_string()))
}

/// Load and decode records, skipping (with a warning) values of the wrong shape
pub fn load_records<T, P>(path: P) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let records = load_values(path)?
        .into_iter()
        .enumerate()
        .filter_map(|(idx, v)| match serde_json::from_value::<T>(v) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(file = %path.display(), record = idx, error = %e, "skipping record");
                None
            }
        })
        .collect();
    Ok(records)
}

/// Pretty JSON to `path`, or to stdout when `path` is `None`
pub fn write_json<T: Serialize + ?Sized>(path: Option<&Path>, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    match path {
        Some(p) => {
            std::fs::write(p, text + "\n").with_context(|| format!("Failed to write {}", p.display()))
        }
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_array_object_and_ndjson() {
        assert_eq!(parse_values(r#"[{"a":1},{"a":2}]"#, "t").len(), 2);
        assert_eq!(parse_values(r#"{"a":1}"#, "t").len(), 1);

        let nd = "{\"a\":1}\n\n{oops\n{\"a\":3}\n";
        let vals = parse_values(nd, "t");
        assert_eq!(vals, vec![serde_json::json!({"a":1}), serde_json::json!({"a":3})]);
    }

    #[test]
    fn test_scalars_and_empty_are_nothing() {
        assert!(parse_values("", "t").is_empty());
        assert!(parse_values("   \n", "t").is_empty());
        assert!(parse_values("42", "t").is_empty());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: String,
    }

    #[test]
    fn test_load_records_skips_wrong_shapes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{\"id\":\"x\"}}").unwrap();
        writeln!(file, "{{\"name\":\"no id\"}}").unwrap();
        writeln!(file, "{{\"id\":\"y\"}}").unwrap();

        let rows: Vec<Row> = load_records(file.path()).unwrap();
        assert_eq!(rows, vec![Row { id: "x".into() }, Row { id: "y".into() }]);
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = load_values("/definitely/not/here.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/definitely/not/here.json"));
    }

    #[test]
    fn test_write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        write_json(Some(out.as_path()), &vec![1, 2]).unwrap();
        let back = load_values(&out).unwrap();
        assert_eq!(back, vec![serde_json::json!(1), serde_json::json!(2)]);
    }
}
