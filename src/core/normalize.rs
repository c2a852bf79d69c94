//! Score-scale reconciliation and pass failure records
//!
//! Collaborators answer on either a 0-1 or a 0-100 scale. Everything that
//! reaches the aggregator is a finite value in `[0, 1]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::url::canonical_commit_id;

const NO_REASON: &str = "No reasoning provided";

/// Collaborator failure modes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringFailure
{
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("response has no rankings array")]
    MissingRankings,

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("timed out after {seconds}s")]
    Timeout
    {
        seconds: u64
    },
}

/// Map a raw score onto `[0, 1]`.
///
/// Values above 1 are read as percentages. Non-finite input becomes 0.
pub fn normalize_score(raw: f64) -> f64
{
    if !raw.is_finite()
    {
        return 0.0;
    }

    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}

/// One scored (or merely matched) commit as a pass reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord
{
    pub commit_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_queries: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_units: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

fn string_list(v: Option<&Value>) -> Vec<String>
{
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn number(v: &Value) -> Option<f64>
{
    match v
    {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .parse()
            .ok(),
        _ => None,
    }
}

impl ScoreRecord
{
    /// Lenient read of a scorer's JSON object. `None` without a commit key.
    pub fn from_value(v: &Value) -> Option<Self>
    {
        let obj = v.as_object()?;
        let id = ["commit_id", "url", "commit_url", "commit"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .filter(|s| {
                !s.trim()
                    .is_empty()
            })?;

        let text = |k: &str| {
            obj.get(k)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Some(Self {
            commit_id: canonical_commit_id(id),
            score: obj
                .get("score")
                .and_then(number),
            reasoning: text("reasoning")
                .or_else(|| text("reason"))
                .or_else(|| text("evidence")),
            error: text("error"),
            message: text("message"),
            matched_queries: string_list(obj.get("matched_queries")),
            matched_units: string_list(
                obj.get("matched_units")
                    .or_else(|| obj.get("functions")),
            ),
            files: string_list(obj.get("files")),
        })
    }
}

/// A pass result ready for the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence
{
    /// Pass name
    pub source: String,
    pub commit_id: String,
    pub message: Option<String>,
    /// Normalised score; `None` for evidence-only passes
    pub score: Option<f64>,
    pub reason: Option<String>,
    pub matched_queries: Vec<String>,
    pub matched_units: Vec<String>,
    pub files: Vec<String>,
    pub failed: bool,
}

impl Evidence
{
    /// Normalise one record of `source`.
    ///
    /// For scoring passes a missing score or an error becomes a zero score
    /// with a reason, so the commit is still represented.
    pub fn from_record(
        source: &str,
        record: ScoreRecord,
        scored: bool,
    ) -> Self
    {
        let failed = record
            .error
            .is_some();

        let (score, reason) = if !scored
        {
            (None, record.reasoning)
        }
        else if let Some(err) = record.error
        {
            (Some(0.0), Some(err))
        }
        else
        {
            match record.score
            {
                Some(raw) => (Some(normalize_score(raw)), record.reasoning),
                None => (Some(0.0), Some(record.reasoning.unwrap_or_else(|| NO_REASON.to_string()))),
            }
        };

        Self {
            source: source.to_string(),
            commit_id: canonical_commit_id(&record.commit_id),
            message: record.message,
            score,
            reason,
            matched_queries: record.matched_queries,
            matched_units: record.matched_units,
            files: record.files,
            failed,
        }
    }

    /// Zero-score record standing in for a failed pass
    pub fn failure(
        source: &str,
        commit_id: &str,
        failure: &ScoringFailure,
    ) -> Self
    {
        Self {
            source: source.to_string(),
            commit_id: canonical_commit_id(commit_id),
            message: None,
            score: Some(0.0),
            reason: Some(failure.to_string()),
            matched_queries: Vec::new(),
            matched_units: Vec::new(),
            files: Vec::new(),
            failed: true,
        }
    }
}

/// Read a relevance response.
///
/// Accepts `{"rankings": [...]}` or, failing that, the first array of objects
/// carrying a `url`. Entries without a commit key are skipped.
pub fn parse_rankings(raw: &str) -> Result<Vec<ScoreRecord>, ScoringFailure>
{
    let parsed: Value =
        serde_json::from_str(raw.trim()).map_err(|e| ScoringFailure::MalformedResponse(e.to_string()))?;

    let items = match parsed
        .get("rankings")
        .and_then(Value::as_array)
    {
        Some(items) => items,
        None => parsed
            .as_object()
            .into_iter()
            .flat_map(|obj| obj.values())
            .chain(std::iter::once(&parsed))
            .filter_map(Value::as_array)
            .find(|arr| {
                arr.first()
                    .and_then(|first| first.get("url"))
                    .is_some()
            })
            .ok_or(ScoringFailure::MissingRankings)?,
    };

    Ok(items
        .iter()
        .filter_map(ScoreRecord::from_value)
        .collect())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use serde_json::json;

    #[test]
    fn test_percent_and_unit_scales()
    {
        assert_eq!(normalize_score(95.0), 0.95);
        assert_eq!(normalize_score(0.40), 0.40);
        assert_eq!(normalize_score(1.0), 1.0);
        assert_eq!(normalize_score(250.0), 1.0);
        assert_eq!(normalize_score(-3.0), 0.0);
        assert_eq!(normalize_score(f64::NAN), 0.0);
        assert_eq!(normalize_score(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_record_from_value()
    {
        let rec = ScoreRecord::from_value(&json!({
            "url": "https://github.com/o/r/commit/ABCDEF1",
            "score": "87",
            "reason": "touches withdraw",
            "functions": ["Vault::withdraw"]
        }))
        .unwrap();
        assert_eq!(rec.commit_id, "github.com/o/r@abcdef1");
        assert_eq!(rec.score, Some(87.0));
        assert_eq!(rec.reasoning.as_deref(), Some("touches withdraw"));
        assert_eq!(rec.matched_units, vec!["Vault::withdraw"]);

        assert!(ScoreRecord::from_value(&json!({"score": 1})).is_none());
        assert!(ScoreRecord::from_value(&json!("c1")).is_none());
    }

    #[test]
    fn test_missing_score_becomes_zero_with_reason()
    {
        let rec = ScoreRecord { commit_id: "c1".into(), ..Default::default() };
        let ev = Evidence::from_record("llm", rec, true);
        assert_eq!(ev.score, Some(0.0));
        assert_eq!(ev.reason.as_deref(), Some("No reasoning provided"));
        assert!(!ev.failed);
    }

    #[test]
    fn test_error_record_is_failure()
    {
        let rec = ScoreRecord {
            commit_id: "c1".into(),
            score: Some(90.0),
            error: Some("rate limited".into()),
            ..Default::default()
        };
        let ev = Evidence::from_record("llm", rec, true);
        assert_eq!(ev.score, Some(0.0));
        assert_eq!(ev.reason.as_deref(), Some("rate limited"));
        assert!(ev.failed);
    }

    #[test]
    fn test_evidence_only_keeps_no_score()
    {
        let rec = ScoreRecord { commit_id: "c1".into(), score: Some(0.7), ..Default::default() };
        assert_eq!(Evidence::from_record("search", rec, false).score, None);
    }

    #[test]
    fn test_parse_rankings_shapes()
    {
        let direct = parse_rankings(r#"{"rankings":[{"url":"c1","score":95,"reasoning":"x"},{"url":"c2","score":0.4}]}"#)
            .unwrap();
        assert_eq!(direct.len(), 2);
        assert_eq!(direct[0].score, Some(95.0));

        let nested = parse_rankings(r#"{"results":[{"url":"c3","score":10}],"note":"ok"}"#).unwrap();
        assert_eq!(nested[0].commit_id, "c3");

        let bare = parse_rankings(r#"[{"url":"c4","score":1}]"#).unwrap();
        assert_eq!(bare[0].commit_id, "c4");
    }

    #[test]
    fn test_parse_rankings_failures()
    {
        assert!(matches!(parse_rankings("not json"), Err(ScoringFailure::MalformedResponse(_))));
        assert_eq!(parse_rankings(r#"{"items":[{"id":1}]}"#), Err(ScoringFailure::MissingRankings));
        assert_eq!(parse_rankings("[]"), Err(ScoringFailure::MissingRankings));
    }
}
