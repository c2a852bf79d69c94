//! Property tests for header parsing, line mapping and candidate merging.

use fixtrace::core::changed_lines::{Side, changed_lines};
use fixtrace::core::normalize::{Evidence, normalize_score};
use fixtrace::core::{CandidateAggregator, Combine, HunkHeader};
use proptest::prelude::*;

fn body_line() -> impl Strategy<Value = String>
{
    (prop_oneof![Just('+'), Just('-'), Just(' ')], "[a-z ;(){}]{0,12}").prop_map(|(m, rest)| format!("{m}{rest}"))
}

fn evidence() -> impl Strategy<Value = Evidence>
{
    (
        prop_oneof![Just("llm"), Just("embedding"), Just("file:scores")],
        0usize..5,
        proptest::option::of(0.0f64..=1.0),
        proptest::collection::vec("[a-z]{1,6}", 0..3),
    )
        .prop_map(|(source, commit, score, queries)| Evidence {
            source: source.to_string(),
            commit_id: format!("c{commit}"),
            message: None,
            score,
            reason: score.map(|s| format!("score {s}")),
            matched_queries: queries,
            matched_units: vec![],
            files: vec![],
            failed: false,
        })
}

proptest! {
    #[test]
    fn header_round_trips(a in 0usize..100_000, b in 0usize..5_000, c in 0usize..100_000, d in 0usize..5_000)
    {
        let line = format!("@@ -{a},{b} +{c},{d} @@");
        let h = HunkHeader::parse(&line).expect("well-formed header");
        prop_assert_eq!((h.old_start, h.old_count, h.new_start, h.new_count), (a, b, c, d));
        prop_assert_eq!(h.to_string(), line);
    }

    #[test]
    fn omitted_counts_default_to_one(a in 1usize..100_000, c in 1usize..100_000)
    {
        let h = HunkHeader::parse(&format!("@@ -{a} +{c} @@")).expect("header");
        prop_assert_eq!((h.old_count, h.new_count), (1, 1));
    }

    #[test]
    fn changed_lines_are_positive_and_bounded(
        start in 0usize..50,
        body in proptest::collection::vec(body_line(), 0..40),
    )
    {
        let header = format!("@@ -{start},9 +{start},9 @@");
        let lines: Vec<&str> = std::iter::once(header.as_str())
            .chain(body.iter().map(String::as_str))
            .collect();

        let added = body.iter().filter(|l| l.starts_with('+')).count();
        let removed = body.iter().filter(|l| l.starts_with('-')).count();

        let new_side = changed_lines(lines.iter().copied(), Side::New);
        prop_assert!(new_side.iter().all(|&l| l > 0));
        prop_assert!(new_side.len() <= added);

        let old_side = changed_lines(lines.iter().copied(), Side::Old);
        prop_assert!(old_side.iter().all(|&l| l > 0));
        prop_assert!(old_side.len() <= removed);
    }

    #[test]
    fn normalized_scores_stay_in_unit_range(raw in proptest::num::f64::ANY)
    {
        let s = normalize_score(raw);
        prop_assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn merging_twice_equals_merging_once(batch in proptest::collection::vec(evidence(), 0..20))
    {
        let mut once = CandidateAggregator::new();
        let mut twice = CandidateAggregator::new();
        for ev in &batch
        {
            once.merge(ev.clone());
        }
        for ev in batch.iter().chain(batch.iter())
        {
            twice.merge(ev.clone());
        }

        prop_assert_eq!(once.finish(Combine::Max, None), twice.finish(Combine::Max, None));
    }
}
