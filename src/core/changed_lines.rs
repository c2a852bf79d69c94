//! Changed-line mapping over unified diff bodies
//!
//! Walks patch lines with a running line counter seeded from each `@@`
//! header. On the new side, inserted lines are recorded and removed lines do
//! not advance the counter; the old side is the mirror image.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::hunk::HunkHeader;

/// 1-based line numbers in one revision of a file
pub type ChangedLineSet = BTreeSet<usize>;

/// Which revision of the file line numbers refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side
{
    /// Pre-change revision (`-` lines)
    Old,
    /// Post-change revision (`+` lines)
    New,
}

impl Side
{
    /// Marker of the lines that exist only on this side
    fn own_marker(self) -> char
    {
        match self
        {
            Side::Old => '-',
            Side::New => '+',
        }
    }

    /// Marker of the lines that do not exist on this side
    fn other_marker(self) -> char
    {
        match self
        {
            Side::Old => '+',
            Side::New => '-',
        }
    }
}

/// Compute the changed-line set of a patch body on one side.
///
/// Lines seen before any parseable header carry no position and are skipped,
/// so a malformed hunk contributes nothing instead of bogus line numbers.
pub fn changed_lines<'a, I>(
    lines: I,
    side: Side,
) -> ChangedLineSet
where
    I: IntoIterator<Item = &'a str>,
{
    let own = side.own_marker();
    let other = side.other_marker();
    let own_file_marker: String = std::iter::repeat_n(own, 3).collect();
    let other_file_marker: String = std::iter::repeat_n(other, 3).collect();

    let mut out = ChangedLineSet::new();
    let mut current: Option<usize> = None;

    for line in lines
    {
        if line.starts_with("@@")
        {
            current = HunkHeader::parse(line).map(|h| h.start(side));
            continue;
        }

        let Some(cur) = current
        else
        {
            continue;
        };

        if line.starts_with(own) && !line.starts_with(own_file_marker.as_str())
        {
            if cur > 0
            {
                out.insert(cur);
            }
        }
        else if line.starts_with(other) && !line.starts_with(other_file_marker.as_str())
        {
            // absent from this revision
            continue;
        }

        // past usize::MAX the rest of the hunk has no position
        current = cur.checked_add(1);
    }

    out
}

/// New-file changed lines of a whole patch text
pub fn changed_lines_in_patch(
    patch: &str,
    side: Side,
) -> ChangedLineSet
{
    changed_lines(patch.lines(), side)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_added_lines_on_new_side()
    {
        let patch = ["@@ -1,2 +1,3 @@", "+added line", "+another", "- removed line", " context"];
        let set = changed_lines(patch, Side::New);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_removed_lines_on_old_side()
    {
        let patch = ["@@ -4,3 +4,2 @@", " keep", "-drop one", "+insert", "-drop two", " tail"];
        let set = changed_lines(patch, Side::Old);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![5, 6]);
    }

    #[test]
    fn test_counter_reseeds_per_hunk()
    {
        let patch = "\
@@ -1,3 +1,3 @@
 a
-b
+B
 c
@@ -20,2 +20,3 @@
 x
+y
 z";
        let set = changed_lines_in_patch(patch, Side::New);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![2, 21]);
    }

    #[test]
    fn test_lines_before_header_are_ignored()
    {
        let patch = ["+orphan", "@@ nonsense @@", "+still orphan", "@@ -1 +7 @@", "+real"];
        let set = changed_lines(patch, Side::New);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_file_markers_are_not_changes()
    {
        let patch = ["@@ -1,1 +1,2 @@", "+++ b/file.sol", "+x"];
        let set = changed_lines(patch, Side::New);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_zero_start_never_recorded()
    {
        let patch = ["@@ -1,0 +0,0 @@", "+phantom"];
        assert!(changed_lines(patch, Side::New).is_empty());
    }

    #[test]
    fn test_counter_overflow_drops_rest_of_hunk()
    {
        let max = usize::MAX;
        let header = format!("@@ -1 +{} @@", max);
        let patch = [header.as_str(), " ctx", "+x", "@@ -1 +3 @@", "+y"];
        assert_eq!(changed_lines(patch, Side::New).into_iter().collect::<Vec<_>>(), vec![3]);

        let header = format!("@@ -1 +{} @@", max);
        let patch = [header.as_str(), "+last"];
        assert_eq!(changed_lines(patch, Side::New).into_iter().collect::<Vec<_>>(), vec![max]);
    }
}
