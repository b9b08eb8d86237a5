//! Line diff between an evaluated result and its expected value.

use std::fmt::Write as _;

use similar::{ChangeTag, TextDiff};

/// Unchanged lines kept on each side of a change.
const CONTEXT_LINES: usize = 1;

/// Added and removed line counts of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
}

/// Format a line diff from `expectation` to `result`.
///
/// Lines only in the expectation are prefixed `-`, lines only in the result
/// `+`. Runs of unchanged lines longer than the context are collapsed to
/// `...`. Identical inputs produce an empty string.
#[must_use]
pub fn format_value_diff(result: &str, expectation: &str) -> String {
    let diff = TextDiff::from_lines(expectation, result);
    let changes: Vec<_> = diff.iter_all_changes().collect();
    if changes.iter().all(|c| c.tag() == ChangeTag::Equal) {
        return String::new();
    }

    let width = expectation
        .lines()
        .count()
        .max(result.lines().count())
        .max(1)
        .to_string()
        .len();

    let near_change = |i: usize| {
        let lo = i.saturating_sub(CONTEXT_LINES);
        let hi = (i + CONTEXT_LINES).min(changes.len() - 1);
        (lo..=hi).any(|j| changes[j].tag() != ChangeTag::Equal)
    };

    let mut out = String::new();
    let mut last_shown: Option<usize> = None;
    for (i, change) in changes.iter().enumerate() {
        let (marker, index) = match change.tag() {
            ChangeTag::Equal if !near_change(i) => continue,
            ChangeTag::Equal => (' ', change.old_index()),
            ChangeTag::Delete => ('-', change.old_index()),
            ChangeTag::Insert => ('+', change.new_index()),
        };
        if last_shown.is_some_and(|last| i > last + 1) || (last_shown.is_none() && i > 0) {
            let _ = writeln!(out, "{:>width$}", "...");
        }
        let line_no = index.map_or(0, |n| n + 1);
        let _ = writeln!(
            out,
            "{line_no:>width$} {marker}{}",
            change.value().trim_end_matches('\n')
        );
        last_shown = Some(i);
    }
    out
}

/// Count added and removed lines going from `expectation` to `result`.
#[must_use]
pub fn diff_stats(result: &str, expectation: &str) -> DiffStats {
    let diff = TextDiff::from_lines(expectation, result);
    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.additions += 1,
            ChangeTag::Delete => stats.deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    stats
}
