//! Diff generation utilities.
//!
//! Provides unified diff output for previews using the `similar` crate.

use similar::{ChangeTag, TextDiff};

/// Generate a unified diff of `original` against `modified` for `path`.
///
/// Hunks carry three lines of context and `@@` headers; identical inputs
/// produce an empty string.
#[must_use]
pub fn unified_diff(path: &str, original: &str, modified: &str) -> String {
    if original == modified {
        return String::new();
    }
    let diff = TextDiff::from_lines(original, modified);
    let mut output = format!("--- a/{path}\n+++ b/{path}\n");

    for group in diff.grouped_ops(3) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old = first.old_range().start..last.old_range().end;
        let new = first.new_range().start..last.new_range().end;
        output.push_str(&format!(
            "@@ -{} +{} @@\n",
            hunk_range(&old),
            hunk_range(&new)
        ));
        for op in &group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                };
                output.push(sign);
                output.push_str(change.value());
                if change.missing_newline() {
                    output.push_str("\n\\ No newline at end of file\n");
                }
            }
        }
    }

    output
}

fn hunk_range(range: &std::ops::Range<usize>) -> String {
    let len = range.end - range.start;
    match len {
        0 => format!("{},0", range.start),
        1 => format!("{}", range.start + 1),
        _ => format!("{},{len}", range.start + 1),
    }
}
