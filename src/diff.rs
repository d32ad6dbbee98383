use similar::{ChangeTag, TextDiff};

/// Pseudo file header separating a diff part from the revision above it.
/// "below" is the older revision, "above" the newer one.
const FILE_HEADER: &str = "\ndiff below above\n--- below\n+++ above\n";

/// Render a line-oriented two-way diff of `old` against `new` for display:
/// the fixed pseudo-file header, one `@@` hunk header per contiguous
/// changed region, and content lines prefixed `+`, `-`, or ` `. An absent
/// side is treated as empty input.
pub fn render(old: Option<&[u8]>, new: Option<&[u8]>) -> String {
    let old_text = String::from_utf8_lossy(old.unwrap_or_default());
    let new_text = String::from_utf8_lossy(new.unwrap_or_default());
    let diff = TextDiff::from_lines(old_text.as_ref(), new_text.as_ref());

    let mut out = String::from(FILE_HEADER);
    for group in diff.grouped_ops(3) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let old_len = last.old_range().end - old_start;
        let new_start = first.new_range().start;
        let new_len = last.new_range().end - new_start;
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            hunk_pos(old_start, old_len),
            old_len,
            hunk_pos(new_start, new_len),
            new_len,
        ));
        for op in &group {
            for change in diff.iter_changes(op) {
                out.push(match change.tag() {
                    ChangeTag::Insert => '+',
                    ChangeTag::Delete => '-',
                    ChangeTag::Equal => ' ',
                });
                out.push_str(change.value());
                if !change.value().ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
    out
}

// Unified diff convention: one-based start for a non-empty range, the line
// before the insertion point for an empty one.
fn hunk_pos(start: usize, len: usize) -> usize {
    if len == 0 {
        start
    } else {
        start + 1
    }
}
