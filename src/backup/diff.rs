//! Structured line diffs for audit display
//!
//! Used to show an editor what changed between two snapshots, never to
//! drive merges.

use serde::Serialize;

/// What happened to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTag {
    Added,
    Removed,
    Context,
}

/// One line of a diff, with 1-indexed positions on each side.
#[derive(Debug, Clone, Serialize)]
pub struct LineChange {
    pub tag: ChangeTag,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    pub text: String,
}

/// Compute a line diff between two byte contents.
pub fn diff_lines(old: &str, new: &str) -> Vec<LineChange> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    // Trim the common prefix and suffix before the quadratic part
    let mut prefix = 0;
    while prefix < a.len() && prefix < b.len() && a[prefix] == b[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < a.len() - prefix && suffix < b.len() - prefix
        && a[a.len() - 1 - suffix] == b[b.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut changes = Vec::new();
    for (i, line) in a[..prefix].iter().enumerate() {
        changes.push(LineChange {
            tag: ChangeTag::Context,
            old_line: Some(i + 1),
            new_line: Some(i + 1),
            text: (*line).to_string(),
        });
    }

    let mid_a = &a[prefix..a.len() - suffix];
    let mid_b = &b[prefix..b.len() - suffix];
    changes.extend(diff_middle(mid_a, mid_b, prefix, prefix));

    for (i, line) in a[a.len() - suffix..].iter().enumerate() {
        changes.push(LineChange {
            tag: ChangeTag::Context,
            old_line: Some(a.len() - suffix + i + 1),
            new_line: Some(b.len() - suffix + i + 1),
            text: (*line).to_string(),
        });
    }

    changes
}

/// Longest-common-subsequence walk over the differing middle.
fn diff_middle(a: &[&str], b: &[&str], a_offset: usize, b_offset: usize) -> Vec<LineChange> {
    let n = a.len();
    let m = b.len();
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut changes = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            changes.push(LineChange {
                tag: ChangeTag::Context,
                old_line: Some(a_offset + i + 1),
                new_line: Some(b_offset + j + 1),
                text: a[i].to_string(),
            });
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            changes.push(LineChange {
                tag: ChangeTag::Removed,
                old_line: Some(a_offset + i + 1),
                new_line: None,
                text: a[i].to_string(),
            });
            i += 1;
        } else {
            changes.push(LineChange {
                tag: ChangeTag::Added,
                old_line: None,
                new_line: Some(b_offset + j + 1),
                text: b[j].to_string(),
            });
            j += 1;
        }
    }
    while i < n {
        changes.push(LineChange {
            tag: ChangeTag::Removed,
            old_line: Some(a_offset + i + 1),
            new_line: None,
            text: a[i].to_string(),
        });
        i += 1;
    }
    while j < m {
        changes.push(LineChange {
            tag: ChangeTag::Added,
            old_line: None,
            new_line: Some(b_offset + j + 1),
            text: b[j].to_string(),
        });
        j += 1;
    }

    changes
}

/// Keep only added and removed lines.
pub fn changes_only(changes: &[LineChange]) -> Vec<LineChange> {
    changes
        .iter()
        .filter(|c| c.tag != ChangeTag::Context)
        .cloned()
        .collect()
}

/// Render a diff as +/- lines with positions, for terminal display.
pub fn render_diff(changes: &[LineChange]) -> String {
    let mut out = String::new();
    for change in changes {
        match change.tag {
            ChangeTag::Added => {
                out.push_str(&format!(
                    "+{:>5} {}\n",
                    change.new_line.unwrap_or(0),
                    change.text
                ));
            }
            ChangeTag::Removed => {
                out.push_str(&format!(
                    "-{:>5} {}\n",
                    change.old_line.unwrap_or(0),
                    change.text
                ));
            }
            ChangeTag::Context => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_contents() {
        let changes = diff_lines("a\nb\nc", "a\nb\nc");
        assert!(changes.iter().all(|c| c.tag == ChangeTag::Context));
        assert!(changes_only(&changes).is_empty());
    }

    #[test]
    fn test_single_changed_line() {
        let changes = diff_lines("one\ntwo\nthree", "one\nTWO\nthree");
        let diff = changes_only(&changes);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].tag, ChangeTag::Removed);
        assert_eq!(diff[0].old_line, Some(2));
        assert_eq!(diff[0].text, "two");
        assert_eq!(diff[1].tag, ChangeTag::Added);
        assert_eq!(diff[1].new_line, Some(2));
        assert_eq!(diff[1].text, "TWO");
    }

    #[test]
    fn test_added_line() {
        let changes = diff_lines("a\nc", "a\nb\nc");
        let diff = changes_only(&changes);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].tag, ChangeTag::Added);
        assert_eq!(diff[0].new_line, Some(2));
        assert_eq!(diff[0].text, "b");
    }

    #[test]
    fn test_removed_line() {
        let changes = diff_lines("a\nb\nc", "a\nc");
        let diff = changes_only(&changes);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].tag, ChangeTag::Removed);
        assert_eq!(diff[0].old_line, Some(2));
    }

    #[test]
    fn test_empty_to_content() {
        let changes = diff_lines("", "a\nb");
        let diff = changes_only(&changes);
        assert_eq!(diff.len(), 2);
        assert!(diff.iter().all(|c| c.tag == ChangeTag::Added));
    }

    #[test]
    fn test_render_format() {
        let changes = diff_lines("old line", "new line");
        let rendered = render_diff(&changes);
        assert!(rendered.contains("-    1 old line"));
        assert!(rendered.contains("+    1 new line"));
    }

    #[test]
    fn test_line_numbers_after_shift() {
        // An insertion early on shifts the new-side numbering
        let changes = diff_lines("x\ny", "inserted\nx\ny");
        let context: Vec<_> = changes
            .iter()
            .filter(|c| c.tag == ChangeTag::Context)
            .collect();
        assert_eq!(context[0].old_line, Some(1));
        assert_eq!(context[0].new_line, Some(2));
    }
}
