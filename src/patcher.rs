//! Pulls machine-usable content out of a free-form model reply: either a
//! unified diff or the corrected program inside a fenced code block.
//!
//! Applying a diff to the original source is not supported; callers show the
//! extracted text to the user instead.

use regex::Regex;
use std::sync::OnceLock;

/// Tried in order; the first match wins
const DIFF_PATTERNS: &[&str] = &[r"(?s)```diff(.*?)```", r"(?s)```(?:diff)?(.*?)```"];

const CODE_PATTERNS: &[&str] = &[r"(?s)```python\s*(.*?)```", r"(?s)```\s*(.*?)```"];

/// Line prefixes that mark the start of an unfenced diff
const DIFF_MARKERS: &[&str] = &["diff --", "--- ", "@@"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

fn diff_fences() -> &'static [Regex] {
    static FENCES: OnceLock<Vec<Regex>> = OnceLock::new();
    FENCES.get_or_init(|| compile(DIFF_PATTERNS))
}

fn code_fences() -> &'static [Regex] {
    static FENCES: OnceLock<Vec<Regex>> = OnceLock::new();
    FENCES.get_or_init(|| compile(CODE_PATTERNS))
}

fn first_capture<'t>(fences: &[Regex], text: &'t str) -> Option<&'t str> {
    fences
        .iter()
        .find_map(|re| re.captures(text).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str())
}

/// Extract a unified diff from `text`.
///
/// A ```` ```diff ```` fence is preferred, then any fence. Without fences the
/// diff is taken to start at the first line beginning with `diff --`, `--- `
/// or `@@` and run to the end of the text. Returns an empty string when
/// nothing diff-like is found.
pub fn extract_unified_diff(text: &str) -> String {
    if let Some(body) = first_capture(diff_fences(), text) {
        return body.trim().to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|line| DIFF_MARKERS.iter().any(|marker| line.starts_with(marker)));

    match start {
        Some(start) => lines[start..].join("\n").trim().to_string(),
        None => String::new(),
    }
}

/// Extract the first fenced code block from `text`, preferring a `python`
/// fence. A reply with no fence at all is taken to be the code itself.
pub fn extract_code_block(text: &str) -> String {
    first_capture(code_fences(), text)
        .unwrap_or(text)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUNK: &str = "--- a/app.py\n+++ b/app.py\n@@ -1 +1 @@\n-x = 1\n+x = 2";

    #[test]
    fn diff_fence_is_preferred() {
        let reply = format!(
            "Here is some context:\n```python\nprint(1)\n```\nand the fix:\n```diff\n{}\n```\n",
            HUNK
        );
        assert_eq!(extract_unified_diff(&reply), HUNK);
    }

    #[test]
    fn any_fence_is_accepted() {
        let reply = format!("Fix:\n```\n{}\n```", HUNK);
        assert_eq!(extract_unified_diff(&reply), HUNK);
    }

    #[test]
    fn unfenced_diff_starts_at_first_marker() {
        let reply = format!("I changed one line.\n\n{}\n", HUNK);
        assert_eq!(extract_unified_diff(&reply), HUNK);

        let bare_hunk = "Try this\n@@ -3 +3 @@\n-a\n+b";
        assert_eq!(extract_unified_diff(bare_hunk), "@@ -3 +3 @@\n-a\n+b");
    }

    #[test]
    fn no_diff_is_empty() {
        assert_eq!(extract_unified_diff("Looks fine to me."), "");
        assert_eq!(extract_unified_diff(""), "");
    }

    #[test]
    fn python_fence_wins_over_plain_fence() {
        let reply = "```\nnot this\n```\n```python\ndef f():\n    return 1\n```";
        assert_eq!(extract_code_block(reply), "def f():\n    return 1");
    }

    #[test]
    fn plain_fence_is_used_when_no_python_fence() {
        let reply = "Fixed:\n```\nx = [1, 2]\n```\nDone.";
        assert_eq!(extract_code_block(reply), "x = [1, 2]");
    }

    #[test]
    fn unfenced_reply_is_the_code() {
        assert_eq!(extract_code_block("  x = 1\n"), "x = 1");
    }
}
