//! Gitignore-compatible path filtering.
//!
//! Patterns come from the project-local `.podflowignore`, which uses gitignore
//! syntax. The same matcher filters local sync triggers and the supervisor's
//! change notifications, so both sides agree on what counts as a change.
//!
//! Supported syntax:
//! - blank lines and `#` comments are skipped (`\#` escapes a literal `#`)
//! - `!pattern` re-includes a previously ignored path
//! - a trailing `/` matches directories only
//! - a pattern containing `/` is anchored to the project root; otherwise it
//!   matches at any depth
//! - `*`, `?`, `[...]` never cross `/`; `**` does
//! - a path inside an ignored directory is ignored, and cannot be re-included
//!
//! [`IgnoreMatcher::rsync_filters`] restates the rules for `rsync`, whose own
//! exclude files read `!` and anchoring differently.

use std::path::{Component, Path};

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

use crate::constants::IGNORE_FILE;

#[derive(Clone, Debug)]
struct Rule {
    matcher: GlobMatcher,
    negated: bool,
    dir_only: bool,
    filter: String,
}

/// Compiled set of ignore rules. Later rules override earlier ones.
#[derive(Clone, Debug, Default)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    /// A matcher that ignores nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile rules from gitignore-formatted text. Invalid patterns are
    /// skipped with a warning.
    pub fn parse(contents: &str) -> Self {
        let rules = contents.lines().filter_map(parse_rule).collect();
        Self { rules }
    }

    /// Load `<root>/.podflowignore`. A missing file yields an empty matcher.
    pub fn load(root: &Path) -> std::io::Result<Self> {
        Self::from_file(&root.join(IGNORE_FILE))
    }

    /// Load rules from `path`. A missing file yields an empty matcher.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(e),
        }
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rules as `rsync` filter rules (`- pattern` / `+ pattern`).
    ///
    /// rsync stops at the first matching rule, so the list is reversed to keep
    /// last-match-wins. An excluded directory is never descended into, which
    /// matches the no-re-include rule for ignored ancestors.
    pub fn rsync_filters(&self) -> Vec<String> {
        self.rules.iter().rev().map(|rule| rule.filter.clone()).collect()
    }

    /// Whether `rel_path` (relative to the project root) is ignored.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        let parts: Vec<String> = rel_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return false;
        }

        // An ignored ancestor directory hides everything beneath it.
        for depth in 1..parts.len() {
            let ancestor = parts[..depth].join("/");
            if self.evaluate(&ancestor, true) == Some(true) {
                return true;
            }
        }

        self.evaluate(&parts.join("/"), is_dir).unwrap_or(false)
    }

    /// Last matching rule decides: `Some(true)` ignored, `Some(false)`
    /// re-included, `None` no rule matched.
    fn evaluate(&self, path: &str, is_dir: bool) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|rule| (!rule.dir_only || is_dir) && rule.matcher.is_match(path))
            .map(|rule| !rule.negated)
    }
}

fn parse_rule(line: &str) -> Option<Rule> {
    let mut pattern = line.trim_end();
    if pattern.is_empty() || pattern.starts_with('#') {
        return None;
    }

    let negated = pattern.starts_with('!');
    if negated {
        pattern = &pattern[1..];
    }
    if pattern.starts_with("\\#") || pattern.starts_with("\\!") {
        pattern = &pattern[1..];
    }

    let dir_only = pattern.ends_with('/');
    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() {
        return None;
    }

    let anchored = pattern.contains('/');
    let glob = if anchored {
        pattern.trim_start_matches('/').to_string()
    } else {
        format!("**/{pattern}")
    };
    let filter = format!(
        "{} {}{}{}",
        if negated { '+' } else { '-' },
        if anchored { "/" } else { "" },
        pattern.trim_start_matches('/'),
        if dir_only { "/" } else { "" },
    );

    match GlobBuilder::new(&glob).literal_separator(true).build() {
        Ok(g) => Some(Rule {
            matcher: g.compile_matcher(),
            negated,
            dir_only,
            filter,
        }),
        Err(e) => {
            warn!(pattern = line, error = %e, "skipping invalid ignore pattern");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored(m: &IgnoreMatcher, path: &str) -> bool {
        m.is_ignored(Path::new(path), false)
    }

    #[test]
    fn empty_matcher_ignores_nothing() {
        let m = IgnoreMatcher::empty();
        assert!(!ignored(&m, "src/handler.py"));
        assert!(m.is_empty());
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let m = IgnoreMatcher::parse("# comment\n\n   \n*.pyc\n");
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn unanchored_pattern_matches_at_any_depth() {
        let m = IgnoreMatcher::parse("*.pyc\n");
        assert!(ignored(&m, "a.pyc"));
        assert!(ignored(&m, "src/deep/b.pyc"));
        assert!(!ignored(&m, "src/handler.py"));
    }

    #[test]
    fn anchored_pattern_matches_only_at_root() {
        let m = IgnoreMatcher::parse("/build\n");
        assert!(ignored(&m, "build/out.bin"));
        assert!(!ignored(&m, "src/build/out.bin"));
    }

    #[test]
    fn directory_pattern_hides_contents() {
        let m = IgnoreMatcher::parse("__pycache__/\n");
        assert!(ignored(&m, "src/__pycache__/handler.cpython-310.pyc"));
        // A plain file with the same name is not a directory.
        assert!(!m.is_ignored(Path::new("__pycache__"), false));
        assert!(m.is_ignored(Path::new("__pycache__"), true));
    }

    #[test]
    fn negation_reincludes_file() {
        let m = IgnoreMatcher::parse("*.log\n!keep.log\n");
        assert!(ignored(&m, "debug.log"));
        assert!(!ignored(&m, "keep.log"));
    }

    #[test]
    fn negation_cannot_escape_ignored_directory() {
        let m = IgnoreMatcher::parse("data/\n!data/keep.txt\n");
        assert!(ignored(&m, "data/keep.txt"));
    }

    #[test]
    fn star_does_not_cross_separator() {
        let m = IgnoreMatcher::parse("docs/*.md\n");
        assert!(ignored(&m, "docs/readme.md"));
        assert!(!ignored(&m, "docs/api/readme.md"));
    }

    #[test]
    fn double_star_crosses_separator() {
        let m = IgnoreMatcher::parse("docs/**/*.md\n");
        assert!(ignored(&m, "docs/api/v1/readme.md"));
    }

    #[test]
    fn escaped_hash_is_literal() {
        let m = IgnoreMatcher::parse("\\#notes\n");
        assert!(ignored(&m, "#notes"));
    }

    #[test]
    fn rsync_filters_keep_last_match_wins() {
        let m = IgnoreMatcher::parse("# build output\n*.log\n!keep.log\n/build\n__pycache__/\nsrc/gen/\n");
        assert_eq!(
            m.rsync_filters(),
            ["- /src/gen/", "- __pycache__/", "- /build", "+ keep.log", "- *.log"]
        );
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let m = IgnoreMatcher::load(dir.path()).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn load_reads_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IGNORE_FILE), "venv/\n").unwrap();
        let m = IgnoreMatcher::load(dir.path()).unwrap();
        assert!(ignored(&m, "venv/bin/python"));
    }
}
