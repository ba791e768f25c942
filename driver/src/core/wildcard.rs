//! Shell-style wildcard matching for item discovery.

use anyhow::{Context, Result, anyhow};
use regex::Regex;

/// Compile a `*`/`?` file-name pattern into an anchored regex.
///
/// Every other character matches literally. Patterns may not span directories.
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() {
        return Err(anyhow!("wildcard pattern must be non-empty"));
    }
    if pattern.contains('/') {
        return Err(anyhow!(
            "wildcard pattern must match file names only: {pattern}"
        ));
    }
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    expr.push('$');
    Regex::new(&expr).with_context(|| format!("compile wildcard {pattern}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        let re = wildcard_regex("*.tgz").expect("regex");
        assert!(re.is_match("user.data.00001.tgz"));
        assert!(re.is_match(".tgz"));
        assert!(!re.is_match("a.tgz.bak"));
        assert!(!re.is_match("a.tar.gz"));
    }

    #[test]
    fn question_matches_one_char() {
        let re = wildcard_regex("run_?.log").expect("regex");
        assert!(re.is_match("run_1.log"));
        assert!(!re.is_match("run_12.log"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let re = wildcard_regex("a+(b).txt").expect("regex");
        assert!(re.is_match("a+(b).txt"));
        assert!(!re.is_match("aa(b)xtxt"));
    }

    #[test]
    fn rejects_directory_patterns() {
        assert!(wildcard_regex("data/*.tgz").is_err());
        assert!(wildcard_regex("").is_err());
    }
}
