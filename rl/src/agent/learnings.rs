//! Learning extraction from agent output
//!
//! Agents report reusable knowledge as prefixed lines, e.g.
//! `LEARNING: the api returns 204 on empty pages`. Each recognized line
//! becomes one context store entry.

use contextstore::ContextCategory;
use tracing::debug;

const PREFIXES: &[(&str, ContextCategory)] = &[
    ("LEARNING:", ContextCategory::Learning),
    ("PATTERN:", ContextCategory::Pattern),
    ("DISCOVERY:", ContextCategory::Discovery),
    ("GOTCHA:", ContextCategory::Gotcha),
    ("FIX:", ContextCategory::Fix),
];

/// Extract `(category, text)` pairs from prefixed lines, in output order
pub fn extract_learnings(output: &str) -> Vec<(ContextCategory, String)> {
    let found: Vec<_> = output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line.strip_prefix("- ").unwrap_or(line);
            PREFIXES.iter().find_map(|(prefix, category)| {
                line.strip_prefix(prefix)
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(|text| (*category, text.to_string()))
            })
        })
        .collect();
    debug!(count = found.len(), "extract_learnings: done");
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_learnings() {
        let output = "working...\nLEARNING: use the builder\n  - GOTCHA: tests need a tty\nPATTERN:\nnoise FIX: not at start\nFIX: pin the version\n";
        let found = extract_learnings(output);
        assert_eq!(
            found,
            vec![
                (ContextCategory::Learning, "use the builder".to_string()),
                (ContextCategory::Gotcha, "tests need a tty".to_string()),
                (ContextCategory::Fix, "pin the version".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_learnings_none() {
        assert!(extract_learnings("all done\n").is_empty());
    }
}
