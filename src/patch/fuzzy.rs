//! Nearest-line diagnostics for search blocks that were not found.
//!
//! Similarity is Jaccard over lowercase character trigrams of
//! whitespace-collapsed text. Only the first line of the search block is
//! compared; the reported context spans the lines the whole block would
//! occupy, plus two lines either side.

use serde::Serialize;
use std::collections::HashSet;

/// Minimum Jaccard similarity for a line to be suggested.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

const CONTEXT_LINES: usize = 2;

/// Closest candidate location for a search block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMatch {
    /// 1-based line number of the best matching line
    pub line: usize,
    pub similarity: f64,
    /// Numbered excerpt around the candidate; the candidate line is marked `>`
    pub context: String,
}

/// Find the line most similar to the first line of `search_block`.
///
/// Returns `None` when no line reaches [`SIMILARITY_THRESHOLD`]. Equal scores
/// are broken by normalized Levenshtein similarity between the whole search
/// block and the window it would cover; the earlier line wins exact ties.
pub fn find_similar(content: &str, search_block: &str) -> Option<SimilarMatch> {
    let search_block = search_block.trim();
    let first_line = search_block.lines().next()?;
    let needle = trigrams(first_line);
    if needle.is_empty() {
        return None;
    }

    let lines: Vec<&str> = content.lines().collect();
    let span = search_block.lines().count().max(1);

    let mut best: Option<(usize, f64, f64)> = None;
    for (idx, line) in lines.iter().enumerate() {
        let score = jaccard(&needle, &trigrams(line));
        if score < SIMILARITY_THRESHOLD {
            continue;
        }

        match best {
            Some((_, best_score, _)) if score < best_score => {}
            Some((_, best_score, best_tie)) if score == best_score => {
                let tie = window_similarity(&lines, idx, span, search_block);
                if tie > best_tie {
                    best = Some((idx, score, tie));
                }
            }
            _ => {
                let tie = window_similarity(&lines, idx, span, search_block);
                best = Some((idx, score, tie));
            }
        }
    }

    let (idx, similarity, _) = best?;
    Some(SimilarMatch {
        line: idx + 1,
        similarity,
        context: render_context(&lines, idx, span),
    })
}

/// Jaccard similarity of two strings' trigram sets.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    jaccard(&trigrams(a), &trigrams(b))
}

fn trigrams(text: &str) -> HashSet<String> {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let chars: Vec<char> = collapsed.chars().collect();

    if chars.is_empty() {
        return HashSet::new();
    }
    if chars.len() < 3 {
        return HashSet::from([collapsed]);
    }

    chars.windows(3).map(|w| w.iter().collect()).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn window_similarity(lines: &[&str], start: usize, span: usize, search_block: &str) -> f64 {
    let end = (start + span).min(lines.len());
    let window = lines[start..end].join("\n");
    strsim::normalized_levenshtein(&window, search_block)
}

fn render_context(lines: &[&str], idx: usize, span: usize) -> String {
    let start = idx.saturating_sub(CONTEXT_LINES);
    let end = (idx + span + CONTEXT_LINES).min(lines.len());

    (start..end)
        .map(|n| {
            let marker = if n == idx { '>' } else { ' ' };
            format!("{marker}{:4} | {}", n + 1, lines[n])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        assert_eq!(jaccard_similarity("hello world", "hello world"), 1.0);
        assert_eq!(jaccard_similarity("abcdef", "uvwxyz"), 0.0);
        assert_eq!(jaccard_similarity("", ""), 0.0);
    }

    #[test]
    fn test_jaccard_ignores_case_and_whitespace_runs() {
        assert_eq!(jaccard_similarity("Let  X =   1", "let x = 1"), 1.0);
    }

    #[test]
    fn test_short_strings_compare_whole() {
        assert_eq!(jaccard_similarity("ab", "AB"), 1.0);
        assert_eq!(jaccard_similarity("ab", "ac"), 0.0);
    }

    #[test]
    fn test_find_similar_reports_line_and_context() {
        let content = "one\ntwo\nthree\nlet total = items.len();\nfive\nsix\nseven\n";
        let similar = find_similar(content, "let totals = items.len();").unwrap();

        assert_eq!(similar.line, 4);
        assert!(similar.similarity >= SIMILARITY_THRESHOLD);
        assert!(similar.context.contains(">   4 | let total = items.len();"));
        assert!(similar.context.contains("   2 | two"));
        assert!(similar.context.contains("   6 | six"));
        assert!(!similar.context.contains("one"));
        assert!(!similar.context.contains("seven"));
    }

    #[test]
    fn test_find_similar_context_covers_block_span() {
        let content = "a1\na2\nfn render(&self) {\n    body();\n}\nz1\nz2\nz3\n";
        let similar = find_similar(content, "fn render(&mut self) {\n    body();\n}").unwrap();

        assert_eq!(similar.line, 3);
        // two lines before, three lines of block, two lines after
        assert_eq!(similar.context.lines().count(), 7);
        assert!(similar.context.contains("z2"));
        assert!(!similar.context.contains("z3"));
    }

    #[test]
    fn test_find_similar_below_threshold() {
        let content = "completely\ndifferent\ncontent\n";
        assert!(find_similar(content, "fn main() { run(); }").is_none());
    }

    #[test]
    fn test_find_similar_tie_prefers_closer_window() {
        let content = "value = compute(a);\nother();\nvalue = compute(a);\nfinish();\n";
        let similar = find_similar(content, "value = compute(b);\nfinish();").unwrap();
        assert_eq!(similar.line, 3);
    }
}
