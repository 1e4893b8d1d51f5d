//! Literal search/replace patching.
//!
//! Pure functions, no I/O. A search block applies only when it occurs exactly
//! once in the target text; zero occurrences yields [`PatchError::NotFound`]
//! (with a fuzzy nearest-line suggestion when one clears the similarity
//! threshold) and more than one yields [`PatchError::AmbiguousMatch`].
//!
//! Line endings are normalized to `\n` on both sides before matching, and the
//! search block is trimmed. The returned content is the normalized text.

pub mod fuzzy;

use crate::edit::Edit;
use std::borrow::Cow;
use thiserror::Error;

pub use fuzzy::{find_similar, jaccard_similarity, SimilarMatch, SIMILARITY_THRESHOLD};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("{}", describe_not_found(.suggestion))]
    NotFound { suggestion: Option<SimilarMatch> },

    #[error("search block matched {count} locations, expected exactly 1")]
    AmbiguousMatch { count: usize },
}

fn describe_not_found(suggestion: &Option<SimilarMatch>) -> String {
    match suggestion {
        Some(similar) => format!(
            "search block not found; closest match at line {} (similarity {:.2}):\n{}",
            similar.line, similar.similarity, similar.context
        ),
        None => "search block not found".to_string(),
    }
}

/// A single failed edit inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EditFailure {
    /// Position of the edit in the batch
    pub index: usize,
    pub error: PatchError,
}

/// Result of [`apply_patches`].
///
/// `final_content` reflects every edit that succeeded. When `failed > 0` it is
/// a diagnostic artifact and must not be persisted.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "BatchOutcome should be checked for failed edits"]
pub struct BatchOutcome {
    pub final_content: String,
    pub applied: usize,
    pub failed: usize,
    pub errors: Vec<EditFailure>,
}

impl BatchOutcome {
    /// True if every edit in the batch applied.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Convert CRLF line endings to LF, borrowing when there is nothing to do.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains("\r\n") {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Count occurrences of `needle` in `haystack`, overlaps included.
///
/// The scan resumes one character after each match start, so `"aa"` occurs
/// twice in `"aaa"`. An empty needle never matches.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }

    let mut count = 0;
    let mut pos = 0;
    while let Some(offset) = haystack[pos..].find(needle) {
        count += 1;
        let start = pos + offset;
        let step = haystack[start..].chars().next().map_or(1, char::len_utf8);
        pos = start + step;
    }
    count
}

/// Apply one edit to `content`.
pub fn apply_patch(content: &str, edit: &Edit) -> Result<String, PatchError> {
    let content = normalize_line_endings(content);
    let search = normalize_line_endings(&edit.search_block);
    let search = search.trim();
    let replace = normalize_line_endings(&edit.replace_block);

    match count_occurrences(&content, search) {
        0 => Err(PatchError::NotFound {
            suggestion: find_similar(&content, search),
        }),
        1 => Ok(content.replacen(search, &replace, 1)),
        count => Err(PatchError::AmbiguousMatch { count }),
    }
}

/// Apply edits in order against an accumulating buffer.
///
/// Never stops at the first failure: a failed edit is recorded and the next
/// edit runs against the latest successfully modified buffer.
pub fn apply_patches(content: &str, edits: &[Edit]) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        final_content: content.to_string(),
        applied: 0,
        failed: 0,
        errors: Vec::new(),
    };

    for (index, edit) in edits.iter().enumerate() {
        match apply_patch(&outcome.final_content, edit) {
            Ok(next) => {
                outcome.final_content = next;
                outcome.applied += 1;
            }
            Err(error) => {
                outcome.failed += 1;
                outcome.errors.push(EditFailure { index, error });
            }
        }
    }

    outcome
}
