//! Structural validation of proposed edits.
//!
//! Runs before anything touches the filesystem. Every violated rule is
//! reported, not just the first one.

use crate::edit::EditRequest;
use serde::Serialize;
use std::fmt;

/// Minimum length of a search block after trimming.
pub const MIN_SEARCH_BLOCK_LEN: usize = 5;

/// Outcome of [`validate_edit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "EditValidation should be checked before staging"]
pub struct EditValidation {
    pub valid: bool,
    pub issues: Vec<EditIssue>,
}

impl EditValidation {
    pub fn into_result(self) -> Result<(), StructuralError> {
        if self.valid {
            Ok(())
        } else {
            Err(StructuralError {
                issues: self.issues,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum EditIssue {
    MissingField { field: &'static str },
    BlankFilePath,
    SearchBlockTooShort { len: usize, min: usize },
}

impl fmt::Display for EditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditIssue::MissingField { field } => write!(f, "edit missing required field '{field}'"),
            EditIssue::BlankFilePath => write!(f, "edit filePath is empty"),
            EditIssue::SearchBlockTooShort { len, min } => write!(
                f,
                "searchBlock is {len} characters after trimming, need at least {min}"
            ),
        }
    }
}

/// A malformed edit, rejected at staging time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralError {
    pub issues: Vec<EditIssue>,
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StructuralError {}

/// Check an edit request independent of any file.
pub fn validate_edit(edit: &EditRequest) -> EditValidation {
    let mut issues = Vec::new();

    match edit.file_path.as_deref() {
        None => issues.push(EditIssue::MissingField { field: "filePath" }),
        Some(path) if path.trim().is_empty() => issues.push(EditIssue::BlankFilePath),
        Some(_) => {}
    }

    match edit.search_block.as_deref() {
        None => issues.push(EditIssue::MissingField {
            field: "searchBlock",
        }),
        Some(search) => {
            let len = search.trim().chars().count();
            if len < MIN_SEARCH_BLOCK_LEN {
                issues.push(EditIssue::SearchBlockTooShort {
                    len,
                    min: MIN_SEARCH_BLOCK_LEN,
                });
            }
        }
    }

    if edit.replace_block.is_none() {
        issues.push(EditIssue::MissingField {
            field: "replaceBlock",
        });
    }

    EditValidation {
        valid: issues.is_empty(),
        issues,
    }
}
