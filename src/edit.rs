use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The fundamental edit primitive: literal search/replace on one file.
///
/// `search_block` must occur exactly once in the (line-ending normalized) file
/// content for the edit to apply. `replace_block` may be empty, which deletes
/// the matched block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[must_use = "Edit does nothing until staged or patched"]
pub struct Edit {
    /// Canonical absolute path once staged in a transaction
    pub file_path: PathBuf,
    /// Literal text identifying the target location
    pub search_block: String,
    /// Literal replacement text
    pub replace_block: String,
    /// Unix time in milliseconds when the edit was staged (0 if never staged)
    pub staged_at: u64,
}

impl Edit {
    /// Create an unstaged edit.
    pub fn new(
        file_path: impl Into<PathBuf>,
        search_block: impl Into<String>,
        replace_block: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            search_block: search_block.into(),
            replace_block: replace_block.into(),
            staged_at: 0,
        }
    }

    pub(crate) fn staged(
        file_path: &Path,
        search_block: impl Into<String>,
        replace_block: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.to_path_buf(),
            search_block: search_block.into(),
            replace_block: replace_block.into(),
            staged_at: unix_millis(),
        }
    }

    /// True if the edit removes its search block without replacement.
    pub fn is_deletion(&self) -> bool {
        self.replace_block.is_empty()
    }
}

/// Wire shape of a proposed edit.
///
/// Every field is optional so that incomplete proposals reach the edit
/// validator and are reported as structural issues instead of failing
/// deserialization wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub search_block: Option<String>,
    #[serde(default)]
    pub replace_block: Option<String>,
}

impl EditRequest {
    pub fn new(
        file_path: impl Into<String>,
        search_block: impl Into<String>,
        replace_block: impl Into<String>,
    ) -> Self {
        Self {
            file_path: Some(file_path.into()),
            search_block: Some(search_block.into()),
            replace_block: Some(replace_block.into()),
        }
    }

    /// Parse a JSON array of edit requests.
    pub fn parse_list(json: &str) -> Result<Vec<EditRequest>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Milliseconds since the Unix epoch, saturating to 0 before it.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
