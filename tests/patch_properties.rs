//! Property tests for the search/replace patcher.

use file_tx::patch::{apply_patch, apply_patches, count_occurrences};
use file_tx::{Edit, PatchError};
use proptest::prelude::*;

/// A marker that cannot occur in the generated filler text.
const MARKER: &str = "@@TARGET@@";

fn filler() -> impl Strategy<Value = String> {
    "[a-z \n]{0,60}"
}

proptest! {
    #[test]
    fn unique_match_length_law(prefix in filler(), suffix in filler(), replace in "[a-z]{0,20}") {
        let content = format!("{prefix}{MARKER}{suffix}");
        let edit = Edit::new("f.txt", MARKER, replace.clone());

        let result = apply_patch(&content, &edit).unwrap();
        prop_assert_eq!(result.len(), content.len() - MARKER.len() + replace.len());
        prop_assert_eq!(result, format!("{prefix}{replace}{suffix}"));
    }

    #[test]
    fn overlapping_occurrences_are_counted(n in 2usize..40) {
        let haystack = "a".repeat(n);
        prop_assert_eq!(count_occurrences(&haystack, "aa"), n - 1);
    }

    #[test]
    fn repeated_marker_is_ambiguous(prefix in filler(), middle in filler(), suffix in filler()) {
        let content = format!("{prefix}{MARKER}{middle}{MARKER}{suffix}");
        let edit = Edit::new("f.txt", MARKER, "x");

        prop_assert_eq!(
            apply_patch(&content, &edit),
            Err(PatchError::AmbiguousMatch { count: 2 })
        );
    }

    #[test]
    fn reverse_edit_restores_content(prefix in filler(), suffix in filler()) {
        let content = format!("{prefix}{MARKER}{suffix}");
        let forward = Edit::new("f.txt", MARKER, "<<REPLACED>>");
        let backward = Edit::new("f.txt", "<<REPLACED>>", MARKER);

        let patched = apply_patch(&content, &forward).unwrap();
        let restored = apply_patch(&patched, &backward).unwrap();
        prop_assert_eq!(restored, content);
    }

    #[test]
    fn batch_accounts_for_every_edit(content in filler(), searches in prop::collection::vec("[a-z]{1,4}", 0..6)) {
        let edits: Vec<Edit> = searches
            .iter()
            .map(|s| Edit::new("f.txt", s.clone(), s.to_uppercase()))
            .collect();

        let outcome = apply_patches(&content, &edits);
        prop_assert_eq!(outcome.applied + outcome.failed, edits.len());
        prop_assert_eq!(outcome.errors.len(), outcome.failed);
        prop_assert_eq!(outcome.is_clean(), outcome.failed == 0);
    }

    #[test]
    fn crlf_content_matches_lf_search(lines in prop::collection::vec("[a-z]{1,10}", 1..6)) {
        let crlf = format!("{}\r\n{MARKER}\r\n", lines.join("\r\n"));
        let edit = Edit::new("f.txt", format!("{MARKER}\n"), "done");

        let result = apply_patch(&crlf, &edit).unwrap();
        prop_assert!(!result.contains('\r'));
        prop_assert!(result.ends_with("done\n"));
    }
}
