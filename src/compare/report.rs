//! Comparison report types and text formatting.

use serde::Serialize;
use std::fmt;

/// Result of comparing two datasets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompareReport {
    /// Item-level counts, matched by `(subset, id)`.
    pub items: ItemCounts,
    /// Label-name counts.
    pub categories: NameCounts,
    /// False when label order or metadata differ even if names match.
    pub categories_identical: bool,
    /// Media byte comparison, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<CompareDetail>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ItemCounts {
    pub shared: usize,
    pub only_in_a: usize,
    pub only_in_b: usize,
    pub modified: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NameCounts {
    pub shared: usize,
    pub only_in_a: usize,
    pub only_in_b: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MediaCounts {
    pub compared: usize,
    pub differing: usize,
}

/// Item keys behind the counts, capped at `max_items` per list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompareDetail {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub modified: Vec<String>,
    pub max_items: usize,
}

impl CompareReport {
    /// True when the datasets hold the same items, labels and (if compared)
    /// media bytes.
    pub fn is_equal(&self) -> bool {
        self.items.only_in_a == 0
            && self.items.only_in_b == 0
            && self.items.modified == 0
            && self.categories_identical
            && self.media.as_ref().map_or(true, |media| media.differing == 0)
    }
}

impl fmt::Display for CompareReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Items:       {} shared, {} only in A, {} only in B",
            self.items.shared, self.items.only_in_a, self.items.only_in_b
        )?;
        writeln!(f, "             modified ({})", self.items.modified)?;
        writeln!(
            f,
            "Categories:  {} shared, {} only in A, {} only in B",
            self.categories.shared, self.categories.only_in_a, self.categories.only_in_b
        )?;
        if let Some(media) = &self.media {
            writeln!(
                f,
                "Media:       {} compared, {} differing",
                media.compared, media.differing
            )?;
        }

        if let Some(detail) = &self.detail {
            for (title, keys) in [
                ("Items only in A", &detail.only_in_a),
                ("Items only in B", &detail.only_in_b),
                ("Items modified", &detail.modified),
            ] {
                writeln!(f)?;
                writeln!(f, "{} (showing first {}):", title, detail.max_items)?;
                if keys.is_empty() {
                    writeln!(f, "  - (none)")?;
                }
                for key in keys {
                    writeln!(f, "  - {key}")?;
                }
            }
        }

        writeln!(f)?;
        if self.is_equal() {
            writeln!(f, "Datasets are equal")
        } else {
            writeln!(f, "Datasets differ")
        }
    }
}
