//! Dataset comparison.
//!
//! Items are matched by `(subset, id)`. Two matched items are the same when
//! their annotations, attributes and media kind/frame agree; media paths are
//! ignored because the same dataset lives at different paths in different
//! stores. Media bytes are only compared on request.

mod report;

pub use report::{CompareDetail, CompareReport, ItemCounts, MediaCounts, NameCounts};

use std::collections::BTreeSet;
use std::fs;

use rayon::prelude::*;

use crate::dataset::{Dataset, DatasetItem, ItemKey};

/// Comparison options.
#[derive(Clone, Debug)]
pub struct CompareOptions {
    /// Compare the bytes of media files of shared items.
    pub compare_media: bool,
    /// Collect the keys behind the counts.
    pub detail: bool,
    /// Cap on each detail list.
    pub max_items: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            compare_media: false,
            detail: false,
            max_items: 20,
        }
    }
}

/// Compares dataset `a` with dataset `b`.
pub fn compare_datasets(a: &Dataset, b: &Dataset, opts: &CompareOptions) -> CompareReport {
    let keys_a: BTreeSet<ItemKey> = a.items().map(DatasetItem::key).collect();
    let keys_b: BTreeSet<ItemKey> = b.items().map(DatasetItem::key).collect();

    let shared: Vec<&ItemKey> = keys_a.intersection(&keys_b).collect();
    let only_in_a: Vec<&ItemKey> = keys_a.difference(&keys_b).collect();
    let only_in_b: Vec<&ItemKey> = keys_b.difference(&keys_a).collect();

    let pairs: Vec<(&DatasetItem, &DatasetItem)> = shared
        .iter()
        .filter_map(|key| Some((a.get(&key.id, &key.subset)?, b.get(&key.id, &key.subset)?)))
        .collect();
    let modified: Vec<&DatasetItem> = pairs
        .iter()
        .filter(|(item_a, item_b)| !same_content(item_a, item_b))
        .map(|(item_a, _)| *item_a)
        .collect();

    let names_a: BTreeSet<&str> = a.categories().labels.iter().map(|l| l.name.as_str()).collect();
    let names_b: BTreeSet<&str> = b.categories().labels.iter().map(|l| l.name.as_str()).collect();

    let media = opts.compare_media.then(|| compare_media(&pairs));

    let detail = opts.detail.then(|| CompareDetail {
        only_in_a: keys_to_strings(only_in_a.iter().copied(), opts.max_items),
        only_in_b: keys_to_strings(only_in_b.iter().copied(), opts.max_items),
        modified: modified
            .iter()
            .take(opts.max_items)
            .map(|item| item.key().to_string())
            .collect(),
        max_items: opts.max_items,
    });

    CompareReport {
        items: ItemCounts {
            shared: shared.len(),
            only_in_a: only_in_a.len(),
            only_in_b: only_in_b.len(),
            modified: modified.len(),
        },
        categories: NameCounts {
            shared: names_a.intersection(&names_b).count(),
            only_in_a: names_a.difference(&names_b).count(),
            only_in_b: names_b.difference(&names_a).count(),
        },
        categories_identical: a.categories() == b.categories(),
        media,
        detail,
    }
}

fn same_content(a: &DatasetItem, b: &DatasetItem) -> bool {
    let media_matches = match (&a.media, &b.media) {
        (None, None) => true,
        (Some(ma), Some(mb)) => ma.kind == mb.kind && ma.frame == mb.frame,
        _ => false,
    };
    media_matches && a.annotations == b.annotations && a.attributes == b.attributes
}

/// Byte comparison of the media of matched items. Reads run in parallel.
fn compare_media(pairs: &[(&DatasetItem, &DatasetItem)]) -> MediaCounts {
    let results: Vec<bool> = pairs
        .par_iter()
        .filter_map(|(a, b)| match (&a.media, &b.media) {
            (None, None) => None,
            (Some(ma), Some(mb)) => Some(match (fs::read(&ma.path), fs::read(&mb.path)) {
                (Ok(bytes_a), Ok(bytes_b)) => bytes_a == bytes_b,
                _ => false,
            }),
            _ => Some(false),
        })
        .collect();

    MediaCounts {
        compared: results.len(),
        differing: results.iter().filter(|same| !**same).count(),
    }
}

fn keys_to_strings<'a>(keys: impl Iterator<Item = &'a ItemKey>, max_items: usize) -> Vec<String> {
    keys.take(max_items).map(ItemKey::to_string).collect()
}
