//! In-memory dataset model.
//!
//! A [`Dataset`] owns its items keyed by `(subset, id)`, the label schema,
//! free-form `infos` metadata and a declared media type. Every mutating
//! operation updates a [`ChangeTracker`] so that an in-place save can rewrite
//! only the subsets that changed.
//!
//! # Example
//!
//! ```
//! use labelvault::dataset::{Dataset, DatasetItem, SubsetState};
//!
//! let mut dataset = Dataset::from_items([
//!     DatasetItem::new("1").in_subset("train"),
//!     DatasetItem::new("2").in_subset("test"),
//! ]);
//! dataset.remove("2", "test");
//! assert_eq!(dataset.subset_state("test"), SubsetState::PendingDelete);
//! ```

mod annotation;
mod item;
mod tracking;

pub use annotation::{Annotation, Categories, LabelCategory, Shape};
pub use item::{DatasetItem, ItemKey, Media, MediaKind, DEFAULT_SUBSET};
pub use tracking::{ChangeTracker, SubsetState};

pub(crate) use item::extension_with_dot;

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::Environment;
use crate::error::LabelvaultError;
use crate::format::{ExportOptions, ExportStats, ImportOptions, SavePlan};
use crate::transform::Transform;

/// Where a dataset was last imported from or saved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetSource {
    pub path: PathBuf,
    pub format: String,
}

/// A collection of labeled items.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    items: BTreeMap<ItemKey, DatasetItem>,
    categories: Categories,
    infos: BTreeMap<String, Value>,
    media_type: Option<MediaKind>,
    tracker: ChangeTracker,
    source: Option<DatasetSource>,
}

impl Dataset {
    /// Creates an empty dataset with no backing store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh dataset from items. Later duplicates of a key win.
    pub fn from_items(items: impl IntoIterator<Item = DatasetItem>) -> Self {
        let mut dataset = Self::new();
        for item in items {
            dataset.put(item);
        }
        dataset
    }

    pub fn with_categories(mut self, categories: Categories) -> Self {
        self.set_categories(categories);
        self
    }

    pub fn with_media_type(mut self, media_type: MediaKind) -> Self {
        self.set_media_type(media_type);
        self
    }

    pub fn with_infos(mut self, infos: BTreeMap<String, Value>) -> Self {
        self.set_infos(infos);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str, subset: &str) -> Option<&DatasetItem> {
        self.items.get(&ItemKey::new(id, subset))
    }

    /// All items ordered by subset then id.
    pub fn items(&self) -> impl Iterator<Item = &DatasetItem> {
        self.items.values()
    }

    /// Items of one subset ordered by id.
    pub fn subset_items<'a>(&'a self, subset: &'a str) -> impl Iterator<Item = &'a DatasetItem> {
        self.items
            .range(ItemKey::subset_start(subset)..)
            .take_while(move |(key, _)| key.subset == subset)
            .map(|(_, item)| item)
    }

    /// Pull-based cursor yielding the items of `subset` in chunks.
    pub fn cursor<'a>(&'a self, subset: &'a str, chunk_size: usize) -> ItemCursor<'a> {
        ItemCursor {
            range: self.items.range(ItemKey::subset_start(subset)..),
            subset,
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }

    /// Names of all non-empty subsets, sorted.
    pub fn subsets(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for key in self.items.keys() {
            if names.last() != Some(&key.subset) {
                names.push(key.subset.clone());
            }
        }
        names
    }

    pub fn subset_len(&self, subset: &str) -> usize {
        self.subset_items(subset).count()
    }

    pub fn categories(&self) -> &Categories {
        &self.categories
    }

    pub fn infos(&self) -> &BTreeMap<String, Value> {
        &self.infos
    }

    /// Declared media type; inferred from the first item with media when unset.
    pub fn media_type(&self) -> MediaKind {
        self.media_type
            .or_else(|| {
                self.items
                    .values()
                    .find_map(|item| item.media.as_ref().map(|media| media.kind))
            })
            .unwrap_or(MediaKind::Image)
    }

    pub fn source(&self) -> Option<&DatasetSource> {
        self.source.as_ref()
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn subset_state(&self, subset: &str) -> SubsetState {
        self.tracker.state(subset)
    }

    /// True when something changed since the last import or save.
    pub fn is_modified(&self) -> bool {
        !self.tracker.is_clean()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Inserts or replaces the item with the same `(id, subset)`.
    pub fn put(&mut self, item: DatasetItem) -> Option<DatasetItem> {
        self.tracker.mark_dirty(&item.subset);
        self.items.insert(item.key(), item)
    }

    /// Removes an item; an emptied subset is scheduled for deletion.
    pub fn remove(&mut self, id: &str, subset: &str) -> Option<DatasetItem> {
        let removed = self.items.remove(&ItemKey::new(id, subset))?;
        self.mark_after_removal(subset);
        Some(removed)
    }

    /// Keeps only the items matching `predicate`.
    pub fn filter<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&DatasetItem) -> bool,
    {
        let mut affected: BTreeSet<String> = BTreeSet::new();
        let before = self.items.len();
        self.items.retain(|key, item| {
            let keep = predicate(item);
            if !keep {
                affected.insert(key.subset.clone());
            }
            keep
        });

        for subset in &affected {
            self.mark_after_removal(subset);
        }

        before - self.items.len()
    }

    /// Applies a transform by name with JSON parameters.
    pub fn transform(&mut self, name: &str, params: &Value) -> Result<(), LabelvaultError> {
        let transform = Transform::from_params(name, params)?;
        self.apply_transform(&transform)
    }

    /// Applies a typed transform.
    pub fn apply_transform(&mut self, transform: &Transform) -> Result<(), LabelvaultError> {
        let items: Vec<DatasetItem> = self.items.values().cloned().collect();
        let rewritten = transform.apply(items)?;
        self.replace_items(rewritten);
        Ok(())
    }

    /// Replaces the whole item set, marking exactly the subsets whose
    /// content differs from before.
    pub fn replace_items(&mut self, items: impl IntoIterator<Item = DatasetItem>) {
        let new_items: BTreeMap<ItemKey, DatasetItem> =
            items.into_iter().map(|item| (item.key(), item)).collect();

        let mut touched: BTreeSet<String> = BTreeSet::new();
        for (key, item) in &self.items {
            if new_items.get(key) != Some(item) {
                touched.insert(key.subset.clone());
            }
        }
        for (key, item) in &new_items {
            if self.items.get(key) != Some(item) {
                touched.insert(key.subset.clone());
            }
        }

        self.items = new_items;
        for subset in &touched {
            self.mark_after_removal(subset);
        }
    }

    /// Replaces the label schema. Every subset embeds it, so all become dirty.
    pub fn set_categories(&mut self, categories: Categories) {
        self.categories = categories;
        self.mark_everything_dirty();
    }

    pub fn set_infos(&mut self, infos: BTreeMap<String, Value>) {
        self.infos = infos;
        self.mark_everything_dirty();
    }

    pub fn set_media_type(&mut self, media_type: MediaKind) {
        self.media_type = Some(media_type);
        self.mark_everything_dirty();
    }

    fn mark_everything_dirty(&mut self) {
        let subsets = self.subsets();
        self.tracker.mark_all_dirty(subsets.iter().map(String::as_str));
    }

    fn mark_after_removal(&mut self, subset: &str) {
        if self.subset_len(subset) == 0 {
            self.tracker.mark_removed(subset);
        } else {
            self.tracker.mark_dirty(subset);
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Imports a dataset, detecting the format when `format` is `None`.
    ///
    /// The returned dataset is bound to `path` with no pending changes.
    pub fn import_from(
        env: &Environment,
        path: &Path,
        format: Option<&str>,
        options: &ImportOptions,
    ) -> Result<Dataset, LabelvaultError> {
        env.import(path, format, options)
    }

    /// Exports the dataset to `target` in `format`.
    ///
    /// Exporting in a format that supports in-place saving to the location
    /// the dataset is bound to only rewrites changed subsets. Afterwards the
    /// dataset is bound to `target`.
    pub fn export(
        &mut self,
        env: &Environment,
        target: &Path,
        format: &str,
        options: &ExportOptions,
    ) -> Result<ExportStats, LabelvaultError> {
        let plugin = env.get(format)?;
        let exporter = plugin
            .exporter()
            .ok_or_else(|| LabelvaultError::UnsupportedOperation {
                format: format.to_string(),
                operation: "export",
            })?;

        let in_place = exporter.supports_patch() && self.is_bound_to(target, format);
        let plan = if in_place {
            SavePlan::Patch {
                dirty: self.tracker.dirty_subsets(),
                removed: self.tracker.removed_subsets(),
            }
        } else {
            SavePlan::Full
        };
        debug!(format, target = %target.display(), in_place, "exporting dataset");

        let outcome = exporter.export(self, target, options, &plan)?;

        for (key, path) in outcome.relocated {
            if let Some(media) = self
                .items
                .get_mut(&key)
                .and_then(|item| item.media.as_mut())
            {
                media.path = path;
            }
        }

        if exporter.supports_patch() {
            self.source = Some(DatasetSource {
                path: target.to_path_buf(),
                format: format.to_string(),
            });
            self.tracker.clear();
        }

        info!(
            format,
            target = %target.display(),
            containers_written = outcome.stats.containers_written,
            containers_deleted = outcome.stats.containers_deleted,
            media_copied = outcome.stats.media_copied,
            "export finished"
        );
        Ok(outcome.stats)
    }

    /// Saves changes back to the bound location.
    pub fn save(
        &mut self,
        env: &Environment,
        options: &ExportOptions,
    ) -> Result<ExportStats, LabelvaultError> {
        let source = self.source.clone().ok_or(LabelvaultError::NotBound)?;
        self.export(env, &source.path, &source.format, options)
    }

    /// Binds a freshly imported dataset to its source with no pending changes.
    pub(crate) fn bind(&mut self, path: &Path, format: &str) {
        self.source = Some(DatasetSource {
            path: path.to_path_buf(),
            format: format.to_string(),
        });
        self.tracker.clear();
    }

    fn is_bound_to(&self, target: &Path, format: &str) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        if source.format != format {
            return false;
        }
        match (fs::canonicalize(&source.path), fs::canonicalize(target)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Chunked view over the items of one subset.
pub struct ItemCursor<'a> {
    range: std::collections::btree_map::Range<'a, ItemKey, DatasetItem>,
    subset: &'a str,
    chunk_size: usize,
    done: bool,
}

impl<'a> Iterator for ItemCursor<'a> {
    type Item = Vec<&'a DatasetItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.range.next() {
                Some((key, item)) if key.subset == self.subset => chunk.push(item),
                _ => {
                    self.done = true;
                    break;
                }
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}
