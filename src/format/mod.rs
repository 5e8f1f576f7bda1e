//! Format plugin contracts.
//!
//! Every dataset format is described by up to three pieces:
//!
//! - a [`Recognizer`] that inspects a directory tree and either matches with
//!   a [`Confidence`](crate::detect::Confidence) or rejects with a reason,
//! - an optional [`Importer`] that reads the tree into a [`Dataset`],
//! - an optional [`Exporter`] that writes a [`Dataset`] out again.
//!
//! New formats are added by implementing these traits and registering a
//! [`FormatPlugin`] with an [`Environment`](crate::env::Environment).

pub mod coco;
pub mod image_dir;
mod media;
pub mod native;
pub mod yolo;

pub(crate) use media::MediaWriter;

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use crate::dataset::{Dataset, ItemKey};
use crate::detect::{ProbeContext, Recognition};
use crate::error::LabelvaultError;

/// Decides whether a directory tree is in a given format.
///
/// Implementations must not modify the tree, must stay within the probe's
/// depth bound, and must reject (not fail) when the tree simply is not in
/// their format.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, probe: &ProbeContext) -> Result<Recognition, LabelvaultError>;
}

impl<F> Recognizer for F
where
    F: Fn(&ProbeContext) -> Result<Recognition, LabelvaultError> + Send + Sync,
{
    fn recognize(&self, probe: &ProbeContext) -> Result<Recognition, LabelvaultError> {
        self(probe)
    }
}

/// Reads a dataset from disk.
pub trait Importer: Send + Sync {
    fn import(&self, root: &Path, options: &ImportOptions) -> Result<Dataset, LabelvaultError>;
}

/// Writes a dataset to disk.
pub trait Exporter: Send + Sync {
    fn export(
        &self,
        dataset: &Dataset,
        target: &Path,
        options: &ExportOptions,
        plan: &SavePlan,
    ) -> Result<ExportOutcome, LabelvaultError>;

    /// True when the exporter honours [`SavePlan::Patch`].
    fn supports_patch(&self) -> bool {
        false
    }
}

/// What an export has to write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SavePlan {
    /// Write every subset.
    Full,
    /// Rewrite `dirty` subsets and delete the artifacts of `removed` ones,
    /// leaving everything else untouched.
    Patch {
        dirty: Vec<String>,
        removed: Vec<String>,
    },
}

/// Format-specific import options.
#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    pub extra: Map<String, Value>,
}

impl ImportOptions {
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Number of items written per chunk in streaming mode.
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 256;

/// Options shared by all exporters.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Copy referenced media files into the target.
    pub save_media: bool,
    /// Write items chunk by chunk instead of materializing each subset.
    pub stream: bool,
    /// Items per chunk when streaming.
    pub chunk_size: usize,
    pub extra: Map<String, Value>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            save_media: false,
            stream: false,
            chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            extra: Map::new(),
        }
    }
}

impl ExportOptions {
    pub fn with_media(mut self) -> Self {
        self.save_media = true;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Counts of filesystem changes made by one export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub containers_written: usize,
    pub containers_deleted: usize,
    pub media_copied: usize,
    pub media_linked: usize,
    pub media_deleted: usize,
}

impl ExportStats {
    /// True when the export did not touch the filesystem.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of an export: statistics plus new locations of saved media.
#[derive(Clone, Debug, Default)]
pub struct ExportOutcome {
    pub stats: ExportStats,
    pub relocated: Vec<(ItemKey, PathBuf)>,
}

/// A registered format.
pub struct FormatPlugin {
    name: String,
    recognizer: Box<dyn Recognizer>,
    importer: Option<Box<dyn Importer>>,
    exporter: Option<Box<dyn Exporter>>,
}

impl FormatPlugin {
    pub fn new(name: impl Into<String>, recognizer: impl Recognizer + 'static) -> Self {
        Self {
            name: name.into(),
            recognizer: Box::new(recognizer),
            importer: None,
            exporter: None,
        }
    }

    pub fn with_importer(mut self, importer: impl Importer + 'static) -> Self {
        self.importer = Some(Box::new(importer));
        self
    }

    pub fn with_exporter(mut self, exporter: impl Exporter + 'static) -> Self {
        self.exporter = Some(Box::new(exporter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recognizer(&self) -> &dyn Recognizer {
        self.recognizer.as_ref()
    }

    pub fn importer(&self) -> Option<&dyn Importer> {
        self.importer.as_deref()
    }

    pub fn exporter(&self) -> Option<&dyn Exporter> {
        self.exporter.as_deref()
    }
}

impl std::fmt::Debug for FormatPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatPlugin")
            .field("name", &self.name)
            .field("importer", &self.importer.is_some())
            .field("exporter", &self.exporter.is_some())
            .finish()
    }
}

/// Rejects subset names that would create nested directories.
pub fn validate_subset_name(subset: &str) -> Result<(), LabelvaultError> {
    if contains_path_separator(subset) {
        return Err(LabelvaultError::PathSeparatorInSubsetName {
            subset: subset.to_string(),
        });
    }
    Ok(())
}

/// Rejects item ids that are empty or would escape their media directory
/// once used as a file name: `..` segments, absolute paths, drive prefixes.
pub fn validate_item_id(id: &str) -> Result<(), LabelvaultError> {
    let normalized = id.replace('\\', "/");
    let escapes = id.is_empty()
        || normalized.starts_with('/')
        || normalized.split('/').any(|part| part == "..")
        || Path::new(id)
            .components()
            .any(|component| matches!(component, Component::Prefix(_)));
    if escapes {
        return Err(LabelvaultError::UnsafeItemId { id: id.to_string() });
    }
    Ok(())
}

pub(crate) fn contains_path_separator(name: &str) -> bool {
    name.contains('/') || name.contains('\\') || name.contains(std::path::MAIN_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_names_with_separators_are_rejected() {
        assert!(validate_subset_name("train").is_ok());
        let err = validate_subset_name("a/b").unwrap_err();
        assert!(err.is_path_separator_error());
        assert!(validate_subset_name("a\\b").is_err());
    }

    #[test]
    fn item_ids_must_stay_inside_their_directory() {
        assert!(validate_item_id("frame_001").is_ok());
        assert!(validate_item_id("nested/frame_001").is_ok());
        for id in ["", "../escaped", "a/../../b", "/etc/passwd", "..\\evil"] {
            let err = validate_item_id(id).unwrap_err();
            assert!(matches!(err, LabelvaultError::UnsafeItemId { .. }), "{id}");
        }
    }

    #[test]
    fn export_stats_noop() {
        assert!(ExportStats::default().is_noop());
        let stats = ExportStats {
            containers_written: 1,
            ..Default::default()
        };
        assert!(!stats.is_noop());
    }
}
