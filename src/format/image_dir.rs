//! Plain image directory.
//!
//! Any tree containing images is a valid (if uninformative) dataset, so this
//! format only ever matches with low confidence and acts as a fallback.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use super::yolo::IMAGE_EXTENSIONS;
use super::{
    validate_item_id, ExportOptions, ExportOutcome, Exporter, FormatPlugin, ImportOptions,
    Importer, MediaWriter, Recognizer, SavePlan,
};
use crate::dataset::{extension_with_dot, Dataset, DatasetItem, Media, MediaKind};
use crate::detect::{has_extension, Confidence, ProbeContext, Recognition, Rejection};
use crate::error::{ImportError, LabelvaultError};

pub const FORMAT_NAME: &str = "image_dir";

pub fn plugin() -> FormatPlugin {
    FormatPlugin::new(FORMAT_NAME, ImageDirRecognizer)
        .with_importer(ImageDirImporter)
        .with_exporter(ImageDirExporter)
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDirRecognizer;

impl Recognizer for ImageDirRecognizer {
    fn recognize(&self, probe: &ProbeContext) -> Result<Recognition, LabelvaultError> {
        if probe.find_files_with_extensions(&IMAGE_EXTENSIONS).is_empty() {
            return Ok(Rejection::unmet(format!(
                "no image files ({}) within {} level(s) of '{}'",
                IMAGE_EXTENSIONS.join(", "),
                probe.depth(),
                probe.root().display()
            ))
            .into());
        }
        Ok(Recognition::Match(Confidence::Low))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDirImporter;

impl Importer for ImageDirImporter {
    fn import(&self, root: &Path, _options: &ImportOptions) -> Result<Dataset, LabelvaultError> {
        let mut items = Vec::new();
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                LabelvaultError::import(
                    root,
                    ImportError::malformed(format!("failed while traversing directory: {err}")),
                )
            })?;
            if !entry.file_type().is_file() || !has_extension(entry.path(), &IMAGE_EXTENSIONS) {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .with_extension("");
            let id = rel.to_string_lossy().replace('\\', "/");
            items.push(DatasetItem::new(id).with_media(Media::image(entry.into_path())));
        }

        debug!(root = %root.display(), images = items.len(), "read image directory");
        Ok(Dataset::from_items(items).with_media_type(MediaKind::Image))
    }
}

/// Copies item images to `<target>/<item id><ext>`. Annotations are dropped.
/// Items of different subsets sharing an id get numbered file names.
#[derive(Debug, Clone, Copy)]
pub struct ImageDirExporter;

impl Exporter for ImageDirExporter {
    fn export(
        &self,
        dataset: &Dataset,
        target: &Path,
        _options: &ExportOptions,
        _plan: &SavePlan,
    ) -> Result<ExportOutcome, LabelvaultError> {
        for item in dataset.items() {
            validate_item_id(&item.id)?;
        }
        std::fs::create_dir_all(target)?;

        let mut outcome = ExportOutcome::default();
        let mut media = MediaWriter::for_dataset(dataset);
        for item in dataset.items() {
            let Some(source) = item.media.as_ref().filter(|m| m.kind == MediaKind::Image) else {
                continue;
            };
            let dest = target.join(format!("{}{}", item.id, extension_with_dot(&source.path)));
            media.save(&source.path, &dest, &mut outcome.stats)?;
        }
        Ok(outcome)
    }
}
