//! The native interchange format.
//!
//! One JSON annotation container per subset plus optional media trees. This
//! is the only bundled format with in-place (patch) saving: when a dataset
//! is saved back to the store it was loaded from, only dirty subsets are
//! rewritten and emptied subsets are deleted.

mod container;
mod layout;

pub use layout::{FormatVersion, StoreLayout, ANNOTATIONS_DIR, ANNOTATION_EXT, FORMAT_NAME, FORMAT_VERSION};

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use container::{read_container, sniff_version, ContainerHeader, ContainerWriter, ItemRecord, MediaRecord};

use super::{
    contains_path_separator, validate_item_id, validate_subset_name, ExportOptions,
    ExportOutcome, Exporter, FormatPlugin, ImportOptions, Importer, MediaWriter, SavePlan,
};
use crate::dataset::{Dataset, DatasetItem, MediaKind};
use crate::detect::{Confidence, ProbeContext, Recognition, Rejection};
use crate::error::{ImportError, LabelvaultError};

/// Bytes read from a container when sniffing its version marker.
const SNIFF_LIMIT: usize = 256;

/// Builds the plugin for the native format.
pub fn plugin() -> FormatPlugin {
    FormatPlugin::new(FORMAT_NAME, NativeRecognizer)
        .with_importer(NativeImporter)
        .with_exporter(NativeExporter)
}

/// Fuzz-only entrypoint for container parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_container(data: &[u8]) -> Result<(), ImportError> {
    let text = std::str::from_utf8(data).map_err(|err| ImportError::malformed(err.to_string()))?;
    let _ = sniff_version(text);
    container::parse_container(Path::new("<fuzz>"), text)?;
    Ok(())
}

/// Matches stores whose annotation containers carry a version marker.
#[derive(Debug, Clone, Copy)]
pub struct NativeRecognizer;

impl super::Recognizer for NativeRecognizer {
    fn recognize(&self, probe: &ProbeContext) -> Result<Recognition, LabelvaultError> {
        let (candidate, files) =
            match probe.require_files_with_extension(ANNOTATIONS_DIR, ANNOTATION_EXT) {
                Ok(found) => found,
                Err(rejection) => return Ok(rejection.into()),
            };

        let mut unsupported: Option<String> = None;
        for file in &files {
            let prefix = probe.read_prefix(file, SNIFF_LIMIT)?;
            let Some(found) = sniff_version(&prefix) else {
                continue;
            };

            match FormatVersion::parse(&found) {
                Some(version) if version.is_compatible() => {
                    return Ok(Recognition::Match(Confidence::Exact));
                }
                _ => unsupported = Some(found),
            }
        }

        let rejection = match unsupported {
            Some(found) => Rejection::unsupported_version(format!(
                "annotation containers declare format version '{}', supported version is {}",
                found, FORMAT_VERSION
            )),
            None => Rejection::unmet(format!(
                "no '{}/*.{}' file in '{}' starts with a \"format_version\" marker",
                ANNOTATIONS_DIR,
                ANNOTATION_EXT,
                candidate.display()
            )),
        };
        Ok(rejection.into())
    }
}

/// Reads a native store.
#[derive(Debug, Clone, Copy)]
pub struct NativeImporter;

impl Importer for NativeImporter {
    fn import(&self, root: &Path, _options: &ImportOptions) -> Result<Dataset, LabelvaultError> {
        let layout = StoreLayout::new(root);
        let annotations_dir = layout.annotations_dir();
        if !annotations_dir.is_dir() {
            return Err(LabelvaultError::import(
                root,
                ImportError::malformed(format!(
                    "missing '{}' directory",
                    annotations_dir.display()
                )),
            ));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&annotations_dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ANNOTATION_EXT)
            })
            .collect();
        files.sort();

        let mut items: Vec<DatasetItem> = Vec::new();
        let mut schema = None;

        for file in &files {
            let container = read_container(file).map_err(|err| LabelvaultError::import(root, err))?;
            let stem = file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
            let subset = match container.subset.clone() {
                Some(declared) if declared != stem => {
                    return Err(LabelvaultError::import(
                        root,
                        ImportError::malformed(format!(
                            "container '{}' declares subset '{}'",
                            file.display(),
                            declared
                        )),
                    ));
                }
                _ => stem,
            };
            if contains_path_separator(&subset) {
                return Err(LabelvaultError::import(
                    root,
                    ImportError::PathSeparatorInSubsetName { subset },
                ));
            }

            debug!(subset = %subset, items = container.items.len(), "read annotation container");
            if schema.is_none() {
                schema = Some((
                    container.categories.clone(),
                    container.infos.clone(),
                    container.media_type,
                ));
            }
            items.extend(
                container
                    .items
                    .into_iter()
                    .map(|record| record.into_item(&subset, |stored| layout.resolve(stored))),
            );
        }

        let mut dataset = Dataset::from_items(items);
        if let Some((categories, infos, media_type)) = schema {
            dataset.set_categories(categories);
            dataset.set_infos(infos);
            if let Some(media_type) = media_type {
                dataset.set_media_type(media_type);
            }
        }
        Ok(dataset)
    }
}

/// Writes native stores, in full or as a patch.
#[derive(Debug, Clone, Copy)]
pub struct NativeExporter;

impl Exporter for NativeExporter {
    fn export(
        &self,
        dataset: &Dataset,
        target: &Path,
        options: &ExportOptions,
        plan: &SavePlan,
    ) -> Result<ExportOutcome, LabelvaultError> {
        let subsets: Vec<String> = match plan {
            SavePlan::Full => dataset.subsets(),
            SavePlan::Patch { dirty, .. } => dirty
                .iter()
                .filter(|subset| dataset.subset_len(subset) > 0)
                .cloned()
                .collect(),
        };

        // Nothing may be written before every name is known to be safe.
        for subset in dataset.subsets() {
            validate_subset_name(&subset)?;
        }
        if let SavePlan::Patch { removed, .. } = plan {
            for subset in removed {
                validate_subset_name(subset)?;
            }
        }
        for item in dataset.items() {
            validate_item_id(&item.id)?;
        }

        let mut session = ExportSession {
            dataset,
            layout: StoreLayout::new(target),
            options,
            media: MediaWriter::for_dataset(dataset),
            referenced: HashSet::new(),
            outcome: ExportOutcome::default(),
        };

        fs::create_dir_all(session.layout.annotations_dir())?;
        for subset in &subsets {
            session.write_subset(subset)?;
        }

        match plan {
            SavePlan::Full => {
                for subset in session.stale_subsets()? {
                    session.delete_subset(&subset)?;
                }
            }
            SavePlan::Patch { dirty, removed } => {
                session.collect_untouched_references(&subsets);
                for subset in dirty {
                    session.prune_media(subset, false)?;
                }
                for subset in removed {
                    session.delete_subset(subset)?;
                }
            }
        }

        Ok(session.outcome)
    }

    fn supports_patch(&self) -> bool {
        true
    }
}

struct ExportSession<'a> {
    dataset: &'a Dataset,
    layout: StoreLayout,
    options: &'a ExportOptions,
    media: MediaWriter,
    /// Canonical paths of media files still referenced after this export.
    referenced: HashSet<PathBuf>,
    outcome: ExportOutcome,
}

impl ExportSession<'_> {
    fn write_subset(&mut self, subset: &str) -> Result<(), LabelvaultError> {
        let dataset = self.dataset;
        let header = ContainerHeader {
            subset,
            media_type: dataset.media_type(),
            infos: dataset.infos(),
            categories: dataset.categories(),
        };
        let path = self.layout.container_path(subset);
        let write_err = |source| LabelvaultError::ContainerWrite {
            path: path.clone(),
            source,
        };

        if self.options.stream {
            let file = BufWriter::new(File::create(&path)?);
            let mut writer = ContainerWriter::begin(file, &header).map_err(write_err)?;
            for chunk in dataset.cursor(subset, self.options.chunk_size) {
                for item in chunk {
                    let record = self.record_for(item)?;
                    writer.write_item(&record).map_err(write_err)?;
                }
            }
            writer.finish().map_err(write_err)?.flush()?;
        } else {
            let records = dataset
                .subset_items(subset)
                .map(|item| self.record_for(item))
                .collect::<Result<Vec<_>, _>>()?;
            let mut writer = ContainerWriter::begin(Vec::new(), &header).map_err(write_err)?;
            for record in &records {
                writer.write_item(record).map_err(write_err)?;
            }
            fs::write(&path, writer.finish().map_err(write_err)?)?;
        }

        debug!(subset, path = %path.display(), "wrote annotation container");
        self.outcome.stats.containers_written += 1;
        Ok(())
    }

    fn record_for(&mut self, item: &DatasetItem) -> Result<ItemRecord, LabelvaultError> {
        let Some(media) = &item.media else {
            return Ok(ItemRecord::new(item, None));
        };

        let mut stored = media.path.clone();
        if self.options.save_media {
            let dest = self.layout.media_path(item, media);
            if let Some(saved) = self
                .media
                .save(&media.path, &dest, &mut self.outcome.stats)?
            {
                if saved != media.path {
                    self.outcome.relocated.push((item.key(), saved.clone()));
                }
                stored = saved;
            }
        }
        self.remember(&stored);

        // Out-of-store paths are stored absolute.
        let path = match self.layout.relative(&stored) {
            Some(relative) => relative,
            None => std::path::absolute(&stored)?
                .to_string_lossy()
                .into_owned(),
        };
        Ok(ItemRecord::new(
            item,
            Some(MediaRecord {
                kind: media.kind,
                path,
                frame: media.frame,
            }),
        ))
    }

    fn remember(&mut self, path: &Path) {
        if let Ok(canonical) = fs::canonicalize(path) {
            self.referenced.insert(canonical);
        }
    }

    fn collect_untouched_references(&mut self, written: &[String]) {
        let dataset = self.dataset;
        for item in dataset.items() {
            if written.contains(&item.subset) {
                continue;
            }
            if let Some(media) = &item.media {
                self.remember(&media.path);
            }
        }
    }

    /// Removes files under the subset's media directories that no item
    /// references anymore.
    fn prune_media(&mut self, subset: &str, remove_root: bool) -> Result<(), LabelvaultError> {
        for kind in MediaKind::ALL {
            let dir = self.layout.media_dir(kind, subset);
            if !dir.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&dir).contents_first(true) {
                let entry = entry.map_err(|err| LabelvaultError::Io(err.into()))?;
                let path = entry.path();
                if entry.file_type().is_dir() {
                    if path != dir || remove_root {
                        // Fails while the directory still holds referenced files.
                        let _ = fs::remove_dir(path);
                    }
                    continue;
                }

                let canonical = fs::canonicalize(path)?;
                if !self.referenced.contains(&canonical) {
                    fs::remove_file(path)?;
                    debug!(path = %path.display(), "deleted stale media");
                    self.outcome.stats.media_deleted += 1;
                }
            }
        }
        Ok(())
    }

    /// Subsets of native containers already in the target that the
    /// dataset no longer has. Files without a version marker are left alone.
    fn stale_subsets(&self) -> Result<Vec<String>, LabelvaultError> {
        let current = self.dataset.subsets();
        let mut stale = Vec::new();
        for entry in fs::read_dir(self.layout.annotations_dir())? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ANNOTATION_EXT) {
                continue;
            }
            let Some(subset) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if current.iter().any(|name| name == subset) {
                continue;
            }

            let mut prefix = String::new();
            let _ = File::open(&path)?
                .take(SNIFF_LIMIT as u64)
                .read_to_string(&mut prefix);
            if sniff_version(&prefix).is_some() {
                stale.push(subset.to_string());
            }
        }
        stale.sort();
        Ok(stale)
    }

    fn delete_subset(&mut self, subset: &str) -> Result<(), LabelvaultError> {
        if self.dataset.subset_len(subset) > 0 {
            return Ok(());
        }

        let container = self.layout.container_path(subset);
        if container.is_file() {
            fs::remove_file(&container)?;
            debug!(subset, path = %container.display(), "deleted annotation container");
            self.outcome.stats.containers_deleted += 1;
        }
        self.prune_media(subset, true)
    }
}
