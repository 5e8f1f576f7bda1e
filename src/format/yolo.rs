//! YOLO directory reader.
//!
//! Handles both the Ultralytics layout (`data.yaml` + `images/` + `labels/`)
//! and the Darknet layout (`obj.names` + `labels/`). Label rows are
//! `class cx cy w h` in normalized coordinates; they are converted to pixel
//! boxes using the dimensions of the matching image.
//!
//! A first-level directory under `labels/` (`labels/train/...`) names the
//! subset; label files directly under `labels/` go to the default subset.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use super::{FormatPlugin, ImportOptions, Importer, Recognizer};
use crate::dataset::{
    Annotation, Categories, Dataset, DatasetItem, Media, MediaKind, DEFAULT_SUBSET,
};
use crate::detect::{has_extension, Confidence, ProbeContext, Recognition};
use crate::error::{ImportError, LabelvaultError};

pub const FORMAT_NAME: &str = "yolo";

pub(crate) const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "png", "jpeg", "bmp", "webp"];
const LABEL_EXTENSION: &str = "txt";
const LABELS_DIR: &str = "labels";
const IMAGES_DIR: &str = "images";
const DATA_YAML: &str = "data.yaml";
const OBJ_NAMES: &str = "obj.names";

pub fn plugin() -> FormatPlugin {
    FormatPlugin::new(FORMAT_NAME, YoloRecognizer).with_importer(YoloImporter)
}

#[derive(Debug, Clone, Copy)]
pub struct YoloRecognizer;

impl Recognizer for YoloRecognizer {
    fn recognize(&self, probe: &ProbeContext) -> Result<Recognition, LabelvaultError> {
        let found = probe.require_dir(
            "'obj.names' or 'data.yaml' next to a 'labels/' directory",
            |dir| {
                (dir.join(OBJ_NAMES).is_file() || dir.join(DATA_YAML).is_file())
                    && dir.join(LABELS_DIR).is_dir()
            },
        );

        Ok(match found {
            Ok(_) => Recognition::Match(Confidence::Medium),
            Err(rejection) => rejection.into(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct YoloImporter;

impl Importer for YoloImporter {
    fn import(&self, root: &Path, _options: &ImportOptions) -> Result<Dataset, LabelvaultError> {
        read_yolo_dir(root).map_err(|err| LabelvaultError::import(root, err))
    }
}

fn read_yolo_dir(root: &Path) -> Result<Dataset, ImportError> {
    let labels_dir = root.join(LABELS_DIR);
    if !labels_dir.is_dir() {
        return Err(ImportError::malformed(format!(
            "missing '{}' directory",
            labels_dir.display()
        )));
    }
    let images_dir = root.join(IMAGES_DIR);

    let mut label_files = collect_files_with_extensions(&labels_dir, &[LABEL_EXTENSION])?;
    label_files.sort_by_cached_key(|path| rel_string(&labels_dir, path));

    let class_names = read_class_map(root, &label_files)?;
    let categories = Categories::from_names(class_names.iter().cloned());

    let mut items = Vec::with_capacity(label_files.len());
    for label_path in &label_files {
        let label_rel = label_path
            .strip_prefix(&labels_dir)
            .unwrap_or(label_path)
            .with_extension("");
        let (subset, id) = split_subset(&label_rel);

        let image_path = find_image(&images_dir, &label_rel).ok_or_else(|| {
            ImportError::malformed(format!(
                "no image found for label file '{}'",
                label_path.display()
            ))
        })?;
        let (width, height) = read_image_dimensions(&image_path)?;

        let mut item = DatasetItem::new(id)
            .in_subset(subset)
            .with_media(Media::image(image_path));

        let content = fs::read_to_string(label_path)?;
        for (line_idx, line) in content.lines().enumerate() {
            let line_num = line_idx + 1;
            let Some(row) = parse_label_line(line, label_path, line_num)? else {
                continue;
            };
            if row.class_id >= class_names.len() {
                return Err(ImportError::malformed(format!(
                    "{}:{}: class_id {} is out of range for class map with {} class(es)",
                    label_path.display(),
                    line_num,
                    row.class_id,
                    class_names.len()
                )));
            }

            let (x, y, w, h) = row.to_pixels(width as f64, height as f64);
            let id = item.annotations.len() as u64;
            item.annotations
                .push(Annotation::bbox(id, Some(row.class_id), x, y, w, h));
        }
        items.push(item);
    }

    debug!(items = items.len(), classes = class_names.len(), "read YOLO directory");
    Ok(Dataset::from_items(items)
        .with_categories(categories)
        .with_media_type(MediaKind::Image))
}

/// `train/a/b` -> (`train`, `a/b`); `b` -> (`default`, `b`).
fn split_subset(label_rel: &Path) -> (String, String) {
    let parts: Vec<String> = label_rel
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    match parts.as_slice() {
        [subset, rest @ ..] if !rest.is_empty() => (subset.clone(), rest.join("/")),
        _ => (DEFAULT_SUBSET.to_string(), parts.join("/")),
    }
}

// ============================================================================
// Class map
// ============================================================================

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

fn read_class_map(root: &Path, label_files: &[PathBuf]) -> Result<Vec<String>, ImportError> {
    let data_yaml = root.join(DATA_YAML);
    let obj_names = root.join(OBJ_NAMES);
    if data_yaml.is_file() {
        read_data_yaml_names(&data_yaml)
    } else if obj_names.is_file() {
        read_obj_names(&obj_names)
    } else {
        infer_class_names(label_files)
    }
}

fn read_data_yaml_names(path: &Path) -> Result<Vec<String>, ImportError> {
    let data = fs::read_to_string(path)?;
    let parsed: DataYaml = serde_yaml::from_str(&data).map_err(|err| {
        ImportError::malformed(format!("failed to parse {}: {}", path.display(), err))
    })?;

    Ok(match parsed.names {
        DataYamlNames::Sequence(names) => names,
        DataYamlNames::Mapping(mapping) => {
            let len = mapping.keys().next_back().map_or(0, |max| max + 1);
            (0..len)
                .map(|index| match mapping.get(&index) {
                    Some(name) if !name.trim().is_empty() => name.clone(),
                    _ => format!("class_{index}"),
                })
                .collect()
        }
    })
}

fn read_obj_names(path: &Path) -> Result<Vec<String>, ImportError> {
    let data = fs::read_to_string(path)?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn infer_class_names(label_files: &[PathBuf]) -> Result<Vec<String>, ImportError> {
    let mut class_ids = BTreeSet::new();
    for label_path in label_files {
        let content = fs::read_to_string(label_path)?;
        for (line_idx, line) in content.lines().enumerate() {
            if let Some(row) = parse_label_line(line, label_path, line_idx + 1)? {
                class_ids.insert(row.class_id);
            }
        }
    }

    Ok(match class_ids.last() {
        Some(max_id) => (0..=*max_id).map(|id| format!("class_{id}")).collect(),
        None => Vec::new(),
    })
}

// ============================================================================
// Label rows
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct YoloLabelRow {
    class_id: usize,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
}

impl YoloLabelRow {
    /// Top-left corner and size in pixels.
    fn to_pixels(self, width: f64, height: f64) -> (f64, f64, f64, f64) {
        (
            (self.cx - self.w / 2.0) * width,
            (self.cy - self.h / 2.0) * height,
            self.w * width,
            self.h * height,
        )
    }
}

fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<YoloLabelRow>, ImportError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let row_error = |message: String| {
        ImportError::malformed(format!("{}:{}: {}", file_path.display(), line_num, message))
    };

    // At most 6 tokens so pathological lines do not allocate unbounded memory.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();
    if tokens.len() != 5 {
        return Err(row_error(format!(
            "expected 5 tokens (class cx cy w h), found {}",
            if tokens.len() > 5 { "more".to_string() } else { tokens.len().to_string() }
        )));
    }

    let class_id = tokens[0].parse::<usize>().map_err(|_| {
        row_error(format!(
            "invalid class_id '{}'; expected non-negative integer",
            tokens[0]
        ))
    })?;

    let mut values = [0.0; 4];
    for (value, (raw, field)) in values
        .iter_mut()
        .zip(tokens[1..].iter().zip(["x_center", "y_center", "width", "height"]))
    {
        *value = raw.parse::<f64>().map_err(|_| {
            row_error(format!("invalid {field} '{raw}'; expected floating-point number"))
        })?;
    }
    let [cx, cy, w, h] = values;

    Ok(Some(YoloLabelRow {
        class_id,
        cx,
        cy,
        w,
        h,
    }))
}

/// Fuzz-only entrypoint for single-line label parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), ImportError> {
    parse_label_line(input, Path::new("<fuzz>"), 1)?;
    Ok(())
}

// ============================================================================
// Filesystem helpers
// ============================================================================

fn collect_files_with_extensions(
    root: &Path,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, ImportError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|err| {
            ImportError::malformed(format!(
                "failed while traversing '{}': {}",
                root.display(),
                err
            ))
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn find_image(images_dir: &Path, label_stem: &Path) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| {
            let mut name = label_stem.as_os_str().to_owned();
            name.push(".");
            name.push(ext);
            images_dir.join(name)
        })
        .find(|candidate| candidate.is_file())
}

fn read_image_dimensions(path: &Path) -> Result<(u32, u32), ImportError> {
    let size = imagesize::size(path).map_err(|err| {
        ImportError::malformed(format!(
            "failed to read dimensions of '{}': {}",
            path.display(),
            err
        ))
    })?;

    let convert = |value: usize, what: &str| {
        u32::try_from(value).map_err(|_| {
            ImportError::malformed(format!(
                "image {} {} of '{}' does not fit in u32",
                what,
                value,
                path.display()
            ))
        })
    };
    Ok((convert(size.width, "width")?, convert(size.height, "height")?))
}

fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}
