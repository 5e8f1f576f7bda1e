//! COCO instances reader.
//!
//! Reads `annotations/<prefix>_<subset>.json` files such as
//! `instances_train.json`. Each image becomes an item in the subset named by
//! the file; boxes become [`Shape::Bbox`] annotations and polygon
//! segmentations become [`Shape::Polygon`] annotations grouped with their box.
//!
//! # COCO box convention
//!
//! Boxes are `[x, y, width, height]` with `(x, y)` the top-left corner in
//! absolute pixels, which is also how [`Shape::Bbox`] stores them.
//!
//! [`Shape::Bbox`]: crate::dataset::Shape::Bbox
//! [`Shape::Polygon`]: crate::dataset::Shape::Polygon

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{FormatPlugin, ImportOptions, Importer, Recognizer};
use crate::dataset::{Annotation, Categories, Dataset, DatasetItem, Media, MediaKind};
use crate::detect::{has_extension, Confidence, ProbeContext, Recognition, Rejection};
use crate::error::{ImportError, LabelvaultError};

pub const FORMAT_NAME: &str = "coco";

const ANNOTATIONS_DIR: &str = "annotations";
const IMAGES_DIR: &str = "images";

/// File name prefixes of the COCO task files, longest first.
const TASK_PREFIXES: &[&str] = &[
    "person_keypoints_",
    "image_info_",
    "instances_",
    "panoptic_",
    "captions_",
    "labels_",
    "stuff_",
];

pub fn plugin() -> FormatPlugin {
    FormatPlugin::new(FORMAT_NAME, CocoRecognizer).with_importer(CocoImporter)
}

// ============================================================================
// COCO schema types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CocoDataset {
    #[serde(default)]
    info: Option<Value>,

    images: Vec<CocoImage>,

    #[serde(default)]
    annotations: Vec<CocoAnnotation>,

    #[serde(default)]
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Deserialize)]
struct CocoImage {
    id: u64,
    file_name: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,
    #[serde(default)]
    supercategory: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotation {
    id: u64,
    image_id: u64,
    #[serde(default)]
    category_id: Option<u64>,
    #[serde(default)]
    bbox: Option<[f64; 4]>,
    #[serde(default)]
    iscrowd: Option<u8>,
    #[serde(default)]
    segmentation: Value,
    #[serde(default)]
    score: Option<f64>,
}

/// Just enough structure to tell a COCO file from other JSON.
#[derive(Debug, Deserialize)]
struct CocoShape {
    #[allow(dead_code)]
    images: IgnoredAny,
    #[allow(dead_code)]
    annotations: IgnoredAny,
}

// ============================================================================
// Recognizer
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct CocoRecognizer;

impl Recognizer for CocoRecognizer {
    fn recognize(&self, probe: &ProbeContext) -> Result<Recognition, LabelvaultError> {
        let (candidate, files) = match probe.require_files_with_extension(ANNOTATIONS_DIR, "json")
        {
            Ok(found) => found,
            Err(rejection) => return Ok(rejection.into()),
        };

        for file in &files {
            let reader = BufReader::new(File::open(file)?);
            if serde_json::from_reader::<_, CocoShape>(reader).is_ok() {
                return Ok(Recognition::Match(Confidence::Medium));
            }
        }

        Ok(Rejection::unmet(format!(
            "no file in '{}' has top-level \"images\" and \"annotations\" keys",
            candidate.join(ANNOTATIONS_DIR).display()
        ))
        .into())
    }
}

// ============================================================================
// Importer
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct CocoImporter;

impl Importer for CocoImporter {
    fn import(&self, root: &Path, _options: &ImportOptions) -> Result<Dataset, LabelvaultError> {
        let dir = root.join(ANNOTATIONS_DIR);
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|err| LabelvaultError::import(root, err.into()))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_extension(path, &["json"]))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(LabelvaultError::import(
                root,
                ImportError::malformed(format!("no COCO files in '{}'", dir.display())),
            ));
        }

        let mut categories = Categories::default();
        let mut infos = BTreeMap::new();
        let mut items = Vec::new();

        for file in &files {
            let subset = subset_from_file_name(file);
            let mut coco: CocoDataset = serde_json::from_reader(BufReader::new(File::open(file)?))
                .map_err(|source| {
                    LabelvaultError::import(
                        root,
                        ImportError::Parse {
                            path: file.clone(),
                            source,
                        },
                    )
                })?;
            debug!(subset = %subset, images = coco.images.len(), "read COCO file");

            if let Some(info) = coco.info.take() {
                infos.insert("coco_info".to_string(), info);
            }
            items.extend(coco_to_items(root, &subset, coco, &mut categories));
        }

        Ok(Dataset::from_items(items)
            .with_categories(categories)
            .with_infos(infos)
            .with_media_type(MediaKind::Image))
    }
}

/// `instances_train.json` -> `train`; unknown prefixes keep the whole stem.
fn subset_from_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    TASK_PREFIXES
        .iter()
        .find_map(|prefix| stem.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(stem)
        .to_string()
}

fn coco_to_items(
    root: &Path,
    subset: &str,
    coco: CocoDataset,
    categories: &mut Categories,
) -> Vec<DatasetItem> {
    // Category ids are arbitrary in COCO; map them onto label indices.
    let mut coco_categories = coco.categories;
    coco_categories.sort_by_key(|category| category.id);
    let mut label_of: BTreeMap<u64, usize> = BTreeMap::new();
    for category in &coco_categories {
        let index = categories.find_or_add(&category.name);
        if let Some(parent) = &category.supercategory {
            if categories.labels[index].parent.is_none() && parent != &category.name {
                categories.labels[index].parent = Some(parent.clone());
            }
        }
        label_of.insert(category.id, index);
    }

    let mut items: BTreeMap<u64, DatasetItem> = coco
        .images
        .into_iter()
        .map(|image| {
            let mut item = DatasetItem::new(item_id(&image.file_name))
                .in_subset(subset)
                .with_media(Media::image(image_path(root, subset, &image.file_name)))
                .with_attribute("id", image.id);
            if let (Some(width), Some(height)) = (image.width, image.height) {
                item = item
                    .with_attribute("width", width)
                    .with_attribute("height", height);
            }
            (image.id, item)
        })
        .collect();

    let mut annotations = coco.annotations;
    annotations.sort_by_key(|ann| ann.id);
    for ann in annotations {
        let Some(item) = items.get_mut(&ann.image_id) else {
            debug!(annotation = ann.id, image = ann.image_id, "annotation refers to unknown image");
            continue;
        };
        let label = ann.category_id.and_then(|id| label_of.get(&id).copied());
        let mut extra: Vec<(&str, Value)> = Vec::new();
        if let Some(iscrowd) = ann.iscrowd {
            extra.push(("is_crowd", Value::Bool(iscrowd != 0)));
        }
        if let Some(score) = ann.score {
            extra.push(("score", Value::from(score)));
        }

        if let Some([x, y, w, h]) = ann.bbox {
            let mut bbox = Annotation::bbox(ann.id, label, x, y, w, h).with_group(ann.id);
            for (key, value) in &extra {
                bbox = bbox.with_attribute(*key, value.clone());
            }
            item.annotations.push(bbox);
        }

        for points in polygons(&ann.segmentation) {
            item.annotations
                .push(Annotation::polygon(ann.id, label, points).with_group(ann.id));
        }
    }

    items.into_values().collect()
}

/// Polygon lists of a segmentation; RLE masks are skipped.
fn polygons(segmentation: &Value) -> Vec<Vec<f64>> {
    let Value::Array(parts) = segmentation else {
        return Vec::new();
    };
    parts
        .iter()
        .filter_map(|part| {
            let points: Vec<f64> = part.as_array()?.iter().filter_map(Value::as_f64).collect();
            (points.len() >= 6 && points.len() % 2 == 0).then_some(points)
        })
        .collect()
}

fn item_id(file_name: &str) -> String {
    let normalized = file_name.replace('\\', "/");
    match Path::new(&normalized).extension() {
        Some(ext) => normalized[..normalized.len() - ext.len() - 1].to_string(),
        None => normalized,
    }
}

fn image_path(root: &Path, subset: &str, file_name: &str) -> PathBuf {
    let in_subset = root.join(IMAGES_DIR).join(subset).join(file_name);
    if in_subset.exists() {
        in_subset
    } else {
        root.join(IMAGES_DIR).join(file_name)
    }
}
