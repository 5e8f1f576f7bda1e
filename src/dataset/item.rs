//! Dataset items and the media they reference.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::annotation::Annotation;

/// Subset used for items that do not name one.
pub const DEFAULT_SUBSET: &str = "default";

/// Identity of an item inside a dataset.
///
/// Ordered by subset first so that all items of a subset form one contiguous
/// range of the dataset's item map.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub subset: String,
    pub id: String,
}

impl ItemKey {
    pub fn new(id: impl Into<String>, subset: impl Into<String>) -> Self {
        Self {
            subset: subset.into(),
            id: id.into(),
        }
    }

    /// Smallest key of `subset`, used as a range start.
    pub(crate) fn subset_start(subset: &str) -> Self {
        Self {
            subset: subset.to_string(),
            id: String::new(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subset, self.id)
    }
}

/// Kind of media file an item references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    PointCloud,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::Video, MediaKind::PointCloud];

    /// Name of the top-level directory this kind of media is saved under.
    pub fn dir_name(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
            MediaKind::PointCloud => "point_clouds",
        }
    }
}

/// A logical reference to a media file.
///
/// The dataset owns the reference; the file itself stays wherever it is on
/// disk until the dataset is exported with media.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub path: PathBuf,

    /// Frame index for items cut from a video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
}

impl Media {
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: MediaKind::Image,
            path: path.into(),
            frame: None,
        }
    }

    pub fn video_frame(path: impl Into<PathBuf>, frame: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            path: path.into(),
            frame: Some(frame),
        }
    }

    pub fn point_cloud(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: MediaKind::PointCloud,
            path: path.into(),
            frame: None,
        }
    }

    /// True when the referenced file is present on disk.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Extension of the referenced file including the leading dot, if any.
    pub fn extension(&self) -> String {
        extension_with_dot(&self.path)
    }
}

pub(crate) fn extension_with_dot(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// A labeled data item.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetItem {
    pub id: String,
    pub subset: String,
    pub media: Option<Media>,
    pub annotations: Vec<Annotation>,
    pub attributes: BTreeMap<String, Value>,
}

impl DatasetItem {
    /// Creates an item in the default subset.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subset: DEFAULT_SUBSET.to_string(),
            media: None,
            annotations: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn in_subset(mut self, subset: impl Into<String>) -> Self {
        self.subset = subset.into();
        self
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.id.clone(), self.subset.clone())
    }
}
