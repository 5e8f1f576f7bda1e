//! On-disk layout and version marker of the native format.
//!
//! ```text
//! <root>/
//! ├── annotations/
//! │   ├── train.json
//! │   └── test.json
//! ├── images/
//! │   ├── train/<item id><ext>
//! │   └── test/<item id><ext>
//! ├── videos/<subset>/<source file name>
//! └── point_clouds/<subset>/<item id><ext>
//! ```

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::dataset::{extension_with_dot, DatasetItem, Media, MediaKind};

pub const FORMAT_NAME: &str = "labelvault";
pub const ANNOTATIONS_DIR: &str = "annotations";
pub const ANNOTATION_EXT: &str = "json";

/// Version written into every annotation container.
pub const FORMAT_VERSION: FormatVersion = FormatVersion { major: 1, minor: 0 };

/// A `major.minor` container version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        let (major, minor) = raw.trim().split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    /// Readable by this build: same major, minor not newer than ours.
    pub fn is_compatible(&self) -> bool {
        self.major == FORMAT_VERSION.major && self.minor <= FORMAT_VERSION.minor
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Path helper for one store root.
#[derive(Clone, Debug)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.root.join(ANNOTATIONS_DIR)
    }

    pub fn container_path(&self, subset: &str) -> PathBuf {
        self.annotations_dir()
            .join(format!("{subset}.{ANNOTATION_EXT}"))
    }

    pub fn media_dir(&self, kind: MediaKind, subset: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(subset)
    }

    /// Where `media` of `item` is saved. Video frames share their source file.
    pub fn media_path(&self, item: &DatasetItem, media: &Media) -> PathBuf {
        let dir = self.media_dir(media.kind, &item.subset);
        match (media.kind, media.path.file_name()) {
            (MediaKind::Video, Some(file_name)) => dir.join(file_name),
            _ => dir.join(format!("{}{}", item.id, extension_with_dot(&media.path))),
        }
    }

    /// `path` relative to the root with `/` separators, if it lies inside.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    /// Resolves a stored media path; relative paths are anchored at the root.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
