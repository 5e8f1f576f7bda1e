//! Annotation container codec.
//!
//! A container is one JSON object per subset. The version marker is always
//! the first key so recognizers can sniff it from a short prefix:
//!
//! ```text
//! {"format_version":"1.0","subset":"train","media_type":"image","infos":{},"categories":{"labels":[]},"items":[
//! {"id":"1","media":{"kind":"image","path":"images/train/1.jpg"}},
//! {"id":"2"}
//! ]}
//! ```
//!
//! Items are written one at a time through [`ContainerWriter`], whether the
//! caller streams them or has them all in memory, so both paths produce the
//! same bytes.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::layout::{FormatVersion, FORMAT_VERSION};
use crate::dataset::{Annotation, Categories, DatasetItem, Media, MediaKind};
use crate::error::ImportError;

const VERSION_KEY_PREFIX: &str = "\"format_version\"";

/// Per-container metadata written before the items.
#[derive(Debug)]
pub(crate) struct ContainerHeader<'a> {
    pub subset: &'a str,
    pub media_type: MediaKind,
    pub infos: &'a BTreeMap<String, Value>,
    pub categories: &'a Categories,
}

/// Serialized form of one item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRecord>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct MediaRecord {
    pub kind: MediaKind,
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
}

impl ItemRecord {
    pub fn new(item: &DatasetItem, media: Option<MediaRecord>) -> Self {
        Self {
            id: item.id.clone(),
            media,
            annotations: item.annotations.clone(),
            attributes: item.attributes.clone(),
        }
    }

    pub fn into_item(self, subset: &str, resolve: impl Fn(&str) -> std::path::PathBuf) -> DatasetItem {
        DatasetItem {
            id: self.id,
            subset: subset.to_string(),
            media: self.media.map(|media| Media {
                kind: media.kind,
                path: resolve(&media.path),
                frame: media.frame,
            }),
            annotations: self.annotations,
            attributes: self.attributes,
        }
    }
}

/// Incremental container writer.
pub(crate) struct ContainerWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> ContainerWriter<W> {
    pub fn begin(mut inner: W, header: &ContainerHeader<'_>) -> Result<Self, serde_json::Error> {
        let version = FORMAT_VERSION.to_string();
        write_raw(&mut inner, "{")?;
        write_raw(&mut inner, VERSION_KEY_PREFIX)?;
        write_raw(&mut inner, ":")?;
        serde_json::to_writer(&mut inner, &version)?;
        write_raw(&mut inner, ",\"subset\":")?;
        serde_json::to_writer(&mut inner, header.subset)?;
        write_raw(&mut inner, ",\"media_type\":")?;
        serde_json::to_writer(&mut inner, &header.media_type)?;
        write_raw(&mut inner, ",\"infos\":")?;
        serde_json::to_writer(&mut inner, header.infos)?;
        write_raw(&mut inner, ",\"categories\":")?;
        serde_json::to_writer(&mut inner, header.categories)?;
        write_raw(&mut inner, ",\"items\":[")?;
        Ok(Self { inner, written: 0 })
    }

    pub fn write_item(&mut self, record: &ItemRecord) -> Result<(), serde_json::Error> {
        if self.written > 0 {
            write_raw(&mut self.inner, ",")?;
        }
        write_raw(&mut self.inner, "\n")?;
        serde_json::to_writer(&mut self.inner, record)?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, serde_json::Error> {
        write_raw(&mut self.inner, "\n]}\n")?;
        Ok(self.inner)
    }
}

fn write_raw<W: Write>(writer: &mut W, raw: &str) -> Result<(), serde_json::Error> {
    writer
        .write_all(raw.as_bytes())
        .map_err(serde_json::Error::io)
}

/// A parsed container.
#[derive(Debug, Deserialize)]
pub(crate) struct ContainerFile {
    #[serde(default)]
    pub subset: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    #[serde(default)]
    pub infos: BTreeMap<String, Value>,
    #[serde(default)]
    pub categories: Categories,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
    #[serde(default)]
    format_version: Option<String>,
}

/// Reads a container, checking its version before interpreting the rest.
pub(crate) fn read_container(path: &Path) -> Result<ContainerFile, ImportError> {
    let text = fs::read_to_string(path)?;
    parse_container(path, &text)
}

/// Parses container text; `path` only labels errors.
pub(crate) fn parse_container(path: &Path, text: &str) -> Result<ContainerFile, ImportError> {
    let probe: VersionProbe =
        serde_json::from_str(&text).map_err(|source| ImportError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    check_version(path, probe.format_version.as_deref())?;

    serde_json::from_str(text).map_err(|source| ImportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn check_version(path: &Path, found: Option<&str>) -> Result<(), ImportError> {
    match found.and_then(FormatVersion::parse) {
        Some(version) if version.is_compatible() => Ok(()),
        _ => Err(ImportError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: found.unwrap_or("<missing>").to_string(),
            supported: FORMAT_VERSION.to_string(),
        }),
    }
}

/// Extracts the version marker from the start of a container, if present.
pub(crate) fn sniff_version(prefix: &str) -> Option<String> {
    let rest = prefix.trim_start().strip_prefix('{')?.trim_start();
    let rest = rest.strip_prefix(VERSION_KEY_PREFIX)?.trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
