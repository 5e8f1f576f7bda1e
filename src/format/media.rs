//! Media file persistence with copy deduplication.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::ExportStats;
use crate::dataset::Dataset;
use crate::error::LabelvaultError;

/// Copies media files into an export target.
///
/// Each physical source file is copied at most once per export. Further
/// destinations of the same source become hard links to the first copy.
/// A destination belongs to the first source that claims it; a different
/// source asking for it is written to a numbered sibling instead, and so
/// is any source whose destination is another item's media file.
#[derive(Debug, Default)]
pub(crate) struct MediaWriter {
    /// Canonical source -> first destination written for it.
    first_copy: HashMap<PathBuf, PathBuf>,
    /// Destination -> canonical source written there.
    claimed: HashMap<PathBuf, PathBuf>,
    /// Canonical paths that are media of items being exported.
    reserved: HashSet<PathBuf>,
}

impl MediaWriter {
    /// A writer that never overwrites the media of any item of `dataset`.
    pub fn for_dataset(dataset: &Dataset) -> Self {
        let reserved = dataset
            .items()
            .filter_map(|item| item.media.as_ref())
            .filter_map(|media| fs::canonicalize(&media.path).ok())
            .collect();
        Self {
            reserved,
            ..Self::default()
        }
    }

    /// Saves `source` to `dest` or a sibling of it. Returns the path the
    /// file ended up at, or `None` when the source is missing.
    pub fn save(
        &mut self,
        source: &Path,
        dest: &Path,
        stats: &mut ExportStats,
    ) -> Result<Option<PathBuf>, LabelvaultError> {
        if !source.is_file() {
            warn!(source = %source.display(), "media file not found; not saving it");
            return Ok(None);
        }

        let source_key = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let (dest, already_written) = self.free_destination(&source_key, dest);
        if already_written {
            return Ok(Some(dest));
        }
        self.claimed.insert(dest.clone(), source_key.clone());

        if fs::canonicalize(&dest).ok().as_ref() == Some(&source_key) {
            return Ok(Some(dest));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        // The destination may be a hard link shared with another subset.
        if dest.exists() {
            fs::remove_file(&dest)?;
        }

        match self.first_copy.get(&source_key) {
            Some(first) => match fs::hard_link(first, &dest) {
                Ok(()) => {
                    debug!(from = %first.display(), to = %dest.display(), "linked media");
                    stats.media_linked += 1;
                }
                Err(err) => {
                    warn!(to = %dest.display(), error = %err, "hard link failed; copying");
                    fs::copy(source, &dest)?;
                    stats.media_copied += 1;
                }
            },
            None => {
                fs::copy(source, &dest)?;
                debug!(from = %source.display(), to = %dest.display(), "copied media");
                stats.media_copied += 1;
                self.first_copy.insert(source_key, dest.clone());
            }
        }

        Ok(Some(dest))
    }

    /// First of `dest`, `<stem>_1<ext>`, `<stem>_2<ext>`, ... that is free
    /// for `source_key`, and whether it already holds that source.
    fn free_destination(&self, source_key: &Path, dest: &Path) -> (PathBuf, bool) {
        let mut attempt = 0;
        loop {
            let candidate = if attempt == 0 {
                dest.to_path_buf()
            } else {
                numbered_sibling(dest, attempt)
            };
            attempt += 1;

            match self.claimed.get(&candidate) {
                Some(owner) if owner == source_key => return (candidate, true),
                Some(_) => continue,
                None => {}
            }
            if let Ok(existing) = fs::canonicalize(&candidate) {
                if existing != source_key && self.reserved.contains(&existing) {
                    continue;
                }
            }
            return (candidate, false);
        }
    }
}

fn numbered_sibling(dest: &Path, n: usize) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match dest.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    dest.with_file_name(name)
}
