//! Depth-bounded filesystem view handed to recognizers.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use walkdir::WalkDir;

use super::confidence::Rejection;

/// The part of a directory tree a recognizer may look at.
///
/// Candidate roots are `root` itself plus every directory at most `depth`
/// levels below it. A marker file counts as found when it exists relative to
/// one of the candidate roots.
#[derive(Debug)]
pub struct ProbeContext {
    root: PathBuf,
    depth: usize,
    candidates: OnceLock<Vec<PathBuf>>,
}

impl ProbeContext {
    pub fn new(root: impl Into<PathBuf>, depth: usize) -> Self {
        Self {
            root: root.into(),
            depth,
            candidates: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `root` followed by its subdirectories within the depth bound, sorted.
    pub fn candidate_roots(&self) -> &[PathBuf] {
        self.candidates.get_or_init(|| {
            WalkDir::new(&self.root)
                .max_depth(self.depth)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_dir())
                .map(|entry| entry.into_path())
                .collect()
        })
    }

    /// Finds the first candidate root that has `rel_path` as a file.
    pub fn require_file(&self, rel_path: &str) -> Result<PathBuf, Rejection> {
        self.candidate_roots()
            .iter()
            .map(|candidate| candidate.join(rel_path))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Rejection::unmet(format!(
                    "required file '{}' not found {}",
                    rel_path,
                    self.scope()
                ))
            })
    }

    /// Finds the first candidate root accepted by `predicate`.
    pub fn require_dir<F>(&self, description: &str, predicate: F) -> Result<PathBuf, Rejection>
    where
        F: Fn(&Path) -> bool,
    {
        self.candidate_roots()
            .iter()
            .find(|candidate| predicate(candidate))
            .cloned()
            .ok_or_else(|| {
                Rejection::unmet(format!("expected {} {}", description, self.scope()))
            })
    }

    /// Finds `<candidate>/<subdir>/*.<extension>` files in the first
    /// candidate root that has any. Returns the candidate and the files.
    pub fn require_files_with_extension(
        &self,
        subdir: &str,
        extension: &str,
    ) -> Result<(PathBuf, Vec<PathBuf>), Rejection> {
        for candidate in self.candidate_roots() {
            let dir = candidate.join(subdir);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };

            let mut files: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && has_extension(path, &[extension]))
                .collect();
            if !files.is_empty() {
                files.sort();
                return Ok((candidate.clone(), files));
            }
        }

        Err(Rejection::unmet(format!(
            "expected '{}/*.{}' annotation files {}",
            subdir,
            extension,
            self.scope()
        )))
    }

    /// All files inside candidate roots whose extension is one of `extensions`.
    pub fn find_files_with_extensions(&self, extensions: &[&str]) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .max_depth(self.depth + 1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), extensions))
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Reads at most `limit` bytes from the start of `path`.
    pub fn read_prefix(&self, path: &Path, limit: usize) -> io::Result<String> {
        let mut buffer = Vec::with_capacity(limit.min(64 * 1024));
        File::open(path)?
            .take(limit as u64)
            .read_to_end(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn scope(&self) -> String {
        format!(
            "within {} level(s) of '{}'",
            self.depth,
            self.root.display()
        )
    }
}

pub(crate) fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}
