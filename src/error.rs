use std::path::PathBuf;
use thiserror::Error;

/// The main error type for labelvault operations.
#[derive(Debug, Error)]
pub enum LabelvaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to import dataset from {path}: {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: ImportError,
    },

    #[error("Failed to write annotation container {path}: {source}")]
    ContainerWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write detection report to {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Subset name '{subset}' contains a path separator")]
    PathSeparatorInSubsetName { subset: String },

    #[error("Item id '{id}' would place files outside the target directory")]
    UnsafeItemId { id: String },

    #[error("Ambiguous dataset at {path}; detected formats: {}", formats.join(", "))]
    DetectionAmbiguous { path: PathBuf, formats: Vec<String> },

    #[error("Could not detect the format of {path}")]
    DetectionEmpty { path: PathBuf },

    #[error("No dataset formats are registered")]
    EmptyRegistry,

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Format '{0}' is already registered")]
    DuplicateFormat(String),

    #[error("Format '{format}' does not support {operation}")]
    UnsupportedOperation {
        format: String,
        operation: &'static str,
    },

    #[error("Dataset is not bound to a saved location; export it first")]
    NotBound,

    #[error("Unknown transform: {0}")]
    UnknownTransform(String),

    #[error("Invalid transform parameters: {message}")]
    InvalidTransformParams { message: String },
}

impl LabelvaultError {
    /// Wraps an [`ImportError`] with the path being imported.
    pub fn import(path: impl Into<PathBuf>, source: ImportError) -> Self {
        Self::Import {
            path: path.into(),
            source,
        }
    }

    /// Returns the import failure, if this error is one.
    pub fn as_import_error(&self) -> Option<&ImportError> {
        match self {
            Self::Import { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True for both the export-side and import-side subset name violation.
    pub fn is_path_separator_error(&self) -> bool {
        matches!(
            self,
            Self::PathSeparatorInSubsetName { .. }
                | Self::Import {
                    source: ImportError::PathSeparatorInSubsetName { .. },
                    ..
                }
        )
    }
}

/// Reasons a dataset source could not be imported.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("subset name '{subset}' contains a path separator")]
    PathSeparatorInSubsetName { subset: String },

    #[error("unsupported format version '{found}' in {path} (supported: {supported})")]
    UnsupportedVersion {
        path: PathBuf,
        found: String,
        supported: String,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{message}")]
    Malformed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}
