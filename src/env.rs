//! Format registry.

use std::path::Path;

use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::detect::{detect_formats, DetectOptions, DetectionReport};
use crate::error::LabelvaultError;
use crate::format::{self, FormatPlugin, ImportOptions};

/// Registered formats, in registration order.
///
/// Registration order matters: detection lists tied formats in this order.
#[derive(Debug, Default)]
pub struct Environment {
    plugins: Vec<FormatPlugin>,
}

impl Environment {
    /// An environment with no formats.
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with every bundled format registered.
    pub fn with_builtin_formats() -> Self {
        let mut env = Self::new();
        for plugin in [
            format::native::plugin(),
            format::coco::plugin(),
            format::yolo::plugin(),
            format::image_dir::plugin(),
        ] {
            // Bundled names are distinct.
            let _ = env.register(plugin);
        }
        env
    }

    /// Adds a format. Names must be unique.
    pub fn register(&mut self, plugin: FormatPlugin) -> Result<(), LabelvaultError> {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(LabelvaultError::DuplicateFormat(plugin.name().to_string()));
        }
        debug!(format = plugin.name(), "registered format");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&FormatPlugin, LabelvaultError> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .ok_or_else(|| LabelvaultError::UnknownFormat(name.to_string()))
    }

    pub fn plugins(&self) -> &[FormatPlugin] {
        &self.plugins
    }

    pub fn format_names(&self) -> Vec<&str> {
        self.plugins.iter().map(FormatPlugin::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Runs format detection over `root`.
    pub fn detect(
        &self,
        root: &Path,
        options: &DetectOptions,
    ) -> Result<DetectionReport, LabelvaultError> {
        detect_formats(self, root, options)
    }

    /// Imports `path`, detecting its format when `format` is `None`.
    ///
    /// Auto-detection only looks at `path` itself, never below it, and
    /// requires exactly one format to match. The returned dataset is bound to
    /// `path` with no pending changes.
    pub fn import(
        &self,
        path: &Path,
        format: Option<&str>,
        options: &ImportOptions,
    ) -> Result<Dataset, LabelvaultError> {
        let name = match format {
            Some(name) => name.to_string(),
            None => {
                let detect = DetectOptions {
                    depth: 0,
                    ..DetectOptions::default()
                };
                self.detect(path, &detect)?.into_single(path)?
            }
        };

        let plugin = self.get(&name)?;
        let importer = plugin
            .importer()
            .ok_or_else(|| LabelvaultError::UnsupportedOperation {
                format: name.clone(),
                operation: "import",
            })?;

        let mut dataset = importer.import(path, options)?;
        dataset.bind(path, &name);
        info!(format = %name, path = %path.display(), items = dataset.len(), "imported dataset");
        Ok(dataset)
    }
}
