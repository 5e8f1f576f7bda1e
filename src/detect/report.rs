//! Detection report types and text formatting.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::confidence::{Confidence, Rejection};
use crate::error::LabelvaultError;

/// Outcome of running every registered recognizer over one root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DetectionReport {
    /// Formats that reached the highest confidence, in registration order.
    pub detected_formats: Vec<String>,

    /// Formats that did not reach the winning confidence.
    pub rejected_formats: BTreeMap<String, Rejection>,

    /// The winning confidence, if anything matched.
    #[serde(skip)]
    pub confidence: Option<Confidence>,
}

impl DetectionReport {
    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.detected_formats.is_empty()
    }

    /// True when more than one format tied at the top confidence.
    pub fn is_ambiguous(&self) -> bool {
        self.detected_formats.len() > 1
    }

    /// The detected format when exactly one matched.
    pub fn single(&self) -> Option<&str> {
        match self.detected_formats.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Resolves the report to one format name, surfacing ambiguity and
    /// empty results as errors.
    pub fn into_single(self, root: &Path) -> Result<String, LabelvaultError> {
        match self.detected_formats.len() {
            0 => Err(LabelvaultError::DetectionEmpty {
                path: root.to_path_buf(),
            }),
            1 => Ok(self.detected_formats.into_iter().next().unwrap_or_default()),
            _ => Err(LabelvaultError::DetectionAmbiguous {
                path: root.to_path_buf(),
                formats: self.detected_formats,
            }),
        }
    }

    /// Display adapter listing every rejection.
    pub fn rejections(&self) -> RejectionsDisplay<'_> {
        RejectionsDisplay(self)
    }
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detected_formats.as_slice() {
            [] => writeln!(f, "Unknown dataset format"),
            [only] => writeln!(f, "Detected format: {}", only),
            many => {
                writeln!(f, "Ambiguous dataset; detected the following formats:")?;
                writeln!(f)?;
                for name in many {
                    writeln!(f, "- {}", name)?;
                }
                Ok(())
            }
        }
    }
}

/// Text rendering of the rejected formats of a [`DetectionReport`].
pub struct RejectionsDisplay<'a>(&'a DetectionReport);

impl fmt::Display for RejectionsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.rejected_formats.is_empty() {
            return Ok(());
        }

        writeln!(f, "Rejected formats:")?;
        for (name, rejection) in &self.0.rejected_formats {
            writeln!(f, "  {}: {}", name, rejection)?;
        }
        Ok(())
    }
}
