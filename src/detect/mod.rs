//! Dataset format detection.
//!
//! Every registered recognizer is run over the same root, the results are
//! collected, and only then ranked: the formats sharing the highest
//! confidence are reported as detected, in registration order. Ties are
//! never broken silently; the report is ambiguous instead.
//!
//! Detection problems are aggregated into the report. A recognizer that
//! fails or panics is recorded as an `internal_error` rejection and the
//! sweep goes on.

mod confidence;
mod probe;
mod report;

pub use confidence::{Confidence, Recognition, Rejection, RejectionReason};
pub use probe::ProbeContext;
pub use report::{DetectionReport, RejectionsDisplay};

pub(crate) use probe::has_extension;

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::env::Environment;
use crate::error::LabelvaultError;
use crate::format::FormatPlugin;

/// How many directory levels below the root recognizers may search by default.
pub const DEFAULT_DETECT_DEPTH: usize = 2;

/// Detection options.
#[derive(Clone, Debug)]
pub struct DetectOptions {
    /// Maximum directory depth below the root searched for markers.
    pub depth: usize,
    /// Report every non-winning format, including weaker matches.
    pub report_all_rejections: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DETECT_DEPTH,
            report_all_rejections: false,
        }
    }
}

/// Runs every recognizer registered in `env` over `root`.
///
/// # Errors
/// Fails only on configuration problems: an empty registry or a root that
/// is not a directory. Everything else ends up in the report.
pub fn detect_formats(
    env: &Environment,
    root: &Path,
    options: &DetectOptions,
) -> Result<DetectionReport, LabelvaultError> {
    if env.is_empty() {
        return Err(LabelvaultError::EmptyRegistry);
    }
    if !root.is_dir() {
        return Err(LabelvaultError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("'{}' is not a directory", root.display()),
        )));
    }

    let probe = ProbeContext::new(root, options.depth);

    // par_iter preserves input order in the collected vector.
    let outcomes: Vec<(String, Recognition)> = env
        .plugins()
        .par_iter()
        .map(|plugin| (plugin.name().to_string(), run_recognizer(plugin, &probe)))
        .collect();

    for (name, outcome) in &outcomes {
        debug!(format = %name, ?outcome, "recognizer finished");
    }

    Ok(rank(outcomes, options.report_all_rejections))
}

fn run_recognizer(plugin: &FormatPlugin, probe: &ProbeContext) -> Recognition {
    let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.recognizer().recognize(probe)));
    match result {
        Ok(Ok(recognition)) => recognition,
        Ok(Err(err)) => {
            warn!(format = plugin.name(), error = %err, "recognizer failed");
            Recognition::Reject(Rejection::internal(format!("recognizer failed: {err}")))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(format = plugin.name(), %message, "recognizer panicked");
            Recognition::Reject(Rejection::internal(format!(
                "recognizer panicked: {message}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Ranks recognizer outcomes given in registration order.
pub(crate) fn rank(outcomes: Vec<(String, Recognition)>, report_all: bool) -> DetectionReport {
    let best = outcomes
        .iter()
        .filter_map(|(_, outcome)| match outcome {
            Recognition::Match(confidence) => Some(*confidence),
            Recognition::Reject(_) => None,
        })
        .max();

    let mut report = DetectionReport {
        confidence: best,
        ..Default::default()
    };

    for (name, outcome) in outcomes {
        match outcome {
            Recognition::Match(confidence) if Some(confidence) == best => {
                report.detected_formats.push(name);
            }
            Recognition::Match(confidence) => {
                if report_all {
                    let winner = best.unwrap_or(confidence);
                    report.rejected_formats.insert(
                        name,
                        Rejection::new(
                            RejectionReason::InsufficientConfidence,
                            format!(
                                "matched with {} confidence, but other formats matched with {} confidence",
                                confidence, winner
                            ),
                        ),
                    );
                }
            }
            Recognition::Reject(rejection) => {
                report.rejected_formats.insert(name, rejection);
            }
        }
    }

    report
}
