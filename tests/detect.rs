use std::path::Path;

use labelvault::detect::{
    Confidence, DetectOptions, ProbeContext, Recognition, Rejection, RejectionReason,
};
use labelvault::env::Environment;
use labelvault::format::FormatPlugin;
use labelvault::LabelvaultError;

mod common;

type RecognizeResult = Result<Recognition, LabelvaultError>;

fn marker_plugin(name: &str, marker: &'static str, confidence: Confidence) -> FormatPlugin {
    FormatPlugin::new(name, move |probe: &ProbeContext| -> RecognizeResult {
        Ok(match probe.require_file(marker) {
            Ok(_) => Recognition::Match(confidence),
            Err(rejection) => rejection.into(),
        })
    })
}

fn env_with(plugins: Vec<FormatPlugin>) -> Environment {
    let mut env = Environment::new();
    for plugin in plugins {
        env.register(plugin).expect("register plugin");
    }
    env
}

fn detect(env: &Environment, root: &Path, depth: usize) -> labelvault::detect::DetectionReport {
    let options = DetectOptions {
        depth,
        ..Default::default()
    };
    env.detect(root, &options).expect("detect")
}

#[test]
fn unique_top_match_is_never_rejected() {
    let temp = tempfile::tempdir().unwrap();
    common::write_file(&temp.path().join("marker.txt"), "x");

    let env = env_with(vec![
        marker_plugin("strict", "marker.txt", Confidence::Exact),
        marker_plugin("loose", "marker.txt", Confidence::Low),
        marker_plugin("other", "other.txt", Confidence::Exact),
    ]);
    let report = detect(&env, temp.path(), 0);

    assert_eq!(report.detected_formats, vec!["strict"]);
    assert!(!report.rejected_formats.contains_key("strict"));
    assert_eq!(
        report.rejected_formats["other"].reason,
        RejectionReason::UnmetRequirements
    );
    assert_eq!(report.to_string(), "Detected format: strict\n");
}

#[test]
fn ties_are_listed_in_registration_order() {
    let temp = tempfile::tempdir().unwrap();
    common::write_file(&temp.path().join("marker.txt"), "x");

    let env = env_with(vec![
        marker_plugin("zeta", "marker.txt", Confidence::Medium),
        marker_plugin("alpha", "marker.txt", Confidence::Medium),
    ]);
    let report = detect(&env, temp.path(), 0);

    assert!(report.is_ambiguous());
    assert_eq!(report.detected_formats, vec!["zeta", "alpha"]);
    assert_eq!(
        report.to_string(),
        "Ambiguous dataset; detected the following formats:\n\n- zeta\n- alpha\n"
    );

    let err = report.into_single(temp.path()).unwrap_err();
    assert!(matches!(err, LabelvaultError::DetectionAmbiguous { .. }));
}

#[test]
fn depth_bound_controls_marker_search() {
    let temp = tempfile::tempdir().unwrap();
    common::write_file(&temp.path().join("a/b/c/annotations/pairs.txt"), "1 2\n");

    let env = env_with(vec![marker_plugin(
        "pairs",
        "annotations/pairs.txt",
        Confidence::Exact,
    )]);

    let found = detect(&env, temp.path(), 3);
    assert_eq!(found.detected_formats, vec!["pairs"]);

    let missed = detect(&env, temp.path(), 2);
    assert!(missed.is_empty());
    let rejection = &missed.rejected_formats["pairs"];
    assert_eq!(rejection.reason, RejectionReason::UnmetRequirements);
    assert!(rejection.message.contains("annotations/pairs.txt"));
    assert_eq!(missed.to_string(), "Unknown dataset format\n");
}

#[test]
fn failing_and_panicking_recognizers_do_not_abort_the_sweep() {
    let temp = tempfile::tempdir().unwrap();
    common::write_file(&temp.path().join("marker.txt"), "x");

    let env = env_with(vec![
        FormatPlugin::new("broken", |_: &ProbeContext| -> RecognizeResult {
            Err(LabelvaultError::Io(std::io::Error::other("disk on fire")))
        }),
        FormatPlugin::new("panicky", |_: &ProbeContext| -> RecognizeResult {
            panic!("recognizer bug")
        }),
        marker_plugin("good", "marker.txt", Confidence::Medium),
    ]);
    let report = detect(&env, temp.path(), 0);

    assert_eq!(report.detected_formats, vec!["good"]);
    for name in ["broken", "panicky"] {
        assert_eq!(
            report.rejected_formats[name].reason,
            RejectionReason::InternalError,
            "{name}"
        );
    }
    assert!(report.rejected_formats["panicky"].message.contains("recognizer bug"));
}

#[test]
fn unsupported_version_rejections_are_reported() {
    let temp = tempfile::tempdir().unwrap();
    let env = env_with(vec![FormatPlugin::new(
        "versioned",
        |_: &ProbeContext| -> RecognizeResult {
            Ok(Rejection::unsupported_version("declares version 9.0").into())
        },
    )]);
    let report = detect(&env, temp.path(), 0);
    assert_eq!(
        report.rejected_formats["versioned"].reason,
        RejectionReason::UnsupportedVersion
    );
}

#[test]
fn empty_registry_is_a_configuration_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = Environment::new()
        .detect(temp.path(), &DetectOptions::default())
        .unwrap_err();
    assert!(matches!(err, LabelvaultError::EmptyRegistry));
}

#[test]
fn json_report_shape() {
    let temp = tempfile::tempdir().unwrap();
    common::write_file(&temp.path().join("marker.txt"), "x");
    let env = env_with(vec![
        marker_plugin("yes", "marker.txt", Confidence::Exact),
        marker_plugin("no", "missing.txt", Confidence::Exact),
    ]);

    let value = serde_json::to_value(detect(&env, temp.path(), 0)).unwrap();
    assert_eq!(value["detected_formats"], serde_json::json!(["yes"]));
    assert_eq!(value["rejected_formats"]["no"]["reason"], "unmet_requirements");
    assert!(value["rejected_formats"]["no"]["message"]
        .as_str()
        .unwrap()
        .contains("missing.txt"));
}

#[test]
fn builtin_formats_prefer_the_exact_native_match() {
    let temp = tempfile::tempdir().unwrap();
    let store = temp.path().join("store");

    let mut dataset = labelvault::dataset::Dataset::from_items([
        labelvault::dataset::DatasetItem::new("1").in_subset("train"),
    ]);
    let env = Environment::with_builtin_formats();
    dataset
        .export(&env, &store, "labelvault", &Default::default())
        .unwrap();
    // An image next to the store makes the fallback match too.
    common::write_bmp(&store.join("images/train/1.bmp"), 2, 2);

    let options = DetectOptions {
        depth: 2,
        report_all_rejections: true,
    };
    let report = env.detect(&store, &options).unwrap();
    assert_eq!(report.detected_formats, vec!["labelvault"]);
    assert_eq!(
        report.rejected_formats["image_dir"].reason,
        RejectionReason::InsufficientConfidence
    );
    assert_eq!(
        report.rejected_formats["coco"].reason,
        RejectionReason::UnmetRequirements
    );
}
