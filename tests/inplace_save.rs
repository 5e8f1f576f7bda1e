use std::fs;

use labelvault::dataset::{Dataset, DatasetItem, SubsetState};
use labelvault::env::Environment;
use labelvault::format::{ExportOptions, ExportStats, ImportOptions};
use labelvault::LabelvaultError;
use serde_json::json;

mod common;

const NATIVE: &str = "labelvault";

#[test]
fn save_without_changes_touches_nothing() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let mut dataset = common::dataset_with_media(temp.path());
    let store = temp.path().join("store");
    let options = ExportOptions::default().with_media();

    dataset.export(&env, &store, NATIVE, &options).unwrap();
    let before = common::list_files(&store);

    let stats = dataset.save(&env, &options).unwrap();
    assert_eq!(stats, ExportStats::default());
    assert!(stats.is_noop());
    assert_eq!(common::list_files(&store), before);
}

#[test]
fn save_rewrites_only_changed_subsets() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let mut dataset = common::abc_dataset();
    dataset
        .export(&env, temp.path(), NATIVE, &ExportOptions::default())
        .unwrap();

    let a_path = common::container(temp.path(), "a");
    let a_before = fs::read(&a_path).unwrap();
    let a_mtime = fs::metadata(&a_path).unwrap().modified().unwrap();
    let b_before = fs::read(common::container(temp.path(), "b")).unwrap();

    dataset.put(DatasetItem::new("extra").in_subset("b"));
    dataset.remove("item2", "c");
    assert_eq!(dataset.subset_state("a"), SubsetState::Clean);
    assert_eq!(dataset.subset_state("b"), SubsetState::Dirty);
    assert_eq!(dataset.subset_state("c"), SubsetState::PendingDelete);

    let stats = dataset.save(&env, &ExportOptions::default()).unwrap();
    assert_eq!(stats.containers_written, 1);
    assert_eq!(stats.containers_deleted, 1);

    assert_eq!(
        common::list_files(&temp.path().join("annotations")),
        vec!["a.json", "b.json"]
    );
    assert_eq!(fs::read(&a_path).unwrap(), a_before);
    assert_eq!(fs::metadata(&a_path).unwrap().modified().unwrap(), a_mtime);
    assert_ne!(fs::read(common::container(temp.path(), "b")).unwrap(), b_before);
    assert!(!dataset.is_modified());

    let restored =
        Dataset::import_from(&env, temp.path(), Some(NATIVE), &ImportOptions::default()).unwrap();
    assert_eq!(restored.subsets(), vec!["a", "b"]);
    assert_eq!(restored.subset_len("b"), 2);
}

#[test]
fn removed_subset_loses_its_media() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let mut dataset = common::dataset_with_media(temp.path());
    let store = temp.path().join("store");
    let options = ExportOptions::default().with_media();
    dataset.export(&env, &store, NATIVE, &options).unwrap();

    dataset.remove("3", "test");
    let stats = dataset.save(&env, &options).unwrap();

    assert_eq!(stats.containers_deleted, 1);
    assert_eq!(stats.media_deleted, 1);
    assert!(!store.join("images/test").exists());
    // The hard-linked twin in another subset survives.
    assert!(store.join("images/train/1.bmp").is_file());
}

#[test]
fn moved_items_keep_their_media_after_the_old_subset_is_deleted() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let mut dataset = common::dataset_with_media(temp.path());
    let store = temp.path().join("store");
    let options = ExportOptions::default().with_media();
    dataset.export(&env, &store, NATIVE, &options).unwrap();

    dataset
        .transform("map_subsets", &json!({"mapping": {"test": "val"}}))
        .unwrap();
    assert_eq!(dataset.subset_state("test"), SubsetState::PendingDelete);
    assert_eq!(dataset.subset_state("val"), SubsetState::Dirty);
    assert_eq!(dataset.subset_state("train"), SubsetState::Clean);

    dataset.save(&env, &options).unwrap();

    assert!(!common::container(&store, "test").exists());
    assert!(store.join("images/val/3.bmp").is_file());
    assert!(!store.join("images/test").exists());

    let restored =
        Dataset::import_from(&env, &store, Some(NATIVE), &ImportOptions::default()).unwrap();
    let media = restored.get("3", "val").unwrap().media.as_ref().unwrap();
    assert!(media.exists());
}

#[test]
fn stale_media_in_dirty_subset_is_pruned() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let mut dataset = common::dataset_with_media(temp.path());
    let store = temp.path().join("store");
    let options = ExportOptions::default().with_media();
    dataset.export(&env, &store, NATIVE, &options).unwrap();

    dataset.remove("2", "train");
    let stats = dataset.save(&env, &options).unwrap();

    assert_eq!(stats.containers_written, 1);
    assert_eq!(stats.media_deleted, 1);
    assert!(!store.join("images/train/2.bmp").exists());
    assert!(store.join("images/train/1.bmp").is_file());
}

#[test]
fn random_split_then_save_matches_reimport() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let mut dataset = Dataset::from_items((0..20).map(|i| DatasetItem::new(format!("{i:02}"))));
    dataset
        .export(&env, temp.path(), NATIVE, &ExportOptions::default())
        .unwrap();

    dataset
        .transform(
            "random_split",
            &json!({"splits": [["train", 0.5], ["test", 0.5]], "seed": 7}),
        )
        .unwrap();
    dataset.save(&env, &ExportOptions::default()).unwrap();

    assert_eq!(
        common::list_files(&temp.path().join("annotations")),
        vec!["test.json", "train.json"]
    );
    let restored =
        Dataset::import_from(&env, temp.path(), Some(NATIVE), &ImportOptions::default()).unwrap();
    assert_eq!(restored.subset_len("train"), 10);
    assert_eq!(restored.subset_len("test"), 10);
}

#[test]
fn exporting_elsewhere_rebinds_the_dataset() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let first = temp.path().join("first");
    let second = temp.path().join("second");

    let mut dataset = common::abc_dataset();
    dataset
        .export(&env, &first, NATIVE, &ExportOptions::default())
        .unwrap();
    let stats = dataset
        .export(&env, &second, NATIVE, &ExportOptions::default())
        .unwrap();
    assert_eq!(stats.containers_written, 3);
    assert_eq!(dataset.source().unwrap().path, second);
}

#[test]
fn save_requires_a_binding() {
    let env = Environment::with_builtin_formats();
    let mut dataset = common::abc_dataset();
    let err = dataset.save(&env, &ExportOptions::default()).unwrap_err();
    assert!(matches!(err, LabelvaultError::NotBound));
}

#[test]
fn category_change_rewrites_every_subset() {
    let env = Environment::with_builtin_formats();
    let temp = tempfile::tempdir().unwrap();
    let mut dataset = common::abc_dataset();
    dataset
        .export(&env, temp.path(), NATIVE, &ExportOptions::default())
        .unwrap();

    dataset.set_categories(labelvault::dataset::Categories::from_names(["bird"]));
    let stats = dataset.save(&env, &ExportOptions::default()).unwrap();
    assert_eq!(stats.containers_written, 3);
}
