use std::collections::BTreeMap;

use labelvault::compare::{compare_datasets, CompareOptions};
use labelvault::dataset::{Annotation, Dataset, DatasetItem, SubsetState};
use labelvault::env::Environment;
use labelvault::format::{ExportOptions, ImportOptions};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use serde_json::json;

mod common;

const NATIVE: &str = "labelvault";

fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(32);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config
}

#[derive(Clone, Debug)]
enum Op {
    Put { id: u8, subset: u8, label: u8 },
    Remove { id: u8, subset: u8 },
    /// Drop every item carrying `label`.
    Filter { label: u8 },
    /// Reassign all items to two subsets by ratio.
    RandomSplit { first: u8, second: u8, seed: u64 },
    /// Rename one subset into another; collisions leave the dataset as is.
    MapSubsets { from: u8, to: u8 },
    RemoveAnnotations { subset: u8 },
}

const SUBSETS: [&str; 3] = ["a", "b", "c"];

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 0u8..3, 0u8..2).prop_map(|(id, subset, label)| Op::Put { id, subset, label }),
        (0u8..6, 0u8..3).prop_map(|(id, subset)| Op::Remove { id, subset }),
        (0u8..2).prop_map(|label| Op::Filter { label }),
        (0u8..3, 0u8..3, any::<u64>())
            .prop_filter("distinct split subsets", |(first, second, _)| first != second)
            .prop_map(|(first, second, seed)| Op::RandomSplit { first, second, seed }),
        (0u8..3, 0u8..3).prop_map(|(from, to)| Op::MapSubsets { from, to }),
        (0u8..3).prop_map(|subset| Op::RemoveAnnotations { subset }),
    ]
}

fn apply(dataset: &mut Dataset, op: Op) {
    match op {
        Op::Put { id, subset, label } => {
            dataset.put(item(id, subset, label));
        }
        Op::Remove { id, subset } => {
            dataset.remove(&format!("i{id}"), SUBSETS[subset as usize]);
        }
        Op::Filter { label } => {
            let dropped = Annotation::label(0, label as usize);
            dataset.filter(|item| !item.annotations.contains(&dropped));
        }
        Op::RandomSplit { first, second, seed } => {
            let params = json!({
                "splits": [[SUBSETS[first as usize], 0.5], [SUBSETS[second as usize], 0.5]],
                "seed": seed,
            });
            dataset.transform("random_split", &params).expect("valid split");
        }
        Op::MapSubsets { from, to } => {
            let params = json!({"mapping": {(SUBSETS[from as usize]): SUBSETS[to as usize]}});
            let _ = dataset.transform("map_subsets", &params);
        }
        Op::RemoveAnnotations { subset } => {
            let params = json!({"subsets": [SUBSETS[subset as usize]]});
            dataset.transform("remove_annotations", &params).expect("valid params");
        }
    }
}

fn item(id: u8, subset: u8, label: u8) -> DatasetItem {
    DatasetItem::new(format!("i{id}"))
        .in_subset(SUBSETS[subset as usize])
        .with_annotation(Annotation::label(0, label as usize))
}

fn arb_dataset() -> impl Strategy<Value = Vec<(u8, u8, u8)>> {
    prop::collection::vec((0u8..6, 0u8..3, 0u8..2), 1..12)
}

fn build(items: &[(u8, u8, u8)]) -> Dataset {
    Dataset::from_items(items.iter().map(|&(id, subset, label)| item(id, subset, label)))
}

/// Serialized content of every subset, keyed by subset name.
fn snapshot(dataset: &Dataset) -> BTreeMap<String, Vec<DatasetItem>> {
    dataset
        .subsets()
        .into_iter()
        .map(|subset| {
            let items = dataset.subset_items(&subset).cloned().collect();
            (subset, items)
        })
        .collect()
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn every_changed_subset_is_tracked(items in arb_dataset(), ops in prop::collection::vec(arb_op(), 0..12)) {
        let mut dataset = build(&items);
        let before = snapshot(&dataset);
        let env = Environment::with_builtin_formats();
        let temp = tempfile::tempdir().expect("create temp dir");
        dataset.export(&env, temp.path(), NATIVE, &ExportOptions::default()).expect("export");

        for op in ops {
            apply(&mut dataset, op);
        }

        let after = snapshot(&dataset);
        for subset in SUBSETS {
            if before.get(subset) != after.get(subset) {
                prop_assert_ne!(dataset.subset_state(subset), SubsetState::Clean, "subset {}", subset);
            }
            if !after.contains_key(subset) && before.contains_key(subset) {
                prop_assert_eq!(dataset.subset_state(subset), SubsetState::PendingDelete);
            }
        }

        dataset.save(&env, &ExportOptions::default()).expect("save");
        let restored = Dataset::import_from(&env, temp.path(), Some(NATIVE), &ImportOptions::default())
            .expect("import");
        let report = compare_datasets(&dataset, &restored, &CompareOptions::default());
        prop_assert!(report.is_equal(), "{}", report);
    }

    #[test]
    fn streaming_matches_buffered_bytes(items in arb_dataset(), chunk_size in 1usize..5) {
        let env = Environment::with_builtin_formats();
        let buffered_dir = tempfile::tempdir().expect("create temp dir");
        let streamed_dir = tempfile::tempdir().expect("create temp dir");

        build(&items)
            .export(&env, buffered_dir.path(), NATIVE, &ExportOptions::default())
            .expect("buffered export");
        let options = ExportOptions { chunk_size, ..ExportOptions::default().streaming() };
        build(&items)
            .export(&env, streamed_dir.path(), NATIVE, &options)
            .expect("streamed export");

        let files = common::list_files(buffered_dir.path());
        prop_assert_eq!(&files, &common::list_files(streamed_dir.path()));
        for file in files {
            let a = std::fs::read(buffered_dir.path().join(&file)).expect("read buffered");
            let b = std::fs::read(streamed_dir.path().join(&file)).expect("read streamed");
            prop_assert_eq!(a, b, "{}", file);
        }
    }
}
