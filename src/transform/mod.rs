//! Whole-dataset transforms.
//!
//! A transform rewrites the full item list; [`Dataset::apply_transform`]
//! then diffs the result against the previous items so only subsets whose
//! content actually changed are marked dirty.
//!
//! [`Dataset::apply_transform`]: crate::dataset::Dataset::apply_transform

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::dataset::DatasetItem;
use crate::error::LabelvaultError;

const RATIO_TOLERANCE: f64 = 1e-6;

/// A parsed transform.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    /// Shuffle all items and reassign them to subsets by ratio.
    RandomSplit {
        splits: Vec<(String, f64)>,
        seed: Option<u64>,
    },
    /// Rename subsets; unmapped subsets keep their name.
    MapSubsets { mapping: BTreeMap<String, String> },
    /// Drop annotations, optionally only in some subsets.
    RemoveAnnotations { subsets: Option<BTreeSet<String>> },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RandomSplitParams {
    splits: Vec<(String, f64)>,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MapSubsetsParams {
    mapping: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoveAnnotationsParams {
    #[serde(default)]
    subsets: Option<BTreeSet<String>>,
}

impl Transform {
    /// Names accepted by [`Transform::from_params`].
    pub const NAMES: [&'static str; 3] = ["random_split", "map_subsets", "remove_annotations"];

    /// Builds a transform from its name and JSON parameters.
    pub fn from_params(name: &str, params: &Value) -> Result<Self, LabelvaultError> {
        match name {
            "random_split" => {
                let params: RandomSplitParams = parse_params(name, params)?;
                validate_splits(&params.splits)?;
                Ok(Self::RandomSplit {
                    splits: params.splits,
                    seed: params.seed,
                })
            }
            "map_subsets" => {
                let params: MapSubsetsParams = parse_params(name, params)?;
                Ok(Self::MapSubsets {
                    mapping: params.mapping,
                })
            }
            "remove_annotations" => {
                let params: RemoveAnnotationsParams = if params.is_null() {
                    RemoveAnnotationsParams::default()
                } else {
                    parse_params(name, params)?
                };
                Ok(Self::RemoveAnnotations {
                    subsets: params.subsets,
                })
            }
            other => Err(LabelvaultError::UnknownTransform(other.to_string())),
        }
    }

    /// Produces the rewritten item list.
    pub fn apply(&self, items: Vec<DatasetItem>) -> Result<Vec<DatasetItem>, LabelvaultError> {
        match self {
            Self::RandomSplit { splits, seed } => {
                validate_splits(splits)?;
                Ok(random_split(items, splits, *seed))
            }
            Self::MapSubsets { mapping } => map_subsets(items, mapping),
            Self::RemoveAnnotations { subsets } => Ok(items
                .into_iter()
                .map(|mut item| {
                    let selected = subsets
                        .as_ref()
                        .map_or(true, |subsets| subsets.contains(&item.subset));
                    if selected {
                        item.annotations.clear();
                    }
                    item
                })
                .collect()),
        }
    }
}

fn parse_params<T: DeserializeOwned>(name: &str, params: &Value) -> Result<T, LabelvaultError> {
    T::deserialize(params).map_err(|err| LabelvaultError::InvalidTransformParams {
        message: format!("{name}: {err}"),
    })
}

fn invalid(message: impl Into<String>) -> LabelvaultError {
    LabelvaultError::InvalidTransformParams {
        message: message.into(),
    }
}

fn validate_splits(splits: &[(String, f64)]) -> Result<(), LabelvaultError> {
    if splits.is_empty() {
        return Err(invalid("random_split: at least one split is required"));
    }

    let mut seen = BTreeSet::new();
    for (subset, ratio) in splits {
        if !seen.insert(subset.as_str()) {
            return Err(invalid(format!("random_split: subset '{subset}' listed twice")));
        }
        if !ratio.is_finite() || *ratio < 0.0 || *ratio > 1.0 {
            return Err(invalid(format!(
                "random_split: ratio {ratio} of '{subset}' must be within [0, 1]"
            )));
        }
    }

    let total: f64 = splits.iter().map(|(_, ratio)| ratio).sum();
    if (total - 1.0).abs() > RATIO_TOLERANCE {
        return Err(invalid(format!(
            "random_split: ratios sum to {total}, expected 1"
        )));
    }
    Ok(())
}

fn random_split(
    mut items: Vec<DatasetItem>,
    splits: &[(String, f64)],
    seed: Option<u64>,
) -> Vec<DatasetItem> {
    // Start from a canonical order so the seed alone decides the outcome.
    items.sort_by_key(DatasetItem::key);
    match seed {
        Some(seed) => items.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => items.shuffle(&mut rand::rng()),
    }

    let total = items.len();
    let mut boundaries = Vec::with_capacity(splits.len());
    let mut cumulative = 0.0;
    for (index, (_, ratio)) in splits.iter().enumerate() {
        cumulative += ratio;
        let end = if index + 1 == splits.len() {
            total
        } else {
            ((cumulative * total as f64).round() as usize).min(total)
        };
        boundaries.push(end);
    }

    let mut split_index = 0;
    items
        .into_iter()
        .enumerate()
        .map(|(position, mut item)| {
            while position >= boundaries[split_index] {
                split_index += 1;
            }
            item.subset = splits[split_index].0.clone();
            item
        })
        .collect()
}

fn map_subsets(
    items: Vec<DatasetItem>,
    mapping: &BTreeMap<String, String>,
) -> Result<Vec<DatasetItem>, LabelvaultError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for mut item in items {
        if let Some(target) = mapping.get(&item.subset) {
            item.subset = target.clone();
        }
        if !seen.insert(item.key()) {
            return Err(invalid(format!(
                "map_subsets: item '{}' would appear twice in subset '{}'",
                item.id, item.subset
            )));
        }
        out.push(item);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Annotation;
    use serde_json::json;

    fn items(n: usize) -> Vec<DatasetItem> {
        (0..n)
            .map(|i| DatasetItem::new(format!("{i:03}")))
            .collect()
    }

    fn subset_sizes(items: &[DatasetItem]) -> BTreeMap<String, usize> {
        let mut sizes = BTreeMap::new();
        for item in items {
            *sizes.entry(item.subset.clone()).or_insert(0) += 1;
        }
        sizes
    }

    #[test]
    fn random_split_respects_ratios_and_seed() {
        let transform = Transform::from_params(
            "random_split",
            &json!({"splits": [["train", 0.7], ["test", 0.3]], "seed": 42}),
        )
        .unwrap();

        let a = transform.apply(items(10)).unwrap();
        let b = transform.apply(items(10)).unwrap();
        assert_eq!(a, b);

        let sizes = subset_sizes(&a);
        assert_eq!(sizes["train"], 7);
        assert_eq!(sizes["test"], 3);
    }

    #[test]
    fn random_split_rejects_bad_ratios() {
        let err = Transform::from_params(
            "random_split",
            &json!({"splits": [["train", 0.5], ["test", 0.3]]}),
        )
        .unwrap_err();
        assert!(matches!(err, LabelvaultError::InvalidTransformParams { .. }));

        let err = Transform::from_params("random_split", &json!({"splits": []})).unwrap_err();
        assert!(matches!(err, LabelvaultError::InvalidTransformParams { .. }));
    }

    #[test]
    fn map_subsets_renames_and_detects_collisions() {
        let transform =
            Transform::from_params("map_subsets", &json!({"mapping": {"a": "b"}})).unwrap();

        let renamed = transform
            .apply(vec![
                DatasetItem::new("1").in_subset("a"),
                DatasetItem::new("2").in_subset("c"),
            ])
            .unwrap();
        assert_eq!(renamed[0].subset, "b");
        assert_eq!(renamed[1].subset, "c");

        let err = transform
            .apply(vec![
                DatasetItem::new("1").in_subset("a"),
                DatasetItem::new("1").in_subset("b"),
            ])
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn remove_annotations_limits_to_subsets() {
        let transform =
            Transform::from_params("remove_annotations", &json!({"subsets": ["a"]})).unwrap();
        let out = transform
            .apply(vec![
                DatasetItem::new("1")
                    .in_subset("a")
                    .with_annotation(Annotation::label(0, 0)),
                DatasetItem::new("2")
                    .in_subset("b")
                    .with_annotation(Annotation::label(0, 0)),
            ])
            .unwrap();
        assert!(out[0].annotations.is_empty());
        assert_eq!(out[1].annotations.len(), 1);

        let all = Transform::from_params("remove_annotations", &Value::Null).unwrap();
        assert_eq!(all, Transform::RemoveAnnotations { subsets: None });
    }

    #[test]
    fn unknown_names_and_fields_are_rejected() {
        assert!(matches!(
            Transform::from_params("explode", &json!({})),
            Err(LabelvaultError::UnknownTransform(ref name)) if name == "explode"
        ));
        assert!(matches!(
            Transform::from_params("map_subsets", &json!({"mapping": {}, "extra": 1})),
            Err(LabelvaultError::InvalidTransformParams { .. })
        ));
    }
}
