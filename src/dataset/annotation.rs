//! Annotation and label-schema types.
//!
//! Annotations are treated as opaque payloads by the persistence layer: they
//! only need to be comparable and serializable. The shapes below cover what
//! the bundled format plugins produce.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single annotation attached to a dataset item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Identifier of the annotation within its item (0 when unset).
    #[serde(default)]
    pub id: u64,

    /// Group index used to tie related annotations together (0 = ungrouped).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub group: u64,

    /// Index into the dataset's [`Categories`] labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<usize>,

    /// Geometry of the annotation.
    pub shape: Shape,

    /// Additional attributes (e.g., "occluded", "score").
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Geometry carried by an annotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// Image-level label without geometry.
    Label,
    /// Axis-aligned box in pixel space, top-left corner plus size.
    Bbox { x: f64, y: f64, w: f64, h: f64 },
    /// Flat `[x0, y0, x1, y1, ...]` keypoint list.
    Points { points: Vec<f64> },
    /// Flat `[x0, y0, x1, y1, ...]` closed polygon.
    Polygon { points: Vec<f64> },
}

impl Annotation {
    /// Creates an image-level label annotation.
    pub fn label(id: u64, label: usize) -> Self {
        Self {
            id,
            group: 0,
            label: Some(label),
            shape: Shape::Label,
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a bounding box annotation.
    pub fn bbox(id: u64, label: Option<usize>, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            id,
            group: 0,
            label,
            shape: Shape::Bbox { x, y, w, h },
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a polygon annotation.
    pub fn polygon(id: u64, label: Option<usize>, points: Vec<f64>) -> Self {
        Self {
            id,
            group: 0,
            label,
            shape: Shape::Polygon { points },
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the group index.
    pub fn with_group(mut self, group: u64) -> Self {
        self.group = group;
        self
    }

    /// Adds an attribute to the annotation.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// The label schema of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Categories {
    #[serde(default)]
    pub labels: Vec<LabelCategory>,
}

/// A single label definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelCategory {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Names of attributes annotations with this label may carry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

impl LabelCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

impl Categories {
    /// Builds a schema from plain label names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: names.into_iter().map(LabelCategory::new).collect(),
        }
    }

    /// Returns the index of the label with the given name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|label| label.name == name)
    }

    /// Returns the index of `name`, appending a new label if it is missing.
    pub fn find_or_add(&mut self, name: &str) -> usize {
        match self.find(name) {
            Some(index) => index,
            None => {
                self.labels.push(LabelCategory::new(name));
                self.labels.len() - 1
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_serializes_with_type_tag() {
        let ann = Annotation::bbox(1, Some(0), 1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_string(&ann).unwrap();
        assert!(json.contains("\"type\":\"bbox\""));
        assert!(!json.contains("\"group\""));
        assert!(!json.contains("\"attributes\""));
    }

    #[test]
    fn annotation_builder_pattern() {
        let ann = Annotation::label(3, 1)
            .with_group(2)
            .with_attribute("occluded", false);

        assert_eq!(ann.group, 2);
        assert_eq!(ann.attributes.get("occluded"), Some(&Value::Bool(false)));
    }

    #[test]
    fn find_or_add_appends_missing_labels() {
        let mut categories = Categories::from_names(["cat", "dog"]);
        assert_eq!(categories.find_or_add("dog"), 1);
        assert_eq!(categories.find_or_add("bird"), 2);
        assert_eq!(categories.len(), 3);
    }
}
