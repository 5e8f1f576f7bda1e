#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use labelvault::dataset::{Annotation, Categories, Dataset, DatasetItem, Media};
use walkdir::WalkDir;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}

/// Three subsets `a`, `b`, `c` with one annotated item each, plus a schema.
pub fn abc_dataset() -> Dataset {
    Dataset::from_items(["a", "b", "c"].iter().enumerate().map(|(i, subset)| {
        DatasetItem::new(format!("item{i}"))
            .in_subset(*subset)
            .with_annotation(Annotation::bbox(0, Some(0), 1.0, 2.0, 3.0, 4.0))
    }))
    .with_categories(Categories::from_names(["cat", "dog"]))
}

/// A dataset whose items reference real BMP files under `media_root`.
pub fn dataset_with_media(media_root: &Path) -> Dataset {
    let first = media_root.join("src/first.bmp");
    let second = media_root.join("src/second.bmp");
    write_bmp(&first, 4, 3);
    write_bmp(&second, 2, 2);

    Dataset::from_items([
        DatasetItem::new("1")
            .in_subset("train")
            .with_media(Media::image(&first))
            .with_annotation(Annotation::label(0, 1)),
        DatasetItem::new("2")
            .in_subset("train")
            .with_media(Media::image(&second)),
        DatasetItem::new("3")
            .in_subset("test")
            .with_media(Media::image(&first)),
    ])
    .with_categories(Categories::from_names(["cat", "dog"]))
}

/// Relative paths of all files below `root`, sorted, with `/` separators.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .expect("inside root")
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

pub fn container(root: &Path, subset: &str) -> PathBuf {
    root.join("annotations").join(format!("{subset}.json"))
}
