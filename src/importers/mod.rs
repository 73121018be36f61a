/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Importer framework: source adapters stream per-item rows, [`ImportWriter`] turns
//! them into a dataset
//!
//! An adapter declares the dataset info and tables it produces and yields one
//! [`ItemRows`] per item. Media cells carry URIs relative to `media/<field>/`; the
//! writer transfers the referenced files from [`Importer::media_sources`].

pub mod bop;
pub mod coco;
pub mod dota;
pub mod features;
pub mod image_folder;
pub mod legacy;
pub mod preview;
pub mod writer;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use bop::BopImporter;
pub use coco::CocoImporter;
pub use dota::DotaImporter;
pub use features::{FeatureValue, FeatureValues};
pub use image_folder::ImageFolderImporter;
pub use legacy::LegacyImporter;
pub use writer::{ImportWriter, MediaTransfer};

use crate::cells::{BBox, Image, Row, Value};
use crate::core::{DatasetInfo, PixanoError, Result, TableGroup, TableSpec};

/// Name of the main table
pub const MAIN_TABLE: &str = "db";

/// Name of the image media table
pub const IMAGE_TABLE: &str = "image";

/// Name of the ground truth objects table
pub const OBJECTS_TABLE: &str = "objects";

/// Extensions picked up when walking image directories
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Rows of one table produced for one item
#[derive(Debug, Clone, PartialEq)]
pub struct TableRows {
    pub group: TableGroup,
    pub table: String,
    pub rows: Vec<Row>,
}

/// Everything an adapter emits for one item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemRows {
    tables: Vec<TableRows>,
}

impl ItemRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, group: TableGroup, table: &str, row: Row) -> &mut Self {
        match self.tables.iter_mut().find(|t| t.table == table) {
            Some(entry) => entry.rows.push(row),
            None => self.tables.push(TableRows {
                group,
                table: table.to_string(),
                rows: vec![row],
            }),
        }
        self
    }

    pub fn tables(&self) -> &[TableRows] {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut [TableRows] {
        &mut self.tables
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }
}

/// Lazily produced items of a source
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<ItemRows>> + Send + 'a>;

/// A source-specific row generator
pub trait Importer: Send + Sync {
    /// Declared dataset info, with every table the rows refer to
    fn info(&self) -> &DatasetInfo;

    /// Media field -> local directory the emitted relative URIs resolve against
    fn media_sources(&self) -> BTreeMap<String, PathBuf>;

    /// Fields whose distinct values are collected into `features_values.json`
    fn categorical_fields(&self) -> Vec<(TableGroup, String)> {
        Vec::new()
    }

    /// Whether an item failing validation is logged and skipped instead of aborting
    fn skip_on_error(&self) -> bool {
        false
    }

    fn import_rows(&self) -> Result<RowStream<'_>>;
}

/// `db` table with the required columns followed by `extra`
pub fn main_table_spec(extra: &[(&str, &str)]) -> TableSpec {
    let mut fields = vec![("id", "str"), ("views", "[str]"), ("split", "str")];
    fields.extend_from_slice(extra);
    TableSpec::new(MAIN_TABLE, &fields)
}

pub fn main_row(id: &str, views: &[&str], split: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), id.into());
    row.insert(
        "views".into(),
        Value::List(views.iter().map(|view| Value::from(*view)).collect()),
    );
    row.insert("split".into(), split.into());
    row
}

/// Fail with `MissingSource` unless the directory exists and has entries
pub fn check_source_dir(path: &Path) -> Result<()> {
    let mut entries = std::fs::read_dir(path)
        .map_err(|_| PixanoError::MissingSource(path.display().to_string()))?;
    if entries.next().is_none() {
        return Err(PixanoError::MissingSource(format!("{} is empty", path.display())));
    }
    Ok(())
}

/// Sorted names of the subdirectories of `path`
pub fn subdirectories(path: &Path) -> Result<Vec<String>> {
    check_source_dir(path)?;
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Image files of a directory, sorted by path
pub fn image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for extension in IMAGE_EXTENSIONS {
        let pattern = dir.join(format!("*.{}", extension));
        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| PixanoError::MissingSource(e.to_string()))?;
        files.extend(entries.filter_map(|entry| entry.ok()));
    }
    files.sort();
    Ok(files)
}

/// Image cell for a source file, with its preview computed from the file
pub fn image_cell(source_root: &Path, uri: &str) -> Result<Image> {
    let raw = std::fs::read(source_root.join(uri))
        .map_err(|e| PixanoError::MissingSource(format!("{}: {}", source_root.join(uri).display(), e)))?;
    Image::from_file_bytes(uri, &raw)
}

/// Pixel `[x, y, w, h]` to normalized xywh kept inside the image
pub fn normalized_xywh(bbox: [f64; 4], width: usize, height: usize) -> Result<BBox> {
    if width == 0 || height == 0 {
        return Err(PixanoError::InvalidCell(format!("image size {}x{}", width, height)));
    }
    let (w, h) = (width as f64, height as f64);
    let x = (bbox[0] / w).clamp(0.0, 1.0);
    let y = (bbox[1] / h).clamp(0.0, 1.0);
    let bw = (bbox[2] / w).clamp(0.0, 1.0 - x);
    let bh = (bbox[3] / h).clamp(0.0, 1.0 - y);
    BBox::from_xywh([x as f32, y as f32, bw as f32, bh as f32], true)
}

/// File stem of a path as an owned string
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Dataset info preloaded with name, description and splits
pub fn dataset_info(name: &str, description: &str, splits: &[String]) -> DatasetInfo {
    let mut info = DatasetInfo::new(slug(name), name, description);
    info.splits = splits.to_vec();
    info
}

/// Lowercase identifier made of alphanumerics and underscores
pub fn slug(name: &str) -> String {
    let mut slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    while slug.contains("__") {
        slug = slug.replace("__", "_");
    }
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_item_rows_group_by_table() {
        let mut item = ItemRows::new();
        item.push(TableGroup::Main, MAIN_TABLE, main_row("1", &["image"], "train"));
        item.push(TableGroup::Objects, OBJECTS_TABLE, Row::new());
        item.push(TableGroup::Objects, OBJECTS_TABLE, Row::new());

        assert_eq!(item.tables().len(), 2);
        assert_eq!(item.rows(OBJECTS_TABLE).len(), 2);
        assert!(item.rows("missing").is_empty());
    }

    #[test]
    fn test_missing_and_empty_sources() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            check_source_dir(&temp_dir.path().join("nope")),
            Err(PixanoError::MissingSource(_))
        ));
        assert!(matches!(check_source_dir(temp_dir.path()), Err(PixanoError::MissingSource(_))));

        std::fs::create_dir(temp_dir.path().join("val")).unwrap();
        std::fs::create_dir(temp_dir.path().join("train")).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();
        assert_eq!(subdirectories(temp_dir.path()).unwrap(), vec!["train", "val"]);
    }

    #[test]
    fn test_bbox_normalized_and_clamped() {
        let bbox = normalized_xywh([10.0, 20.0, 300.0, 40.0], 200, 100).unwrap();
        assert!((bbox.coords[0] - 0.05).abs() < 1e-6);
        assert!((bbox.coords[1] - 0.2).abs() < 1e-6);
        assert!((bbox.coords[2] - 0.95).abs() < 1e-6);
        assert!((bbox.coords[3] - 0.4).abs() < 1e-6);
        assert!(bbox.is_normalized);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Pixano Annotator"), "pixano_annotator");
        assert_eq!(slug("  SAM (vit-h) "), "sam_vit_h");
    }
}
