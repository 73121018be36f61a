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

//! COCO instances importer
//!
//! Expects `<input>/annotations/instances_<split>.json` with the images of each split
//! under `<input>/<split>/`.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{
    check_source_dir, dataset_info, image_cell, main_row, main_table_spec, normalized_xywh, Importer, ItemRows,
    RowStream, IMAGE_TABLE, MAIN_TABLE, OBJECTS_TABLE,
};
use crate::cells::{Row, Value};
use crate::codec::{encode_rle, MaskInput};
use crate::core::{Category, DatasetInfo, PixanoError, Result, TableGroup, TableSpec, GROUND_TRUTH};

const ANNOTATIONS_DIR: &str = "annotations";
const VIEW: &str = "image";

#[derive(Debug, Clone, Deserialize)]
pub struct CocoFile {
    pub images: Vec<CocoImage>,
    #[serde(default)]
    pub annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    pub categories: Vec<CocoCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CocoImage {
    pub id: i64,
    pub file_name: String,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CocoAnnotation {
    pub id: i64,
    pub image_id: i64,
    pub category_id: i64,
    /// `[x, y, width, height]` in pixels
    pub bbox: [f64; 4],
    #[serde(default)]
    pub segmentation: serde_json::Value,
    #[serde(default)]
    pub area: f64,
    #[serde(default)]
    pub iscrowd: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CocoCategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub supercategory: Option<String>,
}

pub struct CocoImporter {
    info: DatasetInfo,
    input_dir: PathBuf,
    splits: Vec<(String, CocoFile)>,
}

impl CocoImporter {
    /// Parse the annotation files of `splits`, or of every `instances_*.json` found
    pub fn new(
        name: &str,
        description: &str,
        input_dir: impl Into<PathBuf>,
        splits: Option<Vec<String>>,
    ) -> Result<Self> {
        let input_dir = input_dir.into();
        check_source_dir(&input_dir)?;
        let annotations_dir = input_dir.join(ANNOTATIONS_DIR);

        let split_names = match splits {
            Some(splits) => splits,
            None => discover_splits(&annotations_dir)?,
        };
        if split_names.is_empty() {
            return Err(PixanoError::MissingSource(format!(
                "no instances_<split>.json under {}",
                annotations_dir.display()
            )));
        }

        let mut parsed = Vec::with_capacity(split_names.len());
        for split in &split_names {
            let path = annotations_dir.join(format!("instances_{}.json", split));
            let data = std::fs::read(&path)
                .map_err(|e| PixanoError::MissingSource(format!("{}: {}", path.display(), e)))?;
            let file: CocoFile = serde_json::from_slice(&data)?;
            tracing::info!(
                "🔍 COCO split {}: {} images, {} annotations",
                split,
                file.images.len(),
                file.annotations.len()
            );
            parsed.push((split.clone(), file));
        }

        let mut categories: BTreeMap<i64, Category> = BTreeMap::new();
        for category in parsed.iter().flat_map(|(_, file)| &file.categories) {
            categories.entry(category.id).or_insert_with(|| Category {
                id: category.id,
                name: category.name.clone(),
                supercategory: category.supercategory.clone(),
            });
        }

        let mut info = dataset_info(name, description, &split_names);
        info.add_table(TableGroup::Main, main_table_spec(&[("original_id", "int")]));
        info.add_table(
            TableGroup::Media,
            TableSpec::new(IMAGE_TABLE, &[("id", "str"), (VIEW, "image")]),
        );
        info.add_table(TableGroup::Objects, objects_table_spec());
        if !categories.is_empty() {
            info.categories = Some(categories.into_values().collect());
        }

        Ok(Self {
            info,
            input_dir,
            splits: parsed,
        })
    }

    fn item_rows(
        &self,
        split: &str,
        image: &CocoImage,
        annotations: &[&CocoAnnotation],
        categories: &HashMap<i64, &CocoCategory>,
    ) -> Result<ItemRows> {
        let item_id = stable_id(&self.info.id, split, "image", image.id);
        let mut item = ItemRows::new();

        let mut main = main_row(&item_id, &[VIEW], split);
        main.insert("original_id".into(), Value::Int(image.id));
        item.push(TableGroup::Main, MAIN_TABLE, main);

        let uri = format!("{}/{}", split, image.file_name);
        let mut media = Row::new();
        media.insert("id".into(), item_id.as_str().into());
        media.insert(VIEW.into(), Value::Image(image_cell(&self.input_dir, &uri)?));
        item.push(TableGroup::Media, IMAGE_TABLE, media);

        for annotation in annotations {
            let row = object_row(&self.info.id, split, &item_id, image, annotation, categories)?;
            item.push(TableGroup::Objects, OBJECTS_TABLE, row);
        }
        Ok(item)
    }
}

impl Importer for CocoImporter {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn media_sources(&self) -> BTreeMap<String, PathBuf> {
        BTreeMap::from([(VIEW.to_string(), self.input_dir.clone())])
    }

    fn categorical_fields(&self) -> Vec<(TableGroup, String)> {
        vec![
            (TableGroup::Objects, "category".to_string()),
            (TableGroup::Objects, "supercategory".to_string()),
        ]
    }

    fn import_rows(&self) -> Result<RowStream<'_>> {
        let stream = self.splits.iter().flat_map(move |(split, file)| {
            let categories: HashMap<i64, &CocoCategory> =
                file.categories.iter().map(|category| (category.id, category)).collect();
            let mut by_image: HashMap<i64, Vec<&CocoAnnotation>> = HashMap::new();
            for annotation in &file.annotations {
                by_image.entry(annotation.image_id).or_default().push(annotation);
            }

            let mut images: Vec<&CocoImage> = file.images.iter().collect();
            images.sort_by_key(|image| image.id);
            images.into_iter().map(move |image| {
                let annotations = by_image.get(&image.id).map(Vec::as_slice).unwrap_or(&[]);
                self.item_rows(split, image, annotations, &categories)
            })
        });
        Ok(Box::new(stream))
    }
}

fn objects_table_spec() -> TableSpec {
    TableSpec::new(
        OBJECTS_TABLE,
        &[
            ("id", "str"),
            ("item_id", "str"),
            ("view_id", "str"),
            ("bbox", "bbox"),
            ("mask", "compressedrle"),
            ("category_id", "int"),
            ("category", "str"),
            ("supercategory", "str"),
            ("is_group_of", "bool"),
            ("area", "float"),
            ("original_id", "int"),
        ],
    )
    .with_source(GROUND_TRUTH)
}

fn object_row(
    dataset_id: &str,
    split: &str,
    item_id: &str,
    image: &CocoImage,
    annotation: &CocoAnnotation,
    categories: &HashMap<i64, &CocoCategory>,
) -> Result<Row> {
    let mut row = Row::new();
    row.insert(
        "id".into(),
        stable_id(dataset_id, split, "annotation", annotation.id).into(),
    );
    row.insert("item_id".into(), item_id.into());
    row.insert("view_id".into(), VIEW.into());
    row.insert(
        "bbox".into(),
        Value::BBox(normalized_xywh(annotation.bbox, image.width, image.height)?),
    );

    let mask = match &annotation.segmentation {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Array(polygons) if polygons.is_empty() => Value::Null,
        segmentation => {
            let input = MaskInput::from_json(segmentation)?;
            Value::Rle(encode_rle(&input, image.height, image.width)?)
        }
    };
    row.insert("mask".into(), mask);

    row.insert("category_id".into(), Value::Int(annotation.category_id));
    let category = categories.get(&annotation.category_id);
    row.insert(
        "category".into(),
        category.map(|c| c.name.as_str()).unwrap_or_default().into(),
    );
    row.insert(
        "supercategory".into(),
        category
            .and_then(|c| c.supercategory.as_deref())
            .unwrap_or_default()
            .into(),
    );
    row.insert("is_group_of".into(), Value::Bool(annotation.iscrowd == 1));
    row.insert("area".into(), Value::Float(annotation.area));
    row.insert("original_id".into(), Value::Int(annotation.id));
    Ok(row)
}

/// Deterministic UUIDv5 of a COCO record
fn stable_id(dataset_id: &str, split: &str, kind: &str, original_id: i64) -> String {
    let name = format!("{}/{}/{}/{}", dataset_id, split, kind, original_id);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn discover_splits(annotations_dir: &Path) -> Result<Vec<String>> {
    let pattern = annotations_dir.join("instances_*.json");
    let entries = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| PixanoError::MissingSource(e.to_string()))?;
    let mut splits: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|path| {
            super::file_stem(&path)
                .strip_prefix("instances_")
                .map(str::to_string)
        })
        .collect();
    splits.sort();
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_ids_are_deterministic() {
        let a = stable_id("coco", "val", "image", 42);
        assert_eq!(a, stable_id("coco", "val", "image", 42));
        assert_ne!(a, stable_id("coco", "train", "image", 42));
        assert_ne!(a, stable_id("coco", "val", "annotation", 42));
    }

    #[test]
    fn test_annotation_parsing() {
        let file: CocoFile = serde_json::from_value(serde_json::json!({
            "images": [{"id": 1, "file_name": "a.jpg", "width": 10, "height": 10}],
            "annotations": [{
                "id": 7, "image_id": 1, "category_id": 3, "bbox": [1, 1, 2, 2],
                "segmentation": {"size": [10, 10], "counts": [45, 2, 8, 3, 8, 2, 32]},
                "area": 7.0, "iscrowd": 1
            }],
            "categories": [{"id": 3, "name": "dog", "supercategory": "animal"}]
        }))
        .unwrap();
        let categories: HashMap<i64, &CocoCategory> = file.categories.iter().map(|c| (c.id, c)).collect();

        let row = object_row("coco", "val", "item", &file.images[0], &file.annotations[0], &categories).unwrap();
        match &row["mask"] {
            Value::Rle(rle) => assert_eq!(rle.counts, b"]12810Oh0".to_vec()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(row["is_group_of"], Value::Bool(true));
        assert_eq!(row["category"], Value::from("dog"));
        assert_eq!(row["original_id"], Value::Int(7));
    }
}
