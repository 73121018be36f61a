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

//! DOTA importer: `<input>/<split>/images/*` with one `labelTxt/<stem>.txt` per image

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{
    check_source_dir, dataset_info, file_stem, image_cell, image_files, main_row, main_table_spec,
    subdirectories, Importer, ItemRows, RowStream, IMAGE_TABLE, MAIN_TABLE, OBJECTS_TABLE,
};
use crate::cells::{BBox, Row, Value};
use crate::core::{Category, DatasetInfo, PixanoError, Result, TableGroup, TableSpec, GROUND_TRUTH};

const VIEW: &str = "image";
const IMAGES_DIR: &str = "images";
const LABELS_DIR: &str = "labelTxt";

/// DOTA v1.5 classes; category ids are 1-based positions in this list
pub const DOTA_CATEGORIES: &[&str] = &[
    "plane",
    "ship",
    "storage-tank",
    "baseball-diamond",
    "tennis-court",
    "basketball-court",
    "ground-track-field",
    "harbor",
    "bridge",
    "large-vehicle",
    "small-vehicle",
    "helicopter",
    "roundabout",
    "soccer-ball-field",
    "swimming-pool",
    "container-crane",
];

/// One oriented box of a label file
#[derive(Debug, Clone, PartialEq)]
pub struct DotaLabel {
    /// Four `(x, y)` corners in pixels
    pub corners: [(f64, f64); 4],
    pub category: String,
    pub difficult: bool,
}

impl DotaLabel {
    /// Axis-aligned pixel xyxy spanned by corners 1 and 3
    pub fn xyxy(&self) -> [f64; 4] {
        let (x1, y1) = self.corners[0];
        let (x3, y3) = self.corners[2];
        [x1.min(x3), y1.min(y3), x1.max(x3), y1.max(y3)]
    }
}

/// Parse a `labelTxt` file, skipping the `imagesource:`/`gsd:` header lines
pub fn parse_labels(content: &str) -> Result<Vec<DotaLabel>> {
    let mut labels = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 {
            continue;
        }
        let mut coords = [0.0f64; 8];
        for (slot, part) in coords.iter_mut().zip(&parts[..8]) {
            *slot = part.parse().map_err(|_| {
                PixanoError::SchemaMismatch(format!("line {}: bad coordinate {:?}", line_no + 1, part))
            })?;
        }
        labels.push(DotaLabel {
            corners: [
                (coords[0], coords[1]),
                (coords[2], coords[3]),
                (coords[4], coords[5]),
                (coords[6], coords[7]),
            ],
            category: parts[8].to_string(),
            difficult: parts.get(9).map_or(false, |flag| *flag == "1"),
        });
    }
    Ok(labels)
}

pub fn category_id(name: &str) -> Option<i64> {
    DOTA_CATEGORIES
        .iter()
        .position(|category| *category == name)
        .map(|index| index as i64 + 1)
}

pub struct DotaImporter {
    info: DatasetInfo,
    input_dir: PathBuf,
}

impl DotaImporter {
    pub fn new(
        name: &str,
        description: &str,
        input_dir: impl Into<PathBuf>,
        splits: Option<Vec<String>>,
    ) -> Result<Self> {
        let input_dir = input_dir.into();
        check_source_dir(&input_dir)?;
        let splits = match splits {
            Some(splits) => splits,
            None => subdirectories(&input_dir)?,
        };

        let mut info = dataset_info(name, description, &splits);
        info.add_table(TableGroup::Main, main_table_spec(&[]));
        info.add_table(
            TableGroup::Media,
            TableSpec::new(IMAGE_TABLE, &[("id", "str"), (VIEW, "image")]),
        );
        info.add_table(
            TableGroup::Objects,
            TableSpec::new(
                OBJECTS_TABLE,
                &[
                    ("id", "str"),
                    ("item_id", "str"),
                    ("view_id", "str"),
                    ("bbox", "bbox"),
                    ("category_id", "int"),
                    ("category", "str"),
                    ("difficult", "bool"),
                ],
            )
            .with_source(GROUND_TRUTH),
        );
        info.categories = Some(
            DOTA_CATEGORIES
                .iter()
                .enumerate()
                .map(|(index, name)| Category {
                    id: index as i64 + 1,
                    name: name.to_string(),
                    supercategory: None,
                })
                .collect(),
        );

        Ok(Self { info, input_dir })
    }

    fn item_rows(&self, split: &str, image_path: &Path) -> Result<ItemRows> {
        let item_id = file_stem(image_path);
        let file_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let uri = format!("{}/{}/{}", split, IMAGES_DIR, file_name);

        let size = imagesize::size(image_path)
            .map_err(|e| PixanoError::MissingSource(format!("{}: {}", image_path.display(), e)))?;

        let mut item = ItemRows::new();
        item.push(TableGroup::Main, MAIN_TABLE, main_row(&item_id, &[VIEW], split));

        let mut media = Row::new();
        media.insert("id".into(), item_id.as_str().into());
        media.insert(VIEW.into(), Value::Image(image_cell(&self.input_dir, &uri)?));
        item.push(TableGroup::Media, IMAGE_TABLE, media);

        let label_path = self
            .input_dir
            .join(split)
            .join(LABELS_DIR)
            .join(format!("{}.txt", item_id));
        let labels = match std::fs::read_to_string(&label_path) {
            Ok(content) => parse_labels(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("📭 No labels for {}", image_path.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let (width, height) = (size.width as f64, size.height as f64);
        for (index, label) in labels.iter().enumerate() {
            let [x0, y0, x1, y1] = label.xyxy();
            let coords = [
                (x0 / width).clamp(0.0, 1.0) as f32,
                (y0 / height).clamp(0.0, 1.0) as f32,
                (x1 / width).clamp(0.0, 1.0) as f32,
                (y1 / height).clamp(0.0, 1.0) as f32,
            ];

            let mut row = Row::new();
            row.insert("id".into(), format!("{}_{}", item_id, index).into());
            row.insert("item_id".into(), item_id.as_str().into());
            row.insert("view_id".into(), VIEW.into());
            row.insert("bbox".into(), Value::BBox(BBox::from_xyxy(coords, true)?));
            row.insert(
                "category_id".into(),
                category_id(&label.category).map_or(Value::Null, Value::Int),
            );
            row.insert("category".into(), label.category.as_str().into());
            row.insert("difficult".into(), Value::Bool(label.difficult));
            item.push(TableGroup::Objects, OBJECTS_TABLE, row);
        }
        Ok(item)
    }
}

impl Importer for DotaImporter {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn media_sources(&self) -> BTreeMap<String, PathBuf> {
        BTreeMap::from([(VIEW.to_string(), self.input_dir.clone())])
    }

    fn categorical_fields(&self) -> Vec<(TableGroup, String)> {
        vec![(TableGroup::Objects, "category".to_string())]
    }

    fn import_rows(&self) -> Result<RowStream<'_>> {
        let mut work = Vec::new();
        for split in &self.info.splits {
            let images_dir = self.input_dir.join(split).join(IMAGES_DIR);
            for path in image_files(&images_dir)? {
                work.push((split.clone(), path));
            }
        }
        tracing::info!("🔍 DOTA: {} images in {} splits", work.len(), self.info.splits.len());
        Ok(Box::new(
            work.into_iter()
                .map(move |(split, path)| self.item_rows(&split, &path)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels_skips_header() {
        let content = "imagesource:GoogleEarth\ngsd:0.146\n\
                       10 20 50 20 50 80 10 80 plane 0\n\
                       60.5 70 30 70 30 10 60.5 10 small-vehicle 1\n";
        let labels = parse_labels(content).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].xyxy(), [10.0, 20.0, 50.0, 80.0]);
        assert_eq!(labels[1].xyxy(), [30.0, 10.0, 60.5, 70.0]);
        assert!(labels[1].difficult);
    }

    #[test]
    fn test_category_ids() {
        assert_eq!(category_id("plane"), Some(1));
        assert_eq!(category_id("container-crane"), Some(16));
        assert_eq!(category_id("ufo"), None);
    }

    #[test]
    fn test_bad_coordinate_is_schema_mismatch() {
        assert!(matches!(
            parse_labels("a 20 50 20 50 80 10 80 plane 0"),
            Err(PixanoError::SchemaMismatch(_))
        ));
    }
}
