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

//! Pixano legacy importer
//!
//! One `<view>.json` manifest per view lists frames with their annotations. Frames of
//! different views sharing a timestamp form one item. Geometry vertices are normalized
//! `x, y` pairs.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::{
    check_source_dir, dataset_info, file_stem, image_cell, main_row, main_table_spec, Importer, ItemRows,
    RowStream, IMAGE_TABLE, MAIN_TABLE, OBJECTS_TABLE,
};
use crate::cells::{BBox, Row, Value};
use crate::codec::{polygons_to_rle, CompressedRle};
use crate::core::{Category, DatasetInfo, PixanoError, Result, TableGroup, TableSpec, GROUND_TRUTH};

const DEFAULT_SPLIT: &str = "default";

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    pub timestamp: i64,
    /// Media file relative to the input directory
    pub path: String,
    #[serde(default)]
    pub split: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: Option<String>,
    pub category: String,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Polygon { vertices: Vec<f64> },
    Mpolygon { vertices: Vec<Vec<f64>> },
    /// `[x0, y0, x1, y1]`
    Rectangle { vertices: Vec<f64> },
}

impl Geometry {
    /// Mask (polygons) or box (rectangles) in the frame of a `width` x `height` image
    pub fn to_cells(&self, width: usize, height: usize) -> Result<(Option<CompressedRle>, BBox)> {
        let polygons = match self {
            Geometry::Rectangle { vertices } => {
                let coords: [f64; 4] = vertices.as_slice().try_into().map_err(|_| {
                    PixanoError::InvalidCell(format!("rectangle needs 4 vertices, got {}", vertices.len()))
                })?;
                let clamped = coords.map(|c| c.clamp(0.0, 1.0) as f32);
                return Ok((None, BBox::from_xyxy(clamped, true)?.to_xywh()));
            }
            Geometry::Polygon { vertices } => vec![vertices.clone()],
            Geometry::Mpolygon { vertices } => vertices.clone(),
        };

        let pixels: Vec<Vec<f64>> = polygons
            .iter()
            .map(|polygon| {
                polygon
                    .chunks_exact(2)
                    .flat_map(|point| [point[0] * width as f64, point[1] * height as f64])
                    .collect()
            })
            .collect();
        let rle = polygons_to_rle(&pixels, height, width)?;
        let bbox = BBox::from_rle(&rle)?;
        Ok((Some(rle), bbox))
    }
}

pub struct LegacyImporter {
    info: DatasetInfo,
    input_dir: PathBuf,
    views: Vec<String>,
    /// timestamp -> view -> frame
    items: BTreeMap<i64, BTreeMap<String, Frame>>,
    category_ids: BTreeMap<String, i64>,
}

impl LegacyImporter {
    pub fn new(name: &str, description: &str, input_dir: impl Into<PathBuf>) -> Result<Self> {
        let input_dir = input_dir.into();
        check_source_dir(&input_dir)?;

        let pattern = input_dir.join("*.json");
        let mut manifests: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| PixanoError::MissingSource(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .collect();
        manifests.sort();
        if manifests.is_empty() {
            return Err(PixanoError::MissingSource(format!(
                "no view manifest under {}",
                input_dir.display()
            )));
        }

        let mut views = Vec::new();
        let mut items: BTreeMap<i64, BTreeMap<String, Frame>> = BTreeMap::new();
        let mut names = BTreeSet::new();
        for path in &manifests {
            let view = file_stem(path);
            let manifest: Manifest = serde_json::from_slice(&std::fs::read(path)?)?;
            for frame in manifest.frames {
                names.extend(frame.annotations.iter().map(|a| a.category.clone()));
                items.entry(frame.timestamp).or_default().insert(view.clone(), frame);
            }
            views.push(view);
        }

        // Ids follow the sorted category names
        let category_ids: BTreeMap<String, i64> = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name, index as i64 + 1))
            .collect();

        let splits: Vec<String> = items
            .values()
            .flat_map(|frames| frames.values())
            .map(|frame| frame.split.clone().unwrap_or_else(|| DEFAULT_SPLIT.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut info = dataset_info(name, description, &splits);
        info.add_table(TableGroup::Main, main_table_spec(&[]));
        let mut media_fields = vec![("id", "str")];
        media_fields.extend(views.iter().map(|view| (view.as_str(), "image")));
        info.add_table(TableGroup::Media, TableSpec::new(IMAGE_TABLE, &media_fields));
        info.add_table(
            TableGroup::Objects,
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
                ],
            )
            .with_source(GROUND_TRUTH),
        );
        if !category_ids.is_empty() {
            info.categories = Some(
                category_ids
                    .iter()
                    .map(|(name, id)| Category {
                        id: *id,
                        name: name.clone(),
                        supercategory: None,
                    })
                    .collect(),
            );
        }

        tracing::info!(
            "🔍 Legacy manifests: {} views, {} timestamps",
            views.len(),
            items.len()
        );
        Ok(Self {
            info,
            input_dir,
            views,
            items,
            category_ids,
        })
    }

    fn item_rows(&self, timestamp: i64, frames: &BTreeMap<String, Frame>) -> Result<ItemRows> {
        let item_id = timestamp.to_string();
        let split = frames
            .values()
            .find_map(|frame| frame.split.as_deref())
            .unwrap_or(DEFAULT_SPLIT);
        let views: Vec<&str> = frames.keys().map(String::as_str).collect();

        let mut item = ItemRows::new();
        item.push(TableGroup::Main, MAIN_TABLE, main_row(&item_id, &views, split));

        let mut media = Row::new();
        media.insert("id".into(), item_id.as_str().into());
        let mut objects = Vec::new();
        for (view, frame) in frames {
            media.insert(view.clone(), Value::Image(image_cell(&self.input_dir, &frame.path)?));
            if frame.annotations.is_empty() {
                continue;
            }

            let path = self.input_dir.join(&frame.path);
            let size = imagesize::size(&path)
                .map_err(|e| PixanoError::MissingSource(format!("{}: {}", path.display(), e)))?;
            for (index, annotation) in frame.annotations.iter().enumerate() {
                let id = annotation
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}_{}", item_id, view, index));
                let (mask, bbox) = match annotation.geometry.to_cells(size.width, size.height) {
                    Ok(cells) => cells,
                    // Sub-pixel polygons cover no pixel centre
                    Err(PixanoError::EmptyMask) => {
                        tracing::warn!("⚠️ Skipping object {} of item {}: empty mask", id, item_id);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let mut row = Row::new();
                row.insert("id".into(), id.into());
                row.insert("item_id".into(), item_id.as_str().into());
                row.insert("view_id".into(), view.as_str().into());
                row.insert("bbox".into(), Value::BBox(bbox));
                row.insert("mask".into(), mask.map_or(Value::Null, Value::Rle));
                row.insert(
                    "category_id".into(),
                    self.category_ids
                        .get(&annotation.category)
                        .copied()
                        .map_or(Value::Null, Value::Int),
                );
                row.insert("category".into(), annotation.category.as_str().into());
                objects.push(row);
            }
        }
        item.push(TableGroup::Media, IMAGE_TABLE, media);
        for row in objects {
            item.push(TableGroup::Objects, OBJECTS_TABLE, row);
        }
        Ok(item)
    }
}

impl Importer for LegacyImporter {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn media_sources(&self) -> BTreeMap<String, PathBuf> {
        self.views
            .iter()
            .map(|view| (view.clone(), self.input_dir.clone()))
            .collect()
    }

    fn categorical_fields(&self) -> Vec<(TableGroup, String)> {
        vec![(TableGroup::Objects, "category".to_string())]
    }

    fn import_rows(&self) -> Result<RowStream<'_>> {
        Ok(Box::new(
            self.items
                .iter()
                .map(move |(timestamp, frames)| self.item_rows(*timestamp, frames)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rle_to_mask;

    #[test]
    fn test_geometry_shapes() {
        let geometry: Geometry = serde_json::from_value(serde_json::json!({
            "type": "rectangle", "vertices": [0.1, 0.2, 0.5, 0.6]
        }))
        .unwrap();
        let (mask, bbox) = geometry.to_cells(100, 50).unwrap();
        assert!(mask.is_none());
        assert!((bbox.coords[2] - 0.4).abs() < 1e-6);

        let geometry: Geometry = serde_json::from_value(serde_json::json!({
            "type": "polygon", "vertices": [0.0, 0.0, 0.5, 0.0, 0.5, 0.5, 0.0, 0.5]
        }))
        .unwrap();
        let (mask, _) = geometry.to_cells(10, 10).unwrap();
        let mask = mask.unwrap();
        assert_eq!(mask.size, [10, 10]);
        assert!(rle_to_mask(&mask).unwrap().iter().any(|&v| v == 1));
    }

    #[test]
    fn test_frames_grouped_by_timestamp() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let png = {
            let img = image::RgbImage::from_pixel(20, 10, image::Rgb([0, 0, 0]));
            let mut out = std::io::Cursor::new(Vec::new());
            img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
            out.into_inner()
        };
        std::fs::write(temp_dir.path().join("f.png"), &png).unwrap();

        let frame = |timestamp: i64, category: &str| {
            serde_json::json!({
                "timestamp": timestamp, "path": "f.png", "split": "train",
                "annotations": [{"category": category,
                                 "geometry": {"type": "rectangle", "vertices": [0, 0, 0.5, 0.5]}}]
            })
        };
        let left = serde_json::json!({"frames": [frame(0, "car"), frame(1, "truck")]});
        let right = serde_json::json!({"frames": [frame(0, "bus")]});
        std::fs::write(temp_dir.path().join("left.json"), left.to_string()).unwrap();
        std::fs::write(temp_dir.path().join("right.json"), right.to_string()).unwrap();

        let importer = LegacyImporter::new("Legacy", "", temp_dir.path()).unwrap();
        let names: Vec<&str> = importer
            .info()
            .categories
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["bus", "car", "truck"]);

        let items: Vec<ItemRows> = importer.import_rows().unwrap().map(|item| item.unwrap()).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].rows(OBJECTS_TABLE).len(), 2);
        assert_eq!(items[1].rows(OBJECTS_TABLE)[0]["category_id"], Value::Int(3));
    }
    #[test]
    fn test_sub_pixel_polygon_is_skipped() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        image::RgbImage::new(10, 10)
            .save(temp_dir.path().join("f.png"))
            .unwrap();

        let polygon = |vertices: serde_json::Value| {
            serde_json::json!({"category": "car", "geometry": {"type": "polygon", "vertices": vertices}})
        };
        let view = serde_json::json!({"frames": [{
            "timestamp": 7, "path": "f.png",
            "annotations": [
                {"id": "tiny", "category": "car",
                 "geometry": {"type": "polygon", "vertices": [0.0, 0.0, 0.01, 0.0, 0.0, 0.01]}},
                polygon(serde_json::json!([0.0, 0.0, 0.5, 0.0, 0.5, 0.5, 0.0, 0.5]))
            ]
        }]});
        std::fs::write(temp_dir.path().join("cam.json"), view.to_string()).unwrap();

        let importer = LegacyImporter::new("Legacy", "", temp_dir.path()).unwrap();
        let items: Vec<ItemRows> = importer.import_rows().unwrap().map(|item| item.unwrap()).collect();
        let objects = items[0].rows(OBJECTS_TABLE);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["id"], Value::Str("7_cam_1".to_string()));
        assert!(matches!(objects[0]["mask"], Value::Rle(_)));
    }
}
