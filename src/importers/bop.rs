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

//! BOP webdataset importer
//!
//! Each split directory holds tar shards; the members of one sample share a key
//! (`<key>.rgb.png`, `<key>.depth.png`, `<key>.camera.json`, `<key>.gt.json`,
//! `<key>.gt_info.json`).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{
    check_source_dir, dataset_info, main_row, main_table_spec, normalized_xywh, subdirectories, Importer,
    ItemRows, RowStream, IMAGE_TABLE, MAIN_TABLE, OBJECTS_TABLE,
};
use crate::cells::{Camera, DepthImage, GtInfo, Image, Pose, Row, Value};
use crate::core::{DatasetInfo, PixanoError, Result, TableGroup, TableSpec, GROUND_TRUTH};

const RGB: &str = "rgb";
const DEPTH: &str = "depth";
const CAMERA: &str = "camera";

/// Members of one sample keyed by their extension (`rgb.png`, `gt.json`, ...)
pub type Sample = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, Deserialize)]
struct GtEntry {
    obj_id: i64,
    #[serde(flatten)]
    pose: Pose,
}

#[derive(Debug, Clone, Deserialize)]
struct GtInfoEntry {
    /// Pixel xywh
    bbox_obj: [f64; 4],
    bbox_visib: [f64; 4],
    px_count_all: i32,
    px_count_valid: i32,
    px_count_visib: i32,
    visib_fract: f32,
}

pub struct BopImporter {
    info: DatasetInfo,
    input_dir: PathBuf,
}

impl BopImporter {
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
            TableSpec::new(
                IMAGE_TABLE,
                &[("id", "str"), (RGB, "image"), (DEPTH, "depthimage"), (CAMERA, "camera")],
            ),
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
                    ("pose", "pose"),
                    ("gt_info", "gtinfo"),
                    ("category_id", "int"),
                ],
            )
            .with_source(GROUND_TRUTH),
        );
        Ok(Self { info, input_dir })
    }

    fn shards(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut shards = Vec::new();
        for split in &self.info.splits {
            let pattern = self.input_dir.join(split).join("*.tar");
            let entries = glob::glob(&pattern.to_string_lossy())
                .map_err(|e| PixanoError::MissingSource(e.to_string()))?;
            let mut paths: Vec<PathBuf> = entries.filter_map(|entry| entry.ok()).collect();
            paths.sort();
            shards.extend(paths.into_iter().map(|path| (split.clone(), path)));
        }
        Ok(shards)
    }
}

impl Importer for BopImporter {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    // RGB bytes travel inline; the writer stores them under media/rgb/
    fn media_sources(&self) -> BTreeMap<String, PathBuf> {
        BTreeMap::new()
    }

    fn import_rows(&self) -> Result<RowStream<'_>> {
        let shards = self.shards()?;
        tracing::info!("🔍 BOP: {} shards", shards.len());
        let stream = shards.into_iter().flat_map(|(split, path)| -> RowStream<'static> {
            match read_shard(&path) {
                Ok(samples) => Box::new(
                    samples
                        .into_iter()
                        .map(move |(key, sample)| sample_rows(&split, &key, &sample)),
                ),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        });
        Ok(Box::new(stream))
    }
}

/// Group the members of a tar shard by sample key
pub fn read_shard(path: &Path) -> Result<BTreeMap<String, Sample>> {
    let file = std::fs::File::open(path)
        .map_err(|e| PixanoError::MissingSource(format!("{}: {}", path.display(), e)))?;
    let mut archive = tar::Archive::new(file);

    let mut samples: BTreeMap<String, Sample> = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member = entry.path()?.to_string_lossy().to_string();
        let base = member.rsplit('/').next().unwrap_or(&member).to_string();
        let Some((key, extension)) = base.split_once('.') else {
            continue;
        };
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        samples
            .entry(key.to_string())
            .or_default()
            .insert(extension.to_string(), data);
    }
    tracing::debug!("📦 Shard {}: {} samples", path.display(), samples.len());
    Ok(samples)
}

fn member<'a>(sample: &'a Sample, key: &str, extensions: &[&str]) -> Result<(&'a str, &'a [u8])> {
    extensions
        .iter()
        .find_map(|extension| {
            sample
                .get_key_value(*extension)
                .map(|(name, data)| (name.as_str(), data.as_slice()))
        })
        .ok_or_else(|| PixanoError::SchemaMismatch(format!("sample {} has no {}", key, extensions.join("/"))))
}

/// Main, media and object rows of one sample
pub fn sample_rows(split: &str, key: &str, sample: &Sample) -> Result<ItemRows> {
    let item_id = format!("{}_{}", split, key);

    let (rgb_ext, rgb_raw) = member(sample, key, &["rgb.png", "rgb.jpg", "rgb.jpeg"])?;
    let size = imagesize::blob_size(rgb_raw)
        .map_err(|e| PixanoError::InvalidCell(format!("rgb of {}: {}", key, e)))?;
    let mut rgb = Image::from_file_bytes(format!("{}/{}.{}", split, key, rgb_ext), rgb_raw)?;
    rgb.bytes = Some(rgb_raw.to_vec());

    let (_, depth_raw) = member(sample, key, &["depth.png"])?;
    let depth = DepthImage::from_encoded(depth_raw)?;
    let (_, camera_raw) = member(sample, key, &["camera.json"])?;
    let camera: Camera = serde_json::from_slice(camera_raw)?;

    let mut item = ItemRows::new();
    item.push(TableGroup::Main, MAIN_TABLE, main_row(&item_id, &[RGB, DEPTH], split));

    let mut media = Row::new();
    media.insert("id".into(), item_id.as_str().into());
    media.insert(RGB.into(), Value::Image(rgb));
    media.insert(DEPTH.into(), Value::DepthImage(depth));
    media.insert(CAMERA.into(), Value::Camera(camera));
    item.push(TableGroup::Media, IMAGE_TABLE, media);

    let gt: Vec<GtEntry> = match sample.get("gt.json") {
        Some(raw) => serde_json::from_slice(raw)?,
        None => Vec::new(),
    };
    let gt_info: Vec<GtInfoEntry> = match sample.get("gt_info.json") {
        Some(raw) => serde_json::from_slice(raw)?,
        None => Vec::new(),
    };

    for (index, entry) in gt.into_iter().enumerate() {
        let mut row = Row::new();
        row.insert("id".into(), format!("{}_{}", item_id, index).into());
        row.insert("item_id".into(), item_id.as_str().into());
        row.insert("view_id".into(), RGB.into());
        row.insert("category_id".into(), Value::Int(entry.obj_id));
        row.insert("pose".into(), Value::Pose(entry.pose));

        if let Some(info) = gt_info.get(index) {
            let bbox_visib = normalized_xywh(info.bbox_visib, size.width, size.height)?;
            row.insert("bbox".into(), Value::BBox(bbox_visib.clone()));
            row.insert(
                "gt_info".into(),
                Value::GtInfo(GtInfo {
                    bbox_obj: normalized_xywh(info.bbox_obj, size.width, size.height)?,
                    bbox_visib,
                    px_count_all: info.px_count_all,
                    px_count_valid: info.px_count_valid,
                    px_count_visib: info.px_count_visib,
                    visib_fract: info.visib_fract.clamp(0.0, 1.0),
                }),
            );
        }
        item.push(TableGroup::Objects, OBJECTS_TABLE, row);
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    fn sample() -> Sample {
        let rgb = encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([1, 2, 3]))));
        let depth = encode(DynamicImage::ImageLuma16(ImageBuffer::<Luma<u16>, Vec<u16>>::from_pixel(
            40,
            20,
            Luma([1200]),
        )));
        let camera = serde_json::json!({"cam_K": [500.0, 0.0, 20.0, 0.0, 500.0, 10.0, 0.0, 0.0, 1.0], "depth_scale": 0.1});
        let gt = serde_json::json!([
            {"obj_id": 5, "cam_R_m2c": [1, 0, 0, 0, 1, 0, 0, 0, 1], "cam_t_m2c": [0, 0, 500]},
            {"obj_id": 8, "cam_R_m2c": [1, 0, 0, 0, 1, 0, 0, 0, 1], "cam_t_m2c": [10, 0, 400]}
        ]);
        let gt_info = serde_json::json!([
            {"bbox_obj": [4, 2, 8, 6], "bbox_visib": [4, 2, 8, 6], "px_count_all": 48,
             "px_count_valid": 48, "px_count_visib": 48, "visib_fract": 1.0},
            {"bbox_obj": [-5, 0, 10, 10], "bbox_visib": [-1, -1, -1, -1], "px_count_all": 40,
             "px_count_valid": 40, "px_count_visib": 0, "visib_fract": 0.0}
        ]);

        BTreeMap::from([
            ("rgb.png".to_string(), rgb),
            ("depth.png".to_string(), depth),
            ("camera.json".to_string(), camera.to_string().into_bytes()),
            ("gt.json".to_string(), gt.to_string().into_bytes()),
            ("gt_info.json".to_string(), gt_info.to_string().into_bytes()),
        ])
    }

    #[test]
    fn test_sample_rows() {
        let item = sample_rows("test", "000001_000003", &sample()).unwrap();

        let media = &item.rows(IMAGE_TABLE)[0];
        match &media[RGB] {
            Value::Image(image) => {
                assert_eq!(image.uri, "test/000001_000003.rgb.png");
                assert!(image.bytes.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        match &media[DEPTH] {
            Value::DepthImage(depth) => assert_eq!(depth.shape, [20, 40]),
            other => panic!("unexpected {:?}", other),
        }

        let objects = item.rows(OBJECTS_TABLE);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1]["category_id"], Value::Int(8));
        match &objects[0]["bbox"] {
            Value::BBox(bbox) => assert!((bbox.coords[0] - 0.1).abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_shard_groups_by_key() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("shard-000000.tar");
        let mut builder = tar::Builder::new(std::fs::File::create(&path).unwrap());
        for (extension, data) in sample() {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("000001_000003.{}", extension), data.as_slice())
                .unwrap();
        }
        builder.finish().unwrap();
        drop(builder);

        let samples = read_shard(&path).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples["000001_000003"].len(), 5);
    }

    #[test]
    fn test_missing_member_is_schema_mismatch() {
        let mut incomplete = sample();
        incomplete.remove("depth.png");
        assert!(matches!(
            sample_rows("test", "k", &incomplete),
            Err(PixanoError::SchemaMismatch(_))
        ));
    }
}
