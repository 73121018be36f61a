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

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use pixanodb::catalog::{DatasetLibrary, PREVIEW_FILE, STATS_FILE};
use pixanodb::cells::Value;
use pixanodb::importers::{CocoImporter, ImportWriter, Importer, MediaTransfer, OBJECTS_TABLE};
use pixanodb::services::stats_service::{Stat, CATEGORY_STAT};
use pixanodb::services::{ItemService, LoadOptions};
use pixanodb::storage::{FilesystemConfig, FilesystemFactory};
use pixanodb::{TableGroup, GROUND_TRUTH};
use tempfile::TempDir;

const OBJECTS_PER_IMAGE: [usize; 3] = [10, 7, 5];

fn write_coco_source(root: &Path) {
    std::fs::create_dir_all(root.join("annotations")).unwrap();
    std::fs::create_dir_all(root.join("val")).unwrap();

    let mut images = Vec::new();
    let mut annotations = Vec::new();
    let mut next_id = 100;
    for (index, count) in OBJECTS_PER_IMAGE.iter().enumerate() {
        let image_id = index as i64 + 1;
        let file_name = format!("{:06}.png", image_id);
        image::RgbImage::from_pixel(40, 20, image::Rgb([10, 20, 30]))
            .save(root.join("val").join(&file_name))
            .unwrap();
        images.push(serde_json::json!({
            "id": image_id, "file_name": file_name, "width": 40, "height": 20
        }));

        for n in 0..*count {
            let x = (n * 3) as f64;
            annotations.push(serde_json::json!({
                "id": next_id,
                "image_id": image_id,
                "category_id": if n % 2 == 0 { 1 } else { 2 },
                "bbox": [x, 2.0, 3.0, 4.0],
                "segmentation": [[x, 2.0, x + 3.0, 2.0, x + 3.0, 6.0, x, 6.0]],
                "area": 12.0,
                "iscrowd": 0
            }));
            next_id += 1;
        }
    }

    let file = serde_json::json!({
        "images": images,
        "annotations": annotations,
        "categories": [
            {"id": 2, "name": "cat", "supercategory": "animal"},
            {"id": 1, "name": "dog", "supercategory": "animal"}
        ]
    });
    std::fs::write(root.join("annotations/instances_val.json"), file.to_string()).unwrap();
}

#[tokio::test]
async fn test_coco_import_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("coco");
    let library_dir = temp_dir.path().join("library");
    std::fs::create_dir_all(&library_dir).unwrap();
    write_coco_source(&source);

    let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());
    let library = DatasetLibrary::new(fs.clone(), library_dir.to_str().unwrap());

    let importer = CocoImporter::new("COCO Sample", "three images", &source, None).unwrap();
    assert_eq!(importer.info().splits, vec!["val"]);
    let target = library.dataset_path(&importer.info().id);
    let dataset = ImportWriter::new(fs.clone(), MediaTransfer::Copy)
        .import_dataset(&importer, &target)
        .await
        .unwrap();

    assert_eq!(dataset.info.id, "coco_sample");
    assert_eq!(dataset.info.num_elements, 3);
    let categories: Vec<&str> = dataset
        .info
        .categories
        .as_ref()
        .unwrap()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(categories, vec!["dog", "cat"]);
    assert_eq!(dataset.open_table(OBJECTS_TABLE).await.unwrap().count_rows(), 22);
    assert!(dataset.info.table(TableGroup::Objects, OBJECTS_TABLE).is_some());

    // Media copied under media/<field>/, source left in place
    assert!(Path::new(&target).join("media/image/val/000001.png").exists());
    assert!(source.join("val/000001.png").exists());
    assert!(Path::new(&target).join(PREVIEW_FILE).exists());

    let stats: Vec<Stat> =
        serde_json::from_slice(&std::fs::read(Path::new(&target).join(STATS_FILE)).unwrap()).unwrap();
    let category_stat = stats.iter().find(|s| s.name == CATEGORY_STAT).unwrap();
    assert_eq!(category_stat.total(), 22);
    assert!(stats.iter().any(|s| s.name == "image - aspect ratio"));

    let listed = library.list(true, true).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].preview.is_some());

    // Every item carries the objects of its image
    let mut service = ItemService::new(library.find("coco_sample").await.unwrap());
    let page = service.load_items(10, 0).await.unwrap();
    assert_eq!(page.total, 3);
    let mut counts = BTreeMap::new();
    for item in &page.items {
        let original_id = item.features["original_id"].as_i64().unwrap();
        assert!(matches!(
            item.views.get("image"),
            Some(Value::Image(cell)) if cell.preview_bytes.is_some()
        ));
        let loaded = service.load_item(&item.id, LoadOptions::default()).await.unwrap();
        assert!(loaded
            .objects
            .iter()
            .all(|o| o.source_id == GROUND_TRUTH && o.mask.is_some() && o.bbox.is_some()));
        counts.insert(original_id, loaded.objects.len());
    }
    assert_eq!(counts, BTreeMap::from([(1, 10), (2, 7), (3, 5)]));
}

#[tokio::test]
async fn test_missing_annotations_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("val")).unwrap();
    std::fs::write(temp_dir.path().join("val/a.png"), b"").unwrap();

    let result = CocoImporter::new("Broken", "", temp_dir.path(), Some(vec!["val".to_string()]));
    assert!(matches!(result, Err(pixanodb::PixanoError::MissingSource(_))));
}
