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

use std::sync::Arc;

use pixanodb::catalog::Dataset;
use pixanodb::cells::{BBox, MaskValue, ObjectAnnotation, Row, Value};
use pixanodb::codec::Urle;
use pixanodb::importers::{main_row, main_table_spec, OBJECTS_TABLE};
use pixanodb::services::item_service::ANNOTATOR_TABLE;
use pixanodb::services::{ItemService, LoadOptions};
use pixanodb::storage::{FilesystemConfig, FilesystemFactory};
use pixanodb::{DatasetInfo, TableGroup, TableSpec, GROUND_TRUTH, PIXANO_ANNOTATOR};
use tempfile::TempDir;

async fn dataset_with_objects(item_id: &str, count: usize) -> (TempDir, Dataset) {
    let temp_dir = TempDir::new().unwrap();
    let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());

    let objects_spec = TableSpec::new(
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
    .with_source(GROUND_TRUTH);

    let mut info = DatasetInfo::new("edits", "Edits", "");
    info.add_table(TableGroup::Main, main_table_spec(&[]));
    info.add_table(TableGroup::Objects, objects_spec.clone());
    let dataset = Dataset::new(fs, temp_dir.path().to_str().unwrap(), info);
    dataset.save_info().await.unwrap();

    dataset
        .create_table(&main_table_spec(&[]))
        .await
        .unwrap()
        .append(&[main_row(item_id, &["image"], "val")])
        .await
        .unwrap();

    let rows: Vec<Row> = (0..count)
        .map(|i| {
            let mut row = Row::new();
            row.insert("id".into(), format!("gt_{}", i).into());
            row.insert("item_id".into(), item_id.into());
            row.insert("view_id".into(), "image".into());
            row.insert(
                "bbox".into(),
                Value::BBox(BBox::from_xywh([0.01 * i as f32, 0.1, 0.05, 0.05], true).unwrap()),
            );
            row.insert("mask".into(), Value::Null);
            row.insert("category_id".into(), Value::Int(1));
            row.insert("category".into(), "person".into());
            row
        })
        .collect();
    dataset
        .create_table(&objects_spec)
        .await
        .unwrap()
        .append(&rows)
        .await
        .unwrap();

    (temp_dir, dataset)
}

#[tokio::test]
async fn test_annotator_object_round_trip() {
    let (_dir, dataset) = dataset_with_objects("632", 18).await;
    let path = dataset.path.clone();
    let fs = dataset.fs().clone();
    let mut service = ItemService::new(dataset);

    let mut item = service.load_item("632", LoadOptions::default()).await.unwrap();
    assert_eq!(item.objects.len(), 18);

    // New object from the annotation UI: URLE mask, zero box
    let mut object = ObjectAnnotation::new("new_1", "632", PIXANO_ANNOTATOR);
    object.view_id = Some("image".to_string());
    object.bbox = Some(BBox::from_xywh([0.0, 0.0, 0.0, 0.0], true).unwrap());
    object.mask = Some(MaskValue::Urle(Urle {
        size: [10, 10],
        counts: vec![45, 2, 8, 3, 8, 2, 32],
    }));
    object.category_name = Some("dog".to_string());
    item.objects.push(object);
    service.save_item(&item).await.unwrap();

    let reloaded = Dataset::load(fs.clone(), &path).await.unwrap();
    let spec = reloaded.info.table(TableGroup::Objects, ANNOTATOR_TABLE).unwrap();
    assert_eq!(spec.source.as_deref(), Some(PIXANO_ANNOTATOR));

    let mut item = service.load_item("632", LoadOptions::default()).await.unwrap();
    assert_eq!(item.objects.len(), 19);
    let added = item.objects.iter().find(|o| o.id == "new_1").unwrap();
    assert_eq!(added.source_id, PIXANO_ANNOTATOR);
    assert!(matches!(added.mask, Some(MaskValue::Rle(_))));
    let bbox = added.bbox.as_ref().unwrap();
    assert!(!bbox.is_zero());
    assert_eq!(added.category_name.as_deref(), Some("dog"));

    // Ground truth sorts before the annotator source
    assert_eq!(item.objects[0].source_id, GROUND_TRUTH);
    assert_eq!(item.objects[18].id, "new_1");

    item.objects.retain(|o| o.id != "new_1");
    service.save_item(&item).await.unwrap();

    let item = service.load_item("632", LoadOptions::default()).await.unwrap();
    assert_eq!(item.objects.len(), 18);
    let reloaded = Dataset::load(fs, &path).await.unwrap();
    assert!(reloaded.info.table(TableGroup::Objects, ANNOTATOR_TABLE).is_some());
    assert_eq!(
        reloaded.open_table(ANNOTATOR_TABLE).await.unwrap().count_rows(),
        0
    );
}

#[tokio::test]
async fn test_edited_object_is_updated_in_place() {
    let (_dir, dataset) = dataset_with_objects("7", 3).await;
    let mut service = ItemService::new(dataset);

    let mut item = service.load_item("7", LoadOptions::default()).await.unwrap();
    let target = item.objects.iter_mut().find(|o| o.id == "gt_1").unwrap();
    target.category_name = Some("cyclist".to_string());
    target.category_id = Some(2);
    service.save_item(&item).await.unwrap();

    let objects = service.dataset().open_table(OBJECTS_TABLE).await.unwrap();
    assert_eq!(objects.count_rows(), 3);
    let item = service.load_item("7", LoadOptions::default()).await.unwrap();
    let edited = item.objects.iter().find(|o| o.id == "gt_1").unwrap();
    assert_eq!(edited.category_name.as_deref(), Some("cyclist"));
    assert_eq!(edited.category_id, Some(2));
    assert!(service
        .dataset()
        .info
        .table(TableGroup::Objects, ANNOTATOR_TABLE)
        .is_none());
}
