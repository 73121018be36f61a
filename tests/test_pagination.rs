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
use pixanodb::cells::{Row, Value};
use pixanodb::importers::{main_row, main_table_spec};
use pixanodb::services::ItemService;
use pixanodb::storage::{FilesystemConfig, FilesystemFactory};
use pixanodb::{DatasetInfo, TableGroup, TableSpec};
use tempfile::TempDir;

const IDS: [&str; 7] = ["632", "10", "1", "101", "2", "100", "11"];

async fn dataset(rounds: &[(&str, i64)]) -> (TempDir, Dataset) {
    let temp_dir = TempDir::new().unwrap();
    let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());

    let mut info = DatasetInfo::new("pages", "Pages", "");
    info.add_table(TableGroup::Main, main_table_spec(&[]));
    let al_spec = TableSpec::new("active_learning", &[("id", "str"), ("round", "int")]);
    if !rounds.is_empty() {
        info.add_table(TableGroup::ActiveLearning, al_spec.clone());
    }
    let dataset = Dataset::new(fs, temp_dir.path().to_str().unwrap(), info);
    dataset.save_info().await.unwrap();

    let rows: Vec<Row> = IDS.iter().map(|id| main_row(id, &["image"], "train")).collect();
    dataset
        .create_table(&main_table_spec(&[]))
        .await
        .unwrap()
        .append(&rows)
        .await
        .unwrap();

    if !rounds.is_empty() {
        let rows: Vec<Row> = rounds
            .iter()
            .map(|(id, round)| {
                let mut row = Row::new();
                row.insert("id".into(), (*id).into());
                row.insert("round".into(), Value::Int(*round));
                row
            })
            .collect();
        dataset.create_table(&al_spec).await.unwrap().append(&rows).await.unwrap();
    }
    (temp_dir, dataset)
}

fn ids(items: &[pixanodb::DatasetItem]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}

#[tokio::test]
async fn test_short_ids_first() {
    let (_dir, dataset) = dataset(&[]).await;
    let service = ItemService::new(dataset);

    let first = service.load_items(3, 0).await.unwrap();
    assert_eq!(ids(&first.items), vec!["1", "2", "10"]);
    assert_eq!(first.total, 7);
    assert_eq!(first.page, 1);
    assert_eq!(first.pages, 3);

    let second = service.load_items(3, 3).await.unwrap();
    assert_eq!(ids(&second.items), vec!["11", "100", "101"]);
    assert_eq!(second.page, 2);

    let last = service.load_items(3, 6).await.unwrap();
    assert_eq!(ids(&last.items), vec!["632"]);

    let past_end = service.load_items(3, 7).await.unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, 7);
}

#[tokio::test]
async fn test_active_learning_rounds_first() {
    let (_dir, dataset) = dataset(&[("10", 1), ("632", 2)]).await;
    let service = ItemService::new(dataset);

    let page = service.load_items(10, 0).await.unwrap();
    assert_eq!(ids(&page.items), vec!["632", "10", "1", "2", "11", "100", "101"]);
}
