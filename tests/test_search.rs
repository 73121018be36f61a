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

use async_trait::async_trait;
use std::sync::Arc;

use pixanodb::catalog::Dataset;
use pixanodb::cells::{embedding, Row, Value};
use pixanodb::importers::{main_row, main_table_spec};
use pixanodb::services::{QueryEncoder, SearchService};
use pixanodb::storage::{FilesystemConfig, FilesystemFactory};
use pixanodb::{DatasetInfo, PixanoError, Result, TableGroup, TableSpec};
use tempfile::TempDir;

struct OriginEncoder;

#[async_trait]
impl QueryEncoder for OriginEncoder {
    async fn encode(&self, _query: &str, dim: usize) -> Result<Vec<f32>> {
        Ok(vec![0.0; dim])
    }
}

struct WrongDimEncoder;

#[async_trait]
impl QueryEncoder for WrongDimEncoder {
    async fn encode(&self, _query: &str, dim: usize) -> Result<Vec<f32>> {
        Ok(vec![0.0; dim + 1])
    }
}

/// id -> (left view vector, right view vector)
const VECTORS: [(&str, [f32; 2], [f32; 2]); 4] = [
    ("a1", [0.0, 0.0], [5.0, 5.0]),
    ("b", [3.0, 0.0], [1.0, 0.0]),
    ("c", [2.0, 0.0], [2.0, 0.0]),
    ("10", [1.0, 0.0], [9.0, 9.0]),
];

async fn dataset() -> (TempDir, Dataset) {
    let temp_dir = TempDir::new().unwrap();
    let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());

    let search_spec = TableSpec::new(
        "clip_search",
        &[("id", "str"), ("left", "vector(2)"), ("right", "vector(2)")],
    )
    .with_source("CLIP")
    .with_kind(embedding::SEARCH);

    let mut info = DatasetInfo::new("stereo", "Stereo", "");
    info.add_table(TableGroup::Main, main_table_spec(&[]));
    info.add_table(TableGroup::Embeddings, search_spec.clone());
    let dataset = Dataset::new(fs, temp_dir.path().to_str().unwrap(), info);
    dataset.save_info().await.unwrap();

    let mains: Vec<Row> = VECTORS
        .iter()
        .map(|(id, _, _)| main_row(id, &["left", "right"], "test"))
        .collect();
    dataset
        .create_table(&main_table_spec(&[]))
        .await
        .unwrap()
        .append(&mains)
        .await
        .unwrap();

    let vectors: Vec<Row> = VECTORS
        .iter()
        .map(|(id, left, right)| {
            let mut row = Row::new();
            row.insert("id".into(), (*id).into());
            row.insert("left".into(), Value::Vector(left.to_vec()));
            row.insert("right".into(), Value::Vector(right.to_vec()));
            row
        })
        .collect();
    dataset
        .create_table(&search_spec)
        .await
        .unwrap()
        .append(&vectors)
        .await
        .unwrap();

    (temp_dir, dataset)
}

fn ids(page: &pixanodb::Page<pixanodb::DatasetItem>) -> Vec<&str> {
    page.items.iter().map(|item| item.id.as_str()).collect()
}

#[tokio::test]
async fn test_views_merged_by_closest_distance() {
    let (_dir, dataset) = dataset().await;
    let service = SearchService::new(&dataset, &OriginEncoder);

    // "b" and "10" tie at distance 1; the shorter id wins
    let page = service.search("a dog", 10, 0).await.unwrap();
    assert_eq!(ids(&page), vec!["a1", "b", "10", "c"]);
    assert_eq!(page.total, 4);

    let page = service.search("a dog", 2, 2).await.unwrap();
    assert_eq!(ids(&page), vec!["10", "c"]);
    assert_eq!(page.page, 2);

    let page = service.search("a dog", 2, 0).await.unwrap();
    assert_eq!(ids(&page), vec!["a1", "b"]);
}

#[tokio::test]
async fn test_offset_past_results_is_empty() {
    let (_dir, dataset) = dataset().await;
    let service = SearchService::new(&dataset, &OriginEncoder);
    let page = service.search("a dog", 5, 10).await.unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_query_dimension_is_checked() {
    let (_dir, dataset) = dataset().await;
    let service = SearchService::new(&dataset, &WrongDimEncoder);
    assert!(matches!(
        service.search("a dog", 5, 0).await,
        Err(PixanoError::InvalidCell(_))
    ));
}
