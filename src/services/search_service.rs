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

//! Similarity search over the search-typed embedding tables of a dataset

use async_trait::async_trait;
use std::collections::HashMap;

use super::item_service::{DatasetItem, ItemService};
use crate::catalog::Dataset;
use crate::cells::{embedding, Value};
use crate::compute::{compare_ranked, nearest, EuclideanDistance};
use crate::core::{Page, PixanoError, Result, TableGroup, TableSpec};
use crate::schema::FieldType;

/// Source tag of the embedding tables a text query can be matched against
pub const ENCODER_TAG: &str = "clip";

/// Turns a text query into a vector comparable with stored search embeddings
#[async_trait]
pub trait QueryEncoder: Send + Sync {
    async fn encode(&self, query: &str, dim: usize) -> Result<Vec<f32>>;
}

pub struct SearchService<'a> {
    dataset: &'a Dataset,
    encoder: &'a dyn QueryEncoder,
}

impl<'a> SearchService<'a> {
    pub fn new(dataset: &'a Dataset, encoder: &'a dyn QueryEncoder) -> Self {
        Self { dataset, encoder }
    }

    /// First search table produced by a recognized encoder
    pub fn search_table(&self) -> Result<&'a TableSpec> {
        self.dataset
            .info
            .tables_in(TableGroup::Embeddings)
            .iter()
            .find(|spec| {
                spec.kind.as_deref() == Some(embedding::SEARCH)
                    && spec
                        .source
                        .as_deref()
                        .map_or(false, |source| source.to_lowercase().contains(ENCODER_TAG))
            })
            .ok_or_else(|| PixanoError::NoSearchIndex(self.dataset.id().to_string()))
    }

    /// Ids ranked by their closest view, at most `k` of them
    pub async fn rank(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>> {
        let spec = self.search_table()?;
        let table = self.dataset.open_table(&spec.name).await?;
        let views: Vec<(String, usize)> = table
            .schema()
            .fields()
            .filter_map(|(name, field_type)| match field_type {
                FieldType::Vector(dim) => Some((name.to_string(), *dim)),
                _ => None,
            })
            .collect();
        let Some(dim) = views.first().map(|(_, dim)| *dim) else {
            return Err(PixanoError::NoSearchIndex(format!(
                "{} has no vector column",
                spec.name
            )));
        };

        let query_vector = self.encoder.encode(query, dim).await?;
        if query_vector.len() != dim {
            return Err(PixanoError::InvalidCell(format!(
                "query vector has {} dims, {} expects {}",
                query_vector.len(),
                spec.name,
                dim
            )));
        }

        let rows = table.scan(None).await?;
        let computer = EuclideanDistance::new(true);
        let mut merged: HashMap<String, f32> = HashMap::new();
        for (view, view_dim) in &views {
            if *view_dim != dim {
                tracing::warn!("⚠️ Skipping view {} of {}: {} dims", view, spec.name, view_dim);
                continue;
            }
            let candidates = rows.iter().filter_map(|row| {
                let id = row.get("id")?.as_str()?;
                match row.get(view)? {
                    Value::Vector(vector) => Some((id, vector.as_slice())),
                    _ => None,
                }
            });
            for (id, distance) in nearest(&computer, &query_vector, candidates, k) {
                merged
                    .entry(id)
                    .and_modify(|best| *best = best.min(distance))
                    .or_insert(distance);
            }
        }

        let mut ranked: Vec<(String, f32)> = merged.into_iter().collect();
        ranked.sort_by(compare_ranked);
        ranked.truncate(k);
        tracing::debug!(
            "🔍 Ranked {} ids of {} over {} views",
            ranked.len(),
            self.dataset.id(),
            views.len()
        );
        Ok(ranked)
    }

    /// Page of items closest to `query`, media joined
    pub async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Page<DatasetItem>> {
        let ranked = self.rank(query, offset.saturating_add(limit)).await?;
        let total = ranked.len();
        let ids: Vec<String> = ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, _)| id)
            .collect();

        let items = ItemService::new(self.dataset.clone()).load_items_by_ids(&ids).await?;
        tracing::info!(
            "🔍 Search '{}' on {}: {} of {} results",
            query,
            self.dataset.id(),
            items.len(),
            total
        );
        Ok(Page::new(items, total, limit, offset))
    }
}
