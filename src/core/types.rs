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

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::services::stats_service::Stat;

pub type DatasetId = String;
pub type ItemId = String;

/// Source label of the annotations written at import time
pub const GROUND_TRUTH: &str = "Ground Truth";

/// Source label of annotations created through the annotation UI
pub const PIXANO_ANNOTATOR: &str = "Pixano Annotator";

/// Role of a table inside a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableGroup {
    Main,
    Media,
    Objects,
    Embeddings,
    ActiveLearning,
}

impl TableGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableGroup::Main => "main",
            TableGroup::Media => "media",
            TableGroup::Objects => "objects",
            TableGroup::Embeddings => "embeddings",
            TableGroup::ActiveLearning => "active_learning",
        }
    }
}

impl fmt::Display for TableGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one physical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,

    /// Ordered field name -> field type string
    pub fields: IndexMap<String, String>,

    /// Producer of the table content ("Ground Truth", "Pixano Annotator", a model id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Table flavor ("segment", "search" for embeddings)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(field, ty)| (field.to_string(), ty.to_string()))
                .collect(),
            source: None,
            kind: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Object category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
}

/// Content of `db.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: DatasetId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_size: String,
    #[serde(default)]
    pub num_elements: usize,
    #[serde(default)]
    pub splits: Vec<String>,
    #[serde(default)]
    pub tables: BTreeMap<TableGroup, Vec<TableSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<Stat>>,
}

impl DatasetInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            estimated_size: "N/A".to_string(),
            num_elements: 0,
            splits: Vec::new(),
            tables: BTreeMap::new(),
            categories: None,
            preview: None,
            stats: None,
        }
    }

    /// Tables registered under a group, in declaration order
    pub fn tables_in(&self, group: TableGroup) -> &[TableSpec] {
        self.tables.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn table(&self, group: TableGroup, name: &str) -> Option<&TableSpec> {
        self.tables_in(group).iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, group: TableGroup, name: &str) -> Option<&mut TableSpec> {
        self.tables
            .get_mut(&group)
            .and_then(|tables| tables.iter_mut().find(|t| t.name == name))
    }

    pub fn add_table(&mut self, group: TableGroup, spec: TableSpec) {
        self.tables.entry(group).or_default().push(spec);
    }

    pub fn remove_table(&mut self, group: TableGroup, name: &str) -> bool {
        match self.tables.get_mut(&group) {
            Some(tables) => {
                let before = tables.len();
                tables.retain(|t| t.name != name);
                before != tables.len()
            }
            None => false,
        }
    }

    /// Main table spec (`main.db` by convention)
    pub fn main_table(&self) -> Option<&TableSpec> {
        self.tables_in(TableGroup::Main).first()
    }

    /// Copy stripped of the heavy optional payloads
    pub fn summary(&self) -> DatasetInfo {
        DatasetInfo {
            preview: None,
            stats: None,
            ..self.clone()
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize, limit: usize, offset: usize) -> Self {
        let limit = limit.max(1);
        Self {
            items,
            total,
            page: offset / limit + 1,
            size: limit,
            pages: (total + limit - 1) / limit,
        }
    }
}

/// Stable quasi-natural ordering key: shorter ids first, then lexicographic
pub fn natural_key(id: &str) -> (usize, &str) {
    (id.len(), id)
}
