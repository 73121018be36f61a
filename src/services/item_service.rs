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

//! Item assembly: joins the main, media, objects and embedding tables of a dataset
//! into [`DatasetItem`] views, and reconciles edited items back into those tables

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::catalog::Dataset;
use crate::cells::{embedding, ObjectAnnotation, Row, Value};
use crate::core::{natural_key, Page, PixanoError, Result, TableGroup, TableSpec, GROUND_TRUTH, PIXANO_ANNOTATOR};
use crate::importers::slug;
use crate::schema::FieldType;
use crate::storage::{ColumnarTable, Filter};

/// Columns of the main table that are not free features
pub const MAIN_RESERVED: &[&str] = &["id", "split", "views"];

/// Column of the active learning tables used as sort key
pub const ROUND_COLUMN: &str = "round";

/// Table receiving the objects of the annotation UI
pub const ANNOTATOR_TABLE: &str = "obj_annotator";

/// Schema of object tables created on first edit from a new source
pub fn annotator_table_spec(name: &str, source: &str) -> TableSpec {
    TableSpec::new(
        name,
        &[
            ("id", "str"),
            ("item_id", "str"),
            ("view_id", "str"),
            ("bbox", "bbox"),
            ("mask", "compressedrle"),
            ("category_id", "int"),
            ("category_name", "str"),
        ],
    )
    .with_source(source)
}

/// Objects table name of a source
pub fn source_table_name(source: &str) -> String {
    if source == PIXANO_ANNOTATOR {
        ANNOTATOR_TABLE.to_string()
    } else {
        format!("obj_{}", slug(source))
    }
}

/// One item as surfaced to clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    #[serde(default)]
    pub split: String,
    /// Scalar columns of the main table other than id, split and views
    #[serde(default)]
    pub features: BTreeMap<String, serde_json::Value>,
    /// Media column -> cell, joined from the media tables
    #[serde(default, skip_deserializing)]
    pub views: BTreeMap<String, Value>,
    #[serde(default)]
    pub objects: Vec<ObjectAnnotation>,
    /// Model id -> view -> segment embedding
    #[serde(default, skip_deserializing, skip_serializing_if = "BTreeMap::is_empty")]
    pub embeddings: BTreeMap<String, BTreeMap<String, Value>>,
}

impl DatasetItem {
    fn from_main_row(row: &Row) -> Result<Self> {
        let mut item = DatasetItem {
            id: row.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            split: row.get("split").and_then(Value::as_str).unwrap_or_default().to_string(),
            ..Default::default()
        };
        for (name, value) in row {
            if !MAIN_RESERVED.contains(&name.as_str()) {
                item.features.insert(name.clone(), value.to_json()?);
            }
        }
        Ok(item)
    }

    fn attach_media(&mut self, row: &Row) {
        for (name, value) in row {
            if name != "id" {
                self.views.insert(name.clone(), value.clone());
            }
        }
    }
}

/// What [`ItemService::load_item`] joins besides the main row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub media: bool,
    pub objects: bool,
    pub embeddings: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            media: true,
            objects: true,
            embeddings: false,
        }
    }
}

/// Reads and edits the items of one dataset
pub struct ItemService {
    dataset: Dataset,
}

impl ItemService {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    async fn main_row(&self, id: &str) -> Result<(ColumnarTable, Row)> {
        let table = self.dataset.main_table().await?;
        let row = table
            .scan(Some(&Filter::id(id)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PixanoError::EntityNotFound(format!("item {} in {}", id, self.dataset.id())))?;
        Ok((table, row))
    }

    /// Assemble one item; stale object and embedding tables are pruned from `db.json`
    pub async fn load_item(&mut self, id: &str, options: LoadOptions) -> Result<DatasetItem> {
        let (_, row) = self.main_row(id).await?;
        let mut item = DatasetItem::from_main_row(&row)?;

        if options.media {
            for media in self.media_rows(&Filter::id(id)).await? {
                item.attach_media(&media);
            }
        }

        if options.objects {
            self.dataset.prune_missing_tables(TableGroup::Objects).await?;
            item.objects = self.current_objects(id).await?.into_values().map(|(_, o)| o).collect();
            item.objects.sort_by(|a, b| {
                a.source_id
                    .cmp(&b.source_id)
                    .then_with(|| natural_key(&a.id).cmp(&natural_key(&b.id)))
            });
        }

        if options.embeddings {
            self.dataset.prune_missing_tables(TableGroup::Embeddings).await?;
            for spec in self.dataset.info.tables_in(TableGroup::Embeddings) {
                if spec.kind.as_deref() != Some(embedding::SEGMENT) {
                    continue;
                }
                let table = self.dataset.open_table(&spec.name).await?;
                if let Some(row) = table.scan(Some(&Filter::id(id))).await?.into_iter().next() {
                    let model = spec.source.clone().unwrap_or_else(|| spec.name.clone());
                    item.embeddings.insert(model, without_id(row));
                }
            }
        }

        tracing::debug!(
            "🔍 Loaded item {} of {} ({} objects)",
            id,
            self.dataset.id(),
            item.objects.len()
        );
        Ok(item)
    }

    /// Page of items with their media, in active-learning order when a round column
    /// exists, otherwise by `(len(id), id)`
    pub async fn load_items(&self, limit: usize, offset: usize) -> Result<Page<DatasetItem>> {
        let mut rows = self.dataset.main_table().await?.scan(None).await?;
        let rounds = self.rounds().await?;

        let id_of = |row: &Row| row.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        rows.sort_by(|a, b| {
            let (a_id, b_id) = (id_of(a), id_of(b));
            let round = |id: &String| rounds.get(id).copied().unwrap_or(f64::NEG_INFINITY);
            round(&b_id)
                .total_cmp(&round(&a_id))
                .then_with(|| natural_key(&a_id).cmp(&natural_key(&b_id)))
        });

        let total = rows.len();
        let mut items: Vec<DatasetItem> = rows
            .iter()
            .skip(offset)
            .take(limit)
            .map(DatasetItem::from_main_row)
            .collect::<Result<_>>()?;

        if !items.is_empty() {
            let filter = Filter::in_set("id", items.iter().map(|item| item.id.clone()));
            let mut media: HashMap<String, Vec<Row>> = HashMap::new();
            for row in self.media_rows(&filter).await? {
                media.entry(id_of(&row)).or_default().push(row);
            }
            for item in &mut items {
                for row in media.get(&item.id).into_iter().flatten() {
                    item.attach_media(row);
                }
            }
        }

        Ok(Page::new(items, total, limit, offset))
    }

    /// Items with their media joined, in the given order; unknown ids are skipped
    pub async fn load_items_by_ids(&self, ids: &[String]) -> Result<Vec<DatasetItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::in_set("id", ids.iter().cloned());
        let main: HashMap<String, Row> = self
            .dataset
            .main_table()
            .await?
            .scan(Some(&filter))
            .await?
            .into_iter()
            .filter_map(|row| Some((row.get("id")?.as_str()?.to_string(), row)))
            .collect();

        let mut items: Vec<DatasetItem> = ids
            .iter()
            .filter_map(|id| main.get(id).map(DatasetItem::from_main_row))
            .collect::<Result<_>>()?;
        let media = self.media_rows(&filter).await?;
        for item in &mut items {
            let id = item.id.clone();
            for row in media.iter().filter(|row| filter_id(row) == Some(id.as_str())) {
                item.attach_media(row);
            }
        }
        Ok(items)
    }

    /// Segment embeddings of one item for one model
    pub async fn load_item_embeddings(&mut self, id: &str, model_id: &str) -> Result<BTreeMap<String, Value>> {
        self.dataset.prune_missing_tables(TableGroup::Embeddings).await?;
        let spec = self
            .dataset
            .info
            .tables_in(TableGroup::Embeddings)
            .iter()
            .find(|spec| {
                spec.kind.as_deref() == Some(embedding::SEGMENT)
                    && (spec.source.as_deref() == Some(model_id) || spec.name == model_id)
            })
            .ok_or_else(|| PixanoError::EntityNotFound(format!("embeddings of model {}", model_id)))?;

        let table = self.dataset.open_table(&spec.name).await?;
        let row = table
            .scan(Some(&Filter::id(id)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PixanoError::EntityNotFound(format!("embeddings of item {}", id)))?;
        Ok(without_id(row))
    }

    /// Write back an edited item: scalar features, then objects of every source
    pub async fn save_item(&mut self, item: &DatasetItem) -> Result<()> {
        let (mut main, mut row) = self.main_row(&item.id).await?;
        self.save_features(&mut main, &mut row, item).await?;

        let mut objects = item.objects.clone();
        for object in &mut objects {
            object.canonicalize()?;
            if object.item_id.is_empty() {
                object.item_id = item.id.clone();
            }
        }

        self.dataset.prune_missing_tables(TableGroup::Objects).await?;
        let current = self.current_objects(&item.id).await?;

        let mut tables: BTreeMap<String, ColumnarTable> = BTreeMap::new();
        let mut appends: BTreeMap<String, Vec<Row>> = BTreeMap::new();
        let mut submitted: HashSet<(String, String)> = HashSet::new();

        for object in &objects {
            let table_name = self.resolve_source_table(&object.source_id).await?;
            if !tables.contains_key(&table_name) {
                tables.insert(table_name.clone(), self.dataset.open_table(&table_name).await?);
            }
            let Some(table) = tables.get_mut(&table_name) else {
                continue;
            };
            let row = object.to_row(table.schema())?;
            let key = (object.source_id.clone(), object.id.clone());
            if current.contains_key(&key) {
                table.update(&Filter::id(object.id.as_str()), row).await?;
            } else {
                appends.entry(table_name.clone()).or_default().push(row);
            }
            submitted.insert(key);
        }

        for (table_name, rows) in &appends {
            if let Some(table) = tables.get_mut(table_name) {
                table.append(rows).await?;
            }
        }

        let mut stale: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, (table_name, _)) in &current {
            if !submitted.contains(key) {
                stale.entry(table_name.clone()).or_default().insert(key.1.clone());
            }
        }
        for (table_name, ids) in stale {
            if !tables.contains_key(&table_name) {
                tables.insert(table_name.clone(), self.dataset.open_table(&table_name).await?);
            }
            if let Some(table) = tables.get_mut(&table_name) {
                let deleted = table.delete(&Filter::in_set("id", ids)).await?;
                tracing::info!("🗑️ Deleted {} objects of item {} from {}", deleted, item.id, table_name);
            }
        }

        for table in tables.values_mut() {
            table.compact().await?;
        }

        tracing::info!(
            "✅ Saved item {} of {} ({} objects)",
            item.id,
            self.dataset.id(),
            objects.len()
        );
        Ok(())
    }

    /// Update main table features, widening the schema for new columns
    async fn save_features(&mut self, main: &mut ColumnarTable, row: &mut Row, item: &DatasetItem) -> Result<()> {
        let mut new_columns = Vec::new();
        for (name, json) in &item.features {
            if MAIN_RESERVED.contains(&name.as_str()) || main.schema().contains(name) {
                continue;
            }
            new_columns.push((name.clone(), infer_field_type(json)));
        }

        if !new_columns.is_empty() {
            main.add_columns(&new_columns).await?;
            let main_name = main.name().to_string();
            if let Some(spec) = self.dataset.info.table_mut(TableGroup::Main, &main_name) {
                for (name, field_type) in &new_columns {
                    spec.fields.insert(name.clone(), field_type.to_string());
                }
            }
            self.dataset.save_info().await?;
            tracing::info!("📝 Added main columns {:?} to {}", new_columns, self.dataset.id());
        }

        let mut changed = !new_columns.is_empty();
        for (name, json) in &item.features {
            if MAIN_RESERVED.contains(&name.as_str()) {
                continue;
            }
            let Some(field_type) = main.schema().field(name) else {
                continue;
            };
            let value = field_type.value_from_json(json)?;
            if row.get(name) != Some(&value) {
                row.insert(name.clone(), value);
                changed = true;
            }
        }
        if !item.split.is_empty() && row.get("split").and_then(Value::as_str) != Some(item.split.as_str()) {
            row.insert("split".into(), item.split.as_str().into());
            changed = true;
        }

        if changed {
            main.update(&Filter::id(item.id.as_str()), row.clone()).await?;
            main.compact().await?;
        }
        Ok(())
    }

    /// Name of the objects table of `source`, created and registered when missing
    async fn resolve_source_table(&mut self, source: &str) -> Result<String> {
        if let Some(spec) = self
            .dataset
            .info
            .tables_in(TableGroup::Objects)
            .iter()
            .find(|spec| spec.source.as_deref().unwrap_or(GROUND_TRUTH) == source)
        {
            return Ok(spec.name.clone());
        }

        let spec = annotator_table_spec(&source_table_name(source), source);
        self.dataset.create_table(&spec).await?;
        let name = spec.name.clone();
        self.dataset.info.add_table(TableGroup::Objects, spec);
        self.dataset.save_info().await?;
        tracing::info!("✅ Registered objects table {} for source {}", name, source);
        Ok(name)
    }

    /// Objects of an item keyed by `(source, id)`, with the table holding each
    async fn current_objects(&self, id: &str) -> Result<BTreeMap<(String, String), (String, ObjectAnnotation)>> {
        let filter = Filter::eq("item_id", id);
        let mut objects = BTreeMap::new();
        for spec in self.dataset.info.tables_in(TableGroup::Objects) {
            let source = spec.source.as_deref().unwrap_or(GROUND_TRUTH);
            let table = self.dataset.open_table(&spec.name).await?;
            for row in table.scan(Some(&filter)).await? {
                let object = ObjectAnnotation::from_row(&row, source)?;
                objects.insert(
                    (source.to_string(), object.id.clone()),
                    (spec.name.clone(), object),
                );
            }
        }
        Ok(objects)
    }

    /// Media rows matching `filter` across every media table present on disk
    async fn media_rows(&self, filter: &Filter) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for spec in self.dataset.info.tables_in(TableGroup::Media) {
            if !self.dataset.table_exists(&spec.name).await? {
                tracing::warn!("⚠️ Media table {} of {} is missing", spec.name, self.dataset.id());
                continue;
            }
            let table = self.dataset.open_table(&spec.name).await?;
            rows.extend(table.scan(Some(filter)).await?);
        }
        Ok(rows)
    }

    /// Item id -> round of the first active learning table on disk
    async fn rounds(&self) -> Result<HashMap<String, f64>> {
        for spec in self.dataset.info.tables_in(TableGroup::ActiveLearning) {
            if !self.dataset.table_exists(&spec.name).await? {
                continue;
            }
            let table = self.dataset.open_table(&spec.name).await?;
            if !table.schema().contains(ROUND_COLUMN) {
                continue;
            }
            return Ok(table
                .scan(None)
                .await?
                .into_iter()
                .filter_map(|row| {
                    let id = row.get("id")?.as_str()?.to_string();
                    let round = row.get(ROUND_COLUMN)?.as_f64()?;
                    Some((id, round))
                })
                .collect());
        }
        Ok(HashMap::new())
    }
}

fn filter_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn without_id(mut row: Row) -> BTreeMap<String, Value> {
    row.remove("id");
    row
}

/// Column type of a feature first seen in a submitted item
fn infer_field_type(json: &serde_json::Value) -> FieldType {
    match json {
        serde_json::Value::Bool(_) => FieldType::Bool,
        serde_json::Value::Number(n) if n.is_i64() => FieldType::Int,
        serde_json::Value::Number(_) => FieldType::Float,
        _ => FieldType::Str,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::BBox;
    use crate::core::DatasetInfo;
    use crate::importers::{main_row, main_table_spec, IMAGE_TABLE, MAIN_TABLE, OBJECTS_TABLE};
    use crate::storage::filesystem::FilesystemFactory;
    use crate::storage::FilesystemConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn dataset(ids: &[&str]) -> (TempDir, Dataset) {
        let temp_dir = TempDir::new().unwrap();
        let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());

        let main_spec = main_table_spec(&[]);
        let media_spec = TableSpec::new(IMAGE_TABLE, &[("id", "str"), ("image", "image")]);
        let objects_spec = TableSpec::new(
            OBJECTS_TABLE,
            &[("id", "str"), ("item_id", "str"), ("view_id", "str"), ("bbox", "bbox"), ("category", "str")],
        )
        .with_source(GROUND_TRUTH);

        let mut info = DatasetInfo::new("items", "Items", "");
        info.add_table(TableGroup::Main, main_spec.clone());
        info.add_table(TableGroup::Media, media_spec.clone());
        info.add_table(TableGroup::Objects, objects_spec.clone());
        let dataset = Dataset::new(fs, temp_dir.path().to_str().unwrap(), info);
        dataset.save_info().await.unwrap();

        let mains: Vec<Row> = ids.iter().map(|id| main_row(id, &["image"], "train")).collect();
        dataset.create_table(&main_spec).await.unwrap().append(&mains).await.unwrap();

        let medias: Vec<Row> = ids
            .iter()
            .map(|id| {
                let mut row = Row::new();
                row.insert("id".into(), (*id).into());
                row.insert("image".into(), Value::Image(crate::cells::Image::new(format!("{}.png", id))));
                row
            })
            .collect();
        dataset.create_table(&media_spec).await.unwrap().append(&medias).await.unwrap();

        let objects: Vec<Row> = (0..3)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".into(), format!("gt{}", i).into());
                row.insert("item_id".into(), ids[0].into());
                row.insert("view_id".into(), "image".into());
                row.insert("category".into(), "dog".into());
                row.insert(
                    "bbox".into(),
                    Value::BBox(BBox::from_xywh([0.1, 0.1, 0.2, 0.2], true).unwrap()),
                );
                row
            })
            .collect();
        dataset.create_table(&objects_spec).await.unwrap().append(&objects).await.unwrap();

        (temp_dir, dataset)
    }

    #[tokio::test]
    async fn test_load_item_joins_tables() {
        let (_dir, dataset) = dataset(&["7", "8"]).await;
        let mut service = ItemService::new(dataset);

        let item = service.load_item("7", LoadOptions::default()).await.unwrap();
        assert_eq!(item.split, "train");
        assert!(matches!(item.views.get("image"), Some(Value::Image(_))));
        assert_eq!(item.objects.len(), 3);
        assert!(item.objects.iter().all(|o| o.source_id == GROUND_TRUTH));

        assert!(matches!(
            service.load_item("nope", LoadOptions::default()).await,
            Err(PixanoError::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_new_feature_widens_main_table() {
        let (_dir, dataset) = dataset(&["7", "8"]).await;
        let mut service = ItemService::new(dataset);

        let mut item = service.load_item("7", LoadOptions::default()).await.unwrap();
        item.features.insert("label".into(), serde_json::json!("cat"));
        service.save_item(&item).await.unwrap();

        let main = service.dataset().main_table().await.unwrap();
        assert!(main.schema().contains("label"));
        let other = main.scan(Some(&Filter::id("8"))).await.unwrap();
        assert_eq!(other[0]["label"], Value::from(""));

        let reloaded = Dataset::load(service.dataset().fs().clone(), &service.dataset().path).await.unwrap();
        assert_eq!(
            reloaded.info.main_table().unwrap().fields.get("label").map(String::as_str),
            Some("str")
        );
        let item = service.load_item("7", LoadOptions::default()).await.unwrap();
        assert_eq!(item.features["label"], serde_json::json!("cat"));
    }

    #[tokio::test]
    async fn test_deleting_all_objects_keeps_tables() {
        let (_dir, dataset) = dataset(&["7"]).await;
        let mut service = ItemService::new(dataset);

        let mut item = service.load_item("7", LoadOptions::default()).await.unwrap();
        item.objects.clear();
        service.save_item(&item).await.unwrap();

        let item = service.load_item("7", LoadOptions::default()).await.unwrap();
        assert!(item.objects.is_empty());
        assert!(service
            .dataset()
            .info
            .table(TableGroup::Objects, OBJECTS_TABLE)
            .is_some());
        assert_eq!(service.dataset().info.main_table().unwrap().name, MAIN_TABLE);
    }

    #[test]
    fn test_source_table_names() {
        assert_eq!(source_table_name(PIXANO_ANNOTATOR), "obj_annotator");
        assert_eq!(source_table_name("SAM vit-h"), "obj_sam_vit_h");
    }

    #[test]
    fn test_item_json_skips_server_side_fields() {
        let item: DatasetItem = serde_json::from_value(serde_json::json!({
            "id": "1", "split": "train", "features": {"label": "x"},
            "views": {"image": {"uri": "a.png"}}, "objects": []
        }))
        .unwrap();
        assert!(item.views.is_empty());
        assert_eq!(item.features["label"], serde_json::json!("x"));
    }
}
