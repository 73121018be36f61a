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

//! Shared batch writer of every importer

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use super::features::FeatureValues;
use super::preview;
use super::{Importer, ItemRows, MAIN_TABLE};
use crate::catalog::{Dataset, FEATURES_FILE, PREVIEW_FILE};
use crate::cells::{Row, Value};
use crate::core::{Category, PixanoError, Result, TableGroup};
use crate::services::stats_service;
use crate::storage::filesystem::{self, FilesystemFactory};
use crate::storage::{ColumnarTable, BATCH_SIZE};

/// What happens to source media files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MediaTransfer {
    /// Copy into `<dataset>/media/<field>/`
    #[default]
    Copy,
    /// Move into `<dataset>/media/<field>/`
    Move,
    /// Leave files in place; URIs become absolute
    None,
}

struct PendingTable {
    group: TableGroup,
    table: ColumnarTable,
    buffer: Vec<Row>,
}

/// Source file to bring under the dataset media directory
struct MediaFile {
    source: PathBuf,
    destination: String,
}

/// Streams importer rows into a new dataset directory
pub struct ImportWriter {
    fs: Arc<FilesystemFactory>,
    transfer: MediaTransfer,
    batch_size: usize,
}

impl ImportWriter {
    pub fn new(fs: Arc<FilesystemFactory>, transfer: MediaTransfer) -> Self {
        Self {
            fs,
            transfer,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build the dataset at `target` from everything the importer yields
    pub async fn import_dataset(&self, importer: &dyn Importer, target: &str) -> Result<Dataset> {
        let info = importer.info().clone();
        tracing::info!("🚀 Importing dataset {} into {}", info.id, target);

        self.fs.create_dir_all(target).await?;
        let mut dataset = Dataset::new(self.fs.clone(), target, info);

        let mut tables: HashMap<String, PendingTable> = HashMap::new();
        for (group, specs) in &dataset.info.tables {
            for spec in specs {
                let table = dataset.create_table(spec).await?;
                tables.insert(
                    spec.name.clone(),
                    PendingTable {
                        group: *group,
                        table,
                        buffer: Vec::new(),
                    },
                );
            }
        }

        let sources = importer.media_sources();
        let categorical = importer.categorical_fields();
        let tracked = |group: TableGroup| -> Vec<String> {
            categorical
                .iter()
                .filter(|(g, _)| *g == group)
                .map(|(_, field)| field.clone())
                .collect()
        };
        let (main_fields, object_fields) = (tracked(TableGroup::Main), tracked(TableGroup::Objects));

        let mut features = FeatureValues::default();
        let mut categories: BTreeMap<i64, Category> = BTreeMap::new();
        let mut media_files = Vec::new();
        let (mut imported, mut skipped) = (0usize, 0usize);

        for item in importer.import_rows()? {
            let checked = item.and_then(|item| Self::validate_item(&tables, &item).map(|_| item));
            let mut item = match checked {
                Ok(item) => item,
                Err(e) if importer.skip_on_error() && is_recoverable(&e) => {
                    tracing::warn!("⚠️ Skipping item: {}", e);
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!("❌ Import of {} aborted: {}", dataset.info.id, e);
                    return Err(e);
                }
            };

            self.prepare_media(&dataset, &mut item, &sources, &mut media_files)
                .await?;

            for entry in item.tables_mut() {
                let Some(pending) = tables.get_mut(&entry.table) else {
                    continue;
                };
                for row in entry.rows.drain(..) {
                    match pending.group {
                        TableGroup::Main => features.observe(TableGroup::Main, &main_fields, &row)?,
                        TableGroup::Objects => {
                            features.observe(TableGroup::Objects, &object_fields, &row)?;
                            collect_category(&mut categories, &row);
                        }
                        _ => {}
                    }
                    pending.buffer.push(row);
                }
                if pending.buffer.len() >= self.batch_size {
                    let rows = std::mem::take(&mut pending.buffer);
                    pending.table.append(&rows).await?;
                }
            }
            imported += 1;
        }

        for pending in tables.values_mut() {
            let rows = std::mem::take(&mut pending.buffer);
            pending.table.append(&rows).await?;
        }

        self.transfer_media(&media_files).await?;

        for pending in tables.values_mut() {
            pending.table.compact().await?;
        }

        let num_elements = tables
            .get(MAIN_TABLE)
            .map(|pending| pending.table.count_rows())
            .unwrap_or(0);
        if num_elements == 0 {
            return Err(PixanoError::EmptyDataset(dataset.info.id.clone()));
        }

        match dataset.info.categories.as_mut() {
            Some(declared) => declared.sort_by_key(|category| category.id),
            None if !categories.is_empty() => {
                dataset.info.categories = Some(categories.into_values().collect());
            }
            None => {}
        }

        if !features.is_empty() {
            let data = serde_json::to_vec_pretty(&features)?;
            self.fs.write_atomic(&dataset.file(FEATURES_FILE), &data).await?;
        }

        let stats = stats_service::compute_stats(&dataset).await?;
        stats_service::write_stats(&dataset, &stats).await?;

        match preview::build_preview(&dataset).await? {
            Some(png) => self.fs.write(&dataset.file(PREVIEW_FILE), &png, None).await?,
            None => tracing::debug!("📭 No images for the preview of {}", dataset.info.id),
        }

        dataset.info.num_elements = num_elements;
        let size: u64 = self
            .fs
            .list_files_recursive(target)
            .await?
            .iter()
            .map(|entry| entry.metadata.size)
            .sum();
        dataset.info.estimated_size = format_size(size);
        dataset.save_info().await?;

        tracing::info!(
            "✅ Imported dataset {}: {} items ({} skipped), {}",
            dataset.info.id,
            imported,
            skipped,
            dataset.info.estimated_size
        );
        Ok(dataset)
    }

    fn validate_item(tables: &HashMap<String, PendingTable>, item: &ItemRows) -> Result<()> {
        for entry in item.tables() {
            let pending = tables.get(&entry.table).ok_or_else(|| {
                PixanoError::SchemaMismatch(format!("rows for undeclared table {}", entry.table))
            })?;
            for row in &entry.rows {
                pending.table.schema().validate_row(row)?;
            }
        }
        Ok(())
    }

    /// Write inline media bytes out, queue source files and resolve URIs left in place
    async fn prepare_media(
        &self,
        dataset: &Dataset,
        item: &mut ItemRows,
        sources: &BTreeMap<String, PathBuf>,
        media_files: &mut Vec<MediaFile>,
    ) -> Result<()> {
        for entry in item.tables_mut() {
            if entry.group != TableGroup::Media {
                continue;
            }
            for row in &mut entry.rows {
                for (field, value) in row.iter_mut() {
                    let Value::Image(image) = value else {
                        continue;
                    };
                    if image.is_absolute() {
                        continue;
                    }
                    let destination = media_location(dataset, field, &image.uri);

                    if let Some(bytes) = image.bytes.take() {
                        self.fs.write(&destination, &bytes, None).await?;
                        continue;
                    }
                    let Some(root) = sources.get(field) else {
                        continue;
                    };
                    let source = root.join(&image.uri);
                    match self.transfer {
                        MediaTransfer::Copy | MediaTransfer::Move => {
                            media_files.push(MediaFile {
                                source,
                                destination,
                            });
                        }
                        MediaTransfer::None => {
                            let absolute = std::fs::canonicalize(&source).unwrap_or(source);
                            image.uri = format!("file://{}", absolute.display());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn transfer_media(&self, files: &[MediaFile]) -> Result<()> {
        for file in files {
            let source = file.source.to_string_lossy();
            match self.transfer {
                MediaTransfer::Move => self.fs.move_file(&source, &file.destination).await?,
                _ => self.fs.copy(&source, &file.destination).await?,
            }
        }
        if !files.is_empty() {
            tracing::info!("📦 Transferred {} media files ({:?})", files.len(), self.transfer);
        }
        Ok(())
    }
}

fn media_location(dataset: &Dataset, field: &str, uri: &str) -> String {
    filesystem::join(&dataset.media_prefix(field), uri)
}

fn is_recoverable(error: &PixanoError) -> bool {
    matches!(error, PixanoError::SchemaMismatch(_) | PixanoError::InvalidCell(_))
}

fn collect_category(categories: &mut BTreeMap<i64, Category>, row: &Row) {
    let Some(id) = row.get("category_id").and_then(Value::as_i64) else {
        return;
    };
    let name = row
        .get("category")
        .or_else(|| row.get("category_name"))
        .and_then(Value::as_str);
    if let Some(name) = name {
        categories.entry(id).or_insert_with(|| Category {
            id,
            name: name.to_string(),
            supercategory: row
                .get("supercategory")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
}

/// Human-readable byte size, binary multiples
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}
