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

//! Versioned columnar tables over any [`FilesystemFactory`] backend
//!
//! Layout of a table directory:
//!
//! ```text
//! <dataset>/<name>.tbl/
//!   _manifest.json       # schema, live fragments and their deletion vectors
//!   data/<n>.parquet     # immutable fragments, at most one append chunk each
//! ```
//!
//! Every mutation writes its fragment first and then publishes it by replacing the
//! manifest through a temporary file, exactly once per chunk. The in-memory manifest
//! only advances after that write succeeds. A fragment the manifest does not
//! reference is invisible to readers and is swept by [`ColumnarTable::compact`].

use bytes::Bytes;
use indexmap::IndexMap;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use arrow_array::RecordBatch;

use super::filesystem::{self, FilesystemError, FilesystemFactory, TEMP_SUFFIX};
use super::filter::Filter;
use crate::cells::Row;
use crate::core::{PixanoError, Result, TableSpec};
use crate::schema::{FieldType, TableSchema};

/// Rows per fragment written by a single append chunk
pub const BATCH_SIZE: usize = 1024;

/// Extension of table directories
pub const TABLE_EXT: &str = "tbl";

const MANIFEST: &str = "_manifest.json";
const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fragment {
    id: u64,
    /// Path relative to the table directory
    file: String,
    rows: usize,
    /// Tombstoned row offsets within the fragment
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    deleted: BTreeSet<usize>,
}

impl Fragment {
    fn live_rows(&self) -> usize {
        self.rows - self.deleted.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u64,
    fields: IndexMap<String, String>,
    fragments: Vec<Fragment>,
    next_fragment_id: u64,
}

/// Handle on one stored table; cheap to open, re-opened per call
pub struct ColumnarTable {
    fs: Arc<FilesystemFactory>,
    location: String,
    schema: TableSchema,
    manifest: Manifest,
}

impl std::fmt::Debug for ColumnarTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarTable")
            .field("location", &self.location)
            .field("version", &self.manifest.version)
            .field("fragments", &self.manifest.fragments.len())
            .finish()
    }
}

impl ColumnarTable {
    /// Directory of table `name` inside a dataset
    pub fn location(dataset: &str, name: &str) -> String {
        filesystem::join(dataset, &format!("{}.{}", name, TABLE_EXT))
    }

    pub async fn exists(fs: &FilesystemFactory, dataset: &str, name: &str) -> Result<bool> {
        let manifest = filesystem::join(&Self::location(dataset, name), MANIFEST);
        Ok(fs.exists(&manifest).await?)
    }

    /// Create an empty table, replacing any table of the same name
    pub async fn create(fs: Arc<FilesystemFactory>, dataset: &str, spec: &TableSpec) -> Result<Self> {
        let schema = TableSchema::from_spec(spec)?;
        let location = Self::location(dataset, &spec.name);

        match fs.delete(&location).await {
            Ok(()) => tracing::info!("🗑️ Replaced existing table {}", location),
            Err(FilesystemError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        fs.create_dir_all(&filesystem::join(&location, DATA_DIR)).await?;

        let manifest = Manifest {
            version: 0,
            fields: schema.type_strings(),
            fragments: Vec::new(),
            next_fragment_id: 0,
        };
        let mut table = Self {
            fs,
            location,
            manifest: manifest.clone(),
            schema,
        };
        table.commit(manifest).await?;

        tracing::info!("✅ Created table {} ({} columns)", table.location, table.schema.len());
        Ok(table)
    }

    pub async fn open(fs: Arc<FilesystemFactory>, dataset: &str, name: &str) -> Result<Self> {
        let location = Self::location(dataset, name);
        let manifest_path = filesystem::join(&location, MANIFEST);

        let data = match fs.read(&manifest_path).await {
            Ok(data) => data,
            Err(FilesystemError::NotFound(_)) => {
                return Err(PixanoError::EntityNotFound(format!("table {}", name)))
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&data)?;
        let schema = TableSchema::from_spec(&TableSpec {
            name: name.to_string(),
            fields: manifest.fields.clone(),
            source: None,
            kind: None,
        })?;

        tracing::debug!("🔍 Opened table {} at version {}", location, manifest.version);
        Ok(Self {
            fs,
            location,
            schema,
            manifest,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn version(&self) -> u64 {
        self.manifest.version
    }

    pub fn count_rows(&self) -> usize {
        self.manifest.fragments.iter().map(Fragment::live_rows).sum()
    }

    /// Live rows, optionally restricted by a key filter evaluated before decoding
    pub async fn scan(&self, filter: Option<&Filter>) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for fragment in &self.manifest.fragments {
            if fragment.live_rows() == 0 {
                continue;
            }
            for (offset, batch) in self.read_fragment(fragment).await? {
                let indices = self.live_indices(fragment, offset, &batch, filter);
                rows.extend(self.schema.batch_rows_at(&batch, indices)?);
            }
        }
        Ok(rows)
    }

    /// Validate every row, then write them in chunks of [`BATCH_SIZE`]; each chunk is
    /// published on its own so a failure never exposes part of a chunk
    pub async fn append(&mut self, rows: &[Row]) -> Result<usize> {
        for row in rows {
            self.schema.validate_row(row)?;
        }

        for chunk in rows.chunks(BATCH_SIZE) {
            let batch = self.schema.rows_to_batch(chunk)?;
            let mut next = self.manifest.clone();
            let fragment = self.write_fragment(&mut next, &batch).await?;
            next.fragments.push(fragment);
            self.commit(next).await?;
        }

        if !rows.is_empty() {
            tracing::debug!("📝 Appended {} rows to {}", rows.len(), self.location);
        }
        Ok(rows.len())
    }

    /// Tombstone every live row matching the filter
    pub async fn delete(&mut self, filter: &Filter) -> Result<usize> {
        let tombstones = self.tombstones(filter).await?;
        let deleted: usize = tombstones.iter().map(Vec::len).sum();
        if deleted == 0 {
            return Ok(0);
        }

        let mut next = self.manifest.clone();
        apply_tombstones(&mut next, tombstones);
        self.commit(next).await?;

        tracing::debug!("🗑️ Deleted {} rows from {}", deleted, self.location);
        Ok(deleted)
    }

    /// Replace the rows matching the filter with `row` in a single commit: the new
    /// fragment is written first, so a failed write leaves the old rows visible
    pub async fn update(&mut self, filter: &Filter, row: Row) -> Result<()> {
        self.schema.validate_row(&row)?;
        let batch = self.schema.rows_to_batch(std::slice::from_ref(&row))?;
        let tombstones = self.tombstones(filter).await?;

        let mut next = self.manifest.clone();
        let fragment = self.write_fragment(&mut next, &batch).await?;
        apply_tombstones(&mut next, tombstones);
        next.fragments.push(fragment);
        self.commit(next).await?;

        tracing::debug!("📝 Updated row in {}", self.location);
        Ok(())
    }

    /// Widen the schema; existing rows read the new columns with their default
    pub async fn add_columns(&mut self, columns: &[(String, FieldType)]) -> Result<()> {
        let mut schema = self.schema.clone();
        let mut added = 0;
        for (name, field_type) in columns {
            if !schema.contains(name) {
                schema = schema.with_field(name.clone(), field_type.clone());
                added += 1;
            }
        }
        if added == 0 {
            return Ok(());
        }

        let mut next = self.manifest.clone();
        next.fields = schema.type_strings();
        self.commit(next).await?;
        self.schema = schema;

        tracing::info!("📝 Added {} columns to {}", added, self.location);
        Ok(())
    }

    /// Rewrite live rows into full fragments, drop tombstones and remove every file the
    /// manifest no longer references
    pub async fn compact(&mut self) -> Result<()> {
        let live = self.count_rows();
        let needed = (live + BATCH_SIZE - 1) / BATCH_SIZE;
        let has_tombstones = self.manifest.fragments.iter().any(|f| !f.deleted.is_empty());

        if has_tombstones || self.manifest.fragments.len() > needed {
            let rows = self.scan(None).await?;
            let mut next = self.manifest.clone();
            let mut fragments = Vec::with_capacity(needed);
            for chunk in rows.chunks(BATCH_SIZE) {
                let batch = self.schema.rows_to_batch(chunk)?;
                fragments.push(self.write_fragment(&mut next, &batch).await?);
            }
            next.fragments = fragments;
            self.commit(next).await?;
            tracing::debug!("🔄 Compacted {} into {} fragments", self.location, needed);
        }

        self.sweep().await
    }

    async fn sweep(&self) -> Result<()> {
        let referenced: HashSet<&str> = self
            .manifest
            .fragments
            .iter()
            .map(|f| filesystem::file_name(&f.file))
            .collect();

        let data_dir = filesystem::join(&self.location, DATA_DIR);
        let mut stale = Vec::new();
        // Object stores have no directory entries to probe
        if self.fs.is_remote(&data_dir) || self.fs.exists(&data_dir).await? {
            for entry in self.fs.list(&data_dir).await? {
                if !entry.metadata.is_directory && !referenced.contains(entry.name.as_str()) {
                    stale.push(entry.path);
                }
            }
        }
        for entry in self.fs.list(&self.location).await? {
            if entry.name.ends_with(TEMP_SUFFIX) {
                stale.push(entry.path);
            }
        }

        for path in &stale {
            match self.fs.delete(path).await {
                Ok(()) | Err(FilesystemError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !stale.is_empty() {
            tracing::debug!("🧹 Removed {} unreferenced files from {}", stale.len(), self.location);
        }
        Ok(())
    }

    /// Matching live row offsets, one list per current fragment
    async fn tombstones(&self, filter: &Filter) -> Result<Vec<Vec<usize>>> {
        let mut tombstones = Vec::with_capacity(self.manifest.fragments.len());
        for fragment in &self.manifest.fragments {
            let mut hits = Vec::new();
            if fragment.live_rows() > 0 {
                for (offset, batch) in self.read_fragment(fragment).await? {
                    hits.extend(
                        self.live_indices(fragment, offset, &batch, Some(filter))
                            .into_iter()
                            .map(|index| offset + index),
                    );
                }
            }
            tombstones.push(hits);
        }
        Ok(tombstones)
    }

    fn live_indices(
        &self,
        fragment: &Fragment,
        offset: usize,
        batch: &RecordBatch,
        filter: Option<&Filter>,
    ) -> Vec<usize> {
        let candidates = match filter {
            Some(filter) => filter.select(batch),
            None => (0..batch.num_rows()).collect(),
        };
        candidates
            .into_iter()
            .filter(|index| !fragment.deleted.contains(&(offset + index)))
            .collect()
    }

    /// Batches of a fragment with the fragment offset of their first row
    async fn read_fragment(&self, fragment: &Fragment) -> Result<Vec<(usize, RecordBatch)>> {
        let path = filesystem::join(&self.location, &fragment.file);
        let data = self.fs.read(&path).await?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?
            .with_batch_size(BATCH_SIZE)
            .build()?;

        let mut offset = 0;
        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch?;
            let rows = batch.num_rows();
            batches.push((offset, batch));
            offset += rows;
        }
        Ok(batches)
    }

    /// Write a fragment file under the next id of `next`
    async fn write_fragment(&self, next: &mut Manifest, batch: &RecordBatch) -> Result<Fragment> {
        let id = next.next_fragment_id;
        next.next_fragment_id += 1;
        let file = format!("{}/{}.parquet", DATA_DIR, id);

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        self.fs
            .write(&filesystem::join(&self.location, &file), &buffer, None)
            .await?;

        Ok(Fragment {
            id,
            file,
            rows: batch.num_rows(),
            deleted: BTreeSet::new(),
        })
    }

    /// Publish `next` as the following version; the handle keeps its current manifest
    /// when the write fails
    async fn commit(&mut self, mut next: Manifest) -> Result<()> {
        next.version = self.manifest.version + 1;
        let data = serde_json::to_vec_pretty(&next)?;
        self.fs
            .write_atomic(&filesystem::join(&self.location, MANIFEST), &data)
            .await?;
        self.manifest = next;
        Ok(())
    }
}

fn apply_tombstones(manifest: &mut Manifest, tombstones: Vec<Vec<usize>>) {
    for (fragment, hits) in manifest.fragments.iter_mut().zip(tombstones) {
        fragment.deleted.extend(hits);
    }
}
