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

//! Dataset catalog: datasets are directories of a library holding a `db.json`
//!
//! A library root is a local path, a `file://` URL or an `s3://bucket/prefix` URI.

pub mod library;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

pub use library::DatasetLibrary;

use crate::core::{DatasetInfo, PixanoError, Result, TableGroup, TableSpec};
use crate::importers::FeatureValues;
use crate::services::stats_service::Stat;
use crate::storage::filesystem::{self, FilesystemError, FilesystemFactory};
use crate::storage::ColumnarTable;

pub const INFO_FILE: &str = "db.json";
pub const STATS_FILE: &str = "stats.json";
pub const PREVIEW_FILE: &str = "preview.png";
pub const FEATURES_FILE: &str = "features_values.json";
pub const MEDIA_DIR: &str = "media";

/// A dataset directory and its parsed `db.json`
#[derive(Clone)]
pub struct Dataset {
    pub path: String,
    pub info: DatasetInfo,
    fs: Arc<FilesystemFactory>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("id", &self.info.id)
            .finish()
    }
}

impl Dataset {
    pub fn new(fs: Arc<FilesystemFactory>, path: impl Into<String>, info: DatasetInfo) -> Self {
        Self {
            path: path.into(),
            info,
            fs,
        }
    }

    pub async fn load(fs: Arc<FilesystemFactory>, path: &str) -> Result<Self> {
        let info_path = filesystem::join(path, INFO_FILE);
        let data = fs.read(&info_path).await.map_err(|e| match e {
            FilesystemError::NotFound(_) => PixanoError::EntityNotFound(format!("dataset at {}", path)),
            other => other.into(),
        })?;
        let info: DatasetInfo = serde_json::from_slice(&data)?;
        Ok(Self::new(fs, path, info))
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn fs(&self) -> &Arc<FilesystemFactory> {
        &self.fs
    }

    /// Location of a file at the dataset root
    pub fn file(&self, name: &str) -> String {
        filesystem::join(&self.path, name)
    }

    pub fn media_dir(&self) -> String {
        self.file(MEDIA_DIR)
    }

    /// Directory the relative URIs of a media field resolve against
    pub fn media_prefix(&self, field: &str) -> String {
        filesystem::join(&self.media_dir(), field)
    }

    /// Rewrite `db.json` whole through a temporary file
    pub async fn save_info(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.info)?;
        self.fs.write_atomic(&self.file(INFO_FILE), &data).await?;
        tracing::debug!("📝 Saved {} for dataset {}", INFO_FILE, self.info.id);
        Ok(())
    }

    pub async fn open_table(&self, name: &str) -> Result<ColumnarTable> {
        ColumnarTable::open(self.fs.clone(), &self.path, name).await
    }

    pub async fn create_table(&self, spec: &TableSpec) -> Result<ColumnarTable> {
        ColumnarTable::create(self.fs.clone(), &self.path, spec).await
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        ColumnarTable::exists(&self.fs, &self.path, name).await
    }

    /// Open the main table (`db` by convention)
    pub async fn main_table(&self) -> Result<ColumnarTable> {
        let name = self
            .info
            .main_table()
            .map(|spec| spec.name.clone())
            .ok_or_else(|| PixanoError::EntityNotFound(format!("main table of {}", self.info.id)))?;
        self.open_table(&name).await
    }

    /// Drop registrations of tables missing on disk; returns the pruned names
    pub async fn prune_missing_tables(&mut self, group: TableGroup) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for spec in self.info.tables_in(group) {
            if !self.table_exists(&spec.name).await? {
                missing.push(spec.name.clone());
            }
        }
        if !missing.is_empty() {
            for name in &missing {
                self.info.remove_table(group, name);
            }
            tracing::info!("🧹 Pruned stale {} tables {:?} from {}", group, missing, self.info.id);
            self.save_info().await?;
        }
        Ok(missing)
    }

    pub async fn load_stats(&self) -> Result<Option<Vec<Stat>>> {
        self.read_optional_json(STATS_FILE).await
    }

    pub async fn load_features_values(&self) -> Result<Option<FeatureValues>> {
        self.read_optional_json(FEATURES_FILE).await
    }

    /// Inline data URL locally, presigned URL for object stores
    pub async fn load_preview(&self) -> Result<Option<String>> {
        let location = self.file(PREVIEW_FILE);
        if self.fs.is_remote(&location) {
            if !self.fs.exists(&location).await? {
                return Ok(None);
            }
            return Ok(self.fs.presigned_url(&location).await?);
        }
        match self.fs.read(&location).await {
            Ok(data) => Ok(Some(format!("data:image/png;base64,{}", STANDARD.encode(data)))),
            Err(FilesystemError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_optional_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.fs.read(&self.file(name)).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(FilesystemError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilesystemConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load_info() {
        let temp_dir = TempDir::new().unwrap();
        let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());
        let path = filesystem::join(temp_dir.path().to_str().unwrap(), "demo");

        let mut info = DatasetInfo::new("demo", "Demo", "");
        info.add_table(TableGroup::Main, TableSpec::new("db", &[("id", "str")]));
        let dataset = Dataset::new(fs.clone(), &path, info.clone());
        dataset.save_info().await.unwrap();

        let loaded = Dataset::load(fs.clone(), &path).await.unwrap();
        assert_eq!(loaded.info, info);
        assert!(loaded.load_preview().await.unwrap().is_none());
        assert!(loaded.load_stats().await.unwrap().is_none());

        assert!(matches!(
            Dataset::load(fs, &filesystem::join(&path, "nope")).await,
            Err(PixanoError::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_prune_missing_tables() {
        let temp_dir = TempDir::new().unwrap();
        let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());
        let path = temp_dir.path().to_str().unwrap().to_string();

        let mut info = DatasetInfo::new("demo", "Demo", "");
        let kept = TableSpec::new("objects", &[("id", "str"), ("item_id", "str")]);
        info.add_table(TableGroup::Objects, kept.clone());
        info.add_table(TableGroup::Objects, TableSpec::new("obj_gone", &[("id", "str")]));
        let mut dataset = Dataset::new(fs, &path, info);
        dataset.create_table(&kept).await.unwrap();

        let pruned = dataset.prune_missing_tables(TableGroup::Objects).await.unwrap();
        assert_eq!(pruned, vec!["obj_gone".to_string()]);
        assert_eq!(dataset.info.tables_in(TableGroup::Objects).len(), 1);

        let reloaded = Dataset::load(dataset.fs().clone(), &path).await.unwrap();
        assert!(reloaded.info.table(TableGroup::Objects, "obj_gone").is_none());
    }
}
