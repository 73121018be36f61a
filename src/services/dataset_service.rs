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

//! Library-level entry point used by the CLI and by any server wrapping the core

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::item_service::{DatasetItem, ItemService, LoadOptions};
use super::search_service::{QueryEncoder, SearchService};
use super::stats_service::{self, Stat};
use crate::catalog::{Dataset, DatasetLibrary};
use crate::cells::Value;
use crate::core::{DatasetInfo, Page, Result, Settings};
use crate::storage::FilesystemFactory;

/// Model files recognized by `list_models`
pub const MODEL_EXTENSION: &str = "onnx";

pub struct DatasetService {
    settings: Settings,
    library: DatasetLibrary,
}

impl DatasetService {
    /// Validate the settings and open the filesystem backends they need
    pub async fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let fs = Arc::new(FilesystemFactory::new(settings.filesystem_config()).await?);
        let library = DatasetLibrary::new(fs, settings.library_dir.clone());
        tracing::info!("🚀 Dataset service on library {}", settings.library_dir);
        Ok(Self { settings, library })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn library(&self) -> &DatasetLibrary {
        &self.library
    }

    pub async fn list_datasets(&self) -> Result<Vec<DatasetInfo>> {
        self.library.list(true, false).await
    }

    /// Dataset summary with preview and stats attached
    pub async fn get_dataset(&self, id: &str) -> Result<DatasetInfo> {
        let dataset = self.library.find(id).await?;
        let mut info = dataset.info.clone();
        info.preview = dataset.load_preview().await?;
        info.stats = dataset.load_stats().await?;
        Ok(info)
    }

    pub async fn list_items(&self, id: &str, limit: usize, offset: usize) -> Result<Page<DatasetItem>> {
        let dataset = self.library.find(id).await?;
        ItemService::new(dataset).load_items(limit, offset).await
    }

    pub async fn search_items(
        &self,
        id: &str,
        query: &str,
        encoder: &dyn QueryEncoder,
        limit: usize,
        offset: usize,
    ) -> Result<Page<DatasetItem>> {
        let dataset = self.library.find(id).await?;
        SearchService::new(&dataset, encoder).search(query, limit, offset).await
    }

    pub async fn get_item(&self, id: &str, item_id: &str) -> Result<DatasetItem> {
        let dataset = self.library.find(id).await?;
        ItemService::new(dataset)
            .load_item(item_id, LoadOptions::default())
            .await
    }

    pub async fn save_item(&self, id: &str, item: &DatasetItem) -> Result<()> {
        let dataset = self.library.find(id).await?;
        ItemService::new(dataset).save_item(item).await
    }

    pub async fn get_item_embeddings(
        &self,
        id: &str,
        item_id: &str,
        model_id: &str,
    ) -> Result<BTreeMap<String, Value>> {
        let dataset = self.library.find(id).await?;
        ItemService::new(dataset)
            .load_item_embeddings(item_id, model_id)
            .await
    }

    /// ONNX model file names of the model directory; empty when it is not configured
    pub async fn list_models(&self) -> Result<Vec<String>> {
        match self.settings.models_dir() {
            Some(dir) => list_model_files(dir).await,
            None => Ok(Vec::new()),
        }
    }

    /// Recompute and persist the stats of a dataset
    pub async fn refresh_stats(&self, id: &str) -> Result<Vec<Stat>> {
        let dataset: Dataset = self.library.find(id).await?;
        let stats = stats_service::compute_stats(&dataset).await?;
        stats_service::write_stats(&dataset, &stats).await?;
        tracing::info!("📊 Refreshed {} stats of {}", stats.len(), id);
        Ok(stats)
    }
}

async fn list_model_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("⚠️ Model directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut models = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_model = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION));
        if is_model && entry.file_type().await?.is_file() {
            models.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    models.sort();
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PixanoError;
    use tempfile::TempDir;

    fn settings(library: &Path, models: Option<&Path>) -> Settings {
        Settings {
            library_dir: library.to_string_lossy().to_string(),
            model_dir: models.map(Path::to_path_buf),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_models() {
        let library = TempDir::new().unwrap();
        let models = TempDir::new().unwrap();
        std::fs::write(models.path().join("sam_b.onnx"), b"x").unwrap();
        std::fs::write(models.path().join("a.ONNX"), b"x").unwrap();
        std::fs::write(models.path().join("notes.txt"), b"x").unwrap();

        let service = DatasetService::new(settings(library.path(), Some(models.path())))
            .await
            .unwrap();
        std::fs::create_dir(models.path().join("dir.onnx")).unwrap();
        assert_eq!(service.list_models().await.unwrap(), vec!["a.ONNX", "sam_b.onnx"]);

        let service = DatasetService::new(settings(library.path(), None)).await.unwrap();
        assert!(service.list_models().await.unwrap().is_empty());

        let missing = settings(library.path(), Some(&models.path().join("gone")));
        let service = DatasetService::new(missing).await.unwrap();
        assert!(service.list_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_dataset() {
        let library = TempDir::new().unwrap();
        let service = DatasetService::new(settings(library.path(), None)).await.unwrap();
        assert!(service.list_datasets().await.unwrap().is_empty());
        assert!(matches!(
            service.get_dataset("missing").await,
            Err(PixanoError::EntityNotFound(_))
        ));
    }
}
