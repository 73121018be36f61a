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

use super::{Dataset, INFO_FILE};
use crate::core::{DatasetInfo, PixanoError, Result};
use crate::storage::filesystem::{self, FilesystemFactory};

/// Root directory holding one subdirectory per dataset
#[derive(Clone)]
pub struct DatasetLibrary {
    root: String,
    fs: Arc<FilesystemFactory>,
}

impl DatasetLibrary {
    pub fn new(fs: Arc<FilesystemFactory>, root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn fs(&self) -> &Arc<FilesystemFactory> {
        &self.fs
    }

    /// Location a dataset with this directory name would have
    pub fn dataset_path(&self, dir_name: &str) -> String {
        filesystem::join(&self.root, dir_name)
    }

    /// Every dataset of the library, sorted by directory name. Directories without a
    /// readable `db.json` are skipped.
    pub async fn datasets(&self) -> Result<Vec<Dataset>> {
        let mut datasets = Vec::new();
        for entry in self.fs.list(&self.root).await? {
            if !entry.metadata.is_directory {
                continue;
            }
            if !self.fs.exists(&filesystem::join(&entry.path, INFO_FILE)).await? {
                continue;
            }
            match Dataset::load(self.fs.clone(), &entry.path).await {
                Ok(dataset) => datasets.push(dataset),
                Err(e) => tracing::warn!("⚠️ Skipping dataset at {}: {}", entry.path, e),
            }
        }
        datasets.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(datasets)
    }

    /// Dataset infos, with the preview and stats attached on request
    pub async fn list(&self, load_preview: bool, load_stats: bool) -> Result<Vec<DatasetInfo>> {
        let mut infos = Vec::new();
        for dataset in self.datasets().await? {
            let mut info = dataset.info.clone();
            if load_preview {
                info.preview = dataset.load_preview().await?;
            }
            if load_stats {
                info.stats = dataset.load_stats().await?;
            }
            infos.push(info);
        }
        tracing::debug!("🔍 Listed {} datasets in {}", infos.len(), self.root);
        Ok(infos)
    }

    /// Dataset whose `db.json` declares `id`. Ids are plain names, never paths; when
    /// several directories declare the same id the first by directory name wins.
    pub async fn find(&self, id: &str) -> Result<Dataset> {
        if id.is_empty() || id == "." || id == ".." || id.contains(|c: char| c == '/' || c == '\\') {
            return Err(PixanoError::EntityNotFound(format!("dataset {:?}", id)));
        }

        // Datasets are usually stored under their id
        let direct = self.dataset_path(id);
        if self.fs.exists(&filesystem::join(&direct, INFO_FILE)).await? {
            let dataset = Dataset::load(self.fs.clone(), &direct).await?;
            if dataset.info.id == id {
                return Ok(dataset);
            }
        }

        let mut matches = self
            .datasets()
            .await?
            .into_iter()
            .filter(|dataset| dataset.info.id == id);
        let found = matches
            .next()
            .ok_or_else(|| PixanoError::EntityNotFound(format!("dataset {}", id)))?;
        let duplicates: Vec<String> = matches.map(|dataset| dataset.path).collect();
        if !duplicates.is_empty() {
            tracing::warn!(
                "⚠️ Dataset id {} declared again in {:?}, using {}",
                id,
                duplicates,
                found.path
            );
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilesystemConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_and_find() {
        let temp_dir = TempDir::new().unwrap();
        let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());
        let library = DatasetLibrary::new(fs.clone(), temp_dir.path().to_str().unwrap());

        for (dir, id) in [("b_dir", "beta"), ("a_dir", "alpha")] {
            Dataset::new(fs.clone(), library.dataset_path(dir), DatasetInfo::new(id, id, ""))
                .save_info()
                .await
                .unwrap();
        }
        fs.create_dir_all(&library.dataset_path("not_a_dataset")).await.unwrap();

        let ids: Vec<String> = library
            .list(true, true)
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.id)
            .collect();
        assert_eq!(ids, vec!["alpha", "beta"]);

        assert_eq!(library.find("beta").await.unwrap().path, library.dataset_path("b_dir"));
        assert!(matches!(
            library.find("gamma").await,
            Err(PixanoError::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_rejects_path_ids_and_resolves_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let fs = Arc::new(FilesystemFactory::new(FilesystemConfig::default()).await.unwrap());
        let library_dir = temp_dir.path().join("library");
        let library = DatasetLibrary::new(fs.clone(), library_dir.to_str().unwrap());

        // A dataset outside the library root
        let outside = temp_dir.path().join("outside");
        Dataset::new(fs.clone(), outside.to_str().unwrap(), DatasetInfo::new("../outside", "x", ""))
            .save_info()
            .await
            .unwrap();
        for id in ["../outside", "a/b", "..", ""] {
            assert!(matches!(library.find(id).await, Err(PixanoError::EntityNotFound(_))));
        }

        for dir in ["copy_b", "copy_a"] {
            Dataset::new(fs.clone(), library.dataset_path(dir), DatasetInfo::new("twin", "twin", ""))
                .save_info()
                .await
                .unwrap();
        }
        assert_eq!(library.find("twin").await.unwrap().path, library.dataset_path("copy_a"));
    }
}
