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

//! Local filesystem backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{DirEntry, FileMetadata, FileOptions, FileSystem, FilesystemError, FsResult};

/// Local filesystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root directory for relative paths
    pub root_dir: Option<PathBuf>,

    /// Enable symbolic link resolution
    pub follow_symlinks: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            follow_symlinks: true,
        }
    }
}

/// Local filesystem implementation
#[derive(Debug)]
pub struct LocalFileSystem {
    config: LocalConfig,
}

fn io_error(path: &Path, e: std::io::Error) -> FilesystemError {
    match e.kind() {
        std::io::ErrorKind::NotFound => FilesystemError::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            FilesystemError::PermissionDenied(path.display().to_string())
        }
        std::io::ErrorKind::AlreadyExists => {
            FilesystemError::AlreadyExists(path.display().to_string())
        }
        _ => FilesystemError::Io(e),
    }
}

impl LocalFileSystem {
    /// Create new local filesystem instance
    pub async fn new(config: LocalConfig) -> FsResult<Self> {
        if let Some(ref root_dir) = config.root_dir {
            if !root_dir.is_dir() {
                return Err(FilesystemError::Config(format!(
                    "Root path is not a directory: {}",
                    root_dir.display()
                )));
            }
        }

        Ok(Self { config })
    }

    /// Strip the `file://` scheme and resolve relative paths against the root
    fn resolve_path(&self, path: &str) -> PathBuf {
        let path_buf = PathBuf::from(path.strip_prefix("file://").unwrap_or(path));

        match &self.config.root_dir {
            Some(root_dir) if !path_buf.is_absolute() => root_dir.join(path_buf),
            _ => path_buf,
        }
    }

    fn convert_metadata(&self, path: &Path, metadata: &std::fs::Metadata) -> FileMetadata {
        let modified = metadata
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from);

        FileMetadata {
            path: path.display().to_string(),
            size: metadata.len(),
            modified,
            is_directory: metadata.is_dir(),
            etag: None,
        }
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let resolved_path = self.resolve_path(path);
        fs::read(&resolved_path)
            .await
            .map_err(|e| io_error(&resolved_path, e))
    }

    async fn write(&self, path: &str, data: &[u8], options: Option<FileOptions>) -> FsResult<()> {
        let resolved_path = self.resolve_path(path);
        let options = options.unwrap_or_default();

        if options.create_dirs {
            if let Some(parent) = resolved_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
        }

        if !options.overwrite && resolved_path.exists() {
            return Err(FilesystemError::AlreadyExists(
                resolved_path.display().to_string(),
            ));
        }

        fs::write(&resolved_path, data)
            .await
            .map_err(|e| io_error(&resolved_path, e))
    }

    async fn delete(&self, path: &str) -> FsResult<()> {
        let resolved_path = self.resolve_path(path);

        if !resolved_path.exists() {
            return Err(FilesystemError::NotFound(
                resolved_path.display().to_string(),
            ));
        }

        let result = if resolved_path.is_dir() {
            fs::remove_dir_all(&resolved_path).await
        } else {
            fs::remove_file(&resolved_path).await
        };
        result.map_err(|e| io_error(&resolved_path, e))
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        Ok(self.resolve_path(path).exists())
    }

    async fn metadata(&self, path: &str) -> FsResult<FileMetadata> {
        let resolved_path = self.resolve_path(path);

        let metadata = if self.config.follow_symlinks {
            fs::metadata(&resolved_path).await
        } else {
            fs::symlink_metadata(&resolved_path).await
        };

        metadata
            .map(|meta| self.convert_metadata(&resolved_path, &meta))
            .map_err(|e| io_error(&resolved_path, e))
    }

    async fn list(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let resolved_path = self.resolve_path(path);

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&resolved_path)
            .await
            .map_err(|e| io_error(&resolved_path, e))?;

        while let Some(entry) = dir.next_entry().await.map_err(FilesystemError::Io)? {
            let entry_path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await.map_err(FilesystemError::Io)?;

            entries.push(DirEntry {
                name,
                path: entry_path.display().to_string(),
                metadata: self.convert_metadata(&entry_path, &metadata),
            });
        }

        // Sort entries by name for consistent ordering
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries)
    }

    async fn create_dir_all(&self, path: &str) -> FsResult<()> {
        let resolved_path = self.resolve_path(path);

        fs::create_dir_all(&resolved_path)
            .await
            .map_err(|e| io_error(&resolved_path, e))
    }

    async fn copy(&self, from: &str, to: &str) -> FsResult<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);

        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        fs::copy(&from_path, &to_path)
            .await
            .map_err(|e| io_error(&from_path, e))?;

        Ok(())
    }

    async fn move_file(&self, from: &str, to: &str) -> FsResult<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);

        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| io_error(&from_path, e))
    }

    fn filesystem_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_filesystem_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config = LocalConfig {
            root_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let fs = LocalFileSystem::new(config).await.unwrap();

        let test_data = b"{\"id\": \"coco\"}";
        let test_path = "coco/db.json";

        fs.write(test_path, test_data, None).await.unwrap();
        assert!(fs.exists(test_path).await.unwrap());
        assert_eq!(fs.read(test_path).await.unwrap(), test_data);

        let metadata = fs.metadata(test_path).await.unwrap();
        assert_eq!(metadata.size, test_data.len() as u64);
        assert!(!metadata.is_directory);

        let no_overwrite = FileOptions {
            overwrite: false,
            ..Default::default()
        };
        assert!(matches!(
            fs.write(test_path, b"{}", Some(no_overwrite)).await,
            Err(FilesystemError::AlreadyExists(_))
        ));

        fs.copy(test_path, "coco/media/copy.json").await.unwrap();
        let entries = fs.list("coco").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["db.json", "media"]);
        assert!(entries[1].metadata.is_directory);

        fs.move_file("coco/media/copy.json", "coco/moved.json").await.unwrap();
        assert!(!fs.exists("coco/media/copy.json").await.unwrap());

        fs.delete("coco").await.unwrap();
        assert!(!fs.exists(test_path).await.unwrap());
        assert!(matches!(fs.read(test_path).await, Err(FilesystemError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_scheme_is_stripped() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(LocalConfig::default()).await.unwrap();
        let location = format!("file://{}/a.txt", temp_dir.path().display());

        fs.write(&location, b"x", None).await.unwrap();
        assert!(temp_dir.path().join("a.txt").exists());
    }
}
