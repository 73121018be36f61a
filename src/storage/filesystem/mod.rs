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

//! Filesystem abstraction for dataset libraries
//!
//! Provides one interface over the storage backends a library can live on:
//! - file:// (or a bare path) - local filesystem
//! - s3://   - S3-compatible object store
//!
//! Locations are passed to the backends whole; each backend interprets its own scheme.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Error as IoError;
use std::sync::Arc;
use url::Url;

pub mod local;
pub mod s3;

use local::LocalFileSystem;
use s3::S3FileSystem;

/// Filesystem operation result type
pub type FsResult<T> = Result<T, FilesystemError>;

/// Suffix of in-flight files replaced atomically
pub const TEMP_SUFFIX: &str = "___temp";

/// Filesystem error types
#[derive(Debug, thiserror::Error)]
pub enum FilesystemError {
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported filesystem scheme: {0}")]
    UnsupportedScheme(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// File metadata information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: String,
    pub size: u64,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub is_directory: bool,
    pub etag: Option<String>, // For object stores
}

/// Directory listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    /// Full location, usable with the same backend
    pub path: String,
    pub metadata: FileMetadata,
}

/// File operation options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOptions {
    pub create_dirs: bool,
    pub overwrite: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            create_dirs: true,
            overwrite: true,
        }
    }
}

/// Abstract filesystem trait for strategy pattern
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Write file contents
    async fn write(&self, path: &str, data: &[u8], options: Option<FileOptions>) -> FsResult<()>;

    /// Delete file or directory
    async fn delete(&self, path: &str) -> FsResult<()>;

    /// Check if file exists
    async fn exists(&self, path: &str) -> FsResult<bool>;

    /// Get file metadata
    async fn metadata(&self, path: &str) -> FsResult<FileMetadata>;

    /// List directory contents, sorted by name
    async fn list(&self, path: &str) -> FsResult<Vec<DirEntry>>;

    /// Create directory and all parent directories
    async fn create_dir_all(&self, path: &str) -> FsResult<()>;

    /// Copy file
    async fn copy(&self, from: &str, to: &str) -> FsResult<()>;

    /// Move/rename file
    async fn move_file(&self, from: &str, to: &str) -> FsResult<()>;

    /// Time-limited URL giving read access without credentials
    async fn presigned_url(&self, _path: &str) -> FsResult<Option<String>> {
        Ok(None)
    }

    /// Get filesystem type identifier
    fn filesystem_type(&self) -> &'static str;
}

/// Filesystem factory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Default filesystem URL for unqualified paths
    pub default_fs: Option<String>,

    /// S3-compatible object store configuration
    pub s3: Option<s3::S3Config>,

    /// Local filesystem configuration
    pub local: Option<local::LocalConfig>,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            default_fs: Some("file://".to_string()),
            s3: None,
            local: Some(local::LocalConfig::default()),
        }
    }
}

/// Routes every operation to the backend owning the location's scheme
pub struct FilesystemFactory {
    config: FilesystemConfig,
    filesystems: HashMap<String, Arc<dyn FileSystem>>,
}

impl FilesystemFactory {
    /// Create new filesystem factory with configuration
    pub async fn new(config: FilesystemConfig) -> FsResult<Self> {
        let mut factory = Self {
            config,
            filesystems: HashMap::new(),
        };

        factory.initialize_filesystems().await?;

        Ok(factory)
    }

    /// Initialize all configured filesystem backends
    async fn initialize_filesystems(&mut self) -> FsResult<()> {
        if let Some(local_config) = &self.config.local {
            let local_fs = LocalFileSystem::new(local_config.clone()).await?;
            self.filesystems.insert("file".to_string(), Arc::new(local_fs));
        }

        // Client construction and credential checks are deferred to first access
        if let Some(s3_config) = &self.config.s3 {
            let s3_fs = S3FileSystem::new(s3_config.clone());
            self.filesystems.insert("s3".to_string(), Arc::new(s3_fs));
        }

        Ok(())
    }

    /// Get filesystem instance for URL scheme
    pub fn get_filesystem(&self, url: &str) -> FsResult<&dyn FileSystem> {
        let scheme = self.extract_scheme(url)?;

        self.filesystems
            .get(&scheme)
            .map(|fs| fs.as_ref())
            .ok_or(FilesystemError::UnsupportedScheme(scheme))
    }

    /// Extract scheme from URL
    fn extract_scheme(&self, url: &str) -> FsResult<String> {
        if url.contains("://") {
            let parsed = Url::parse(url)?;
            Ok(parsed.scheme().to_string())
        } else if let Some(default_fs) = &self.config.default_fs {
            let parsed = Url::parse(default_fs)?;
            Ok(parsed.scheme().to_string())
        } else {
            Ok("file".to_string())
        }
    }

    /// True when the location lives in an object store
    pub fn is_remote(&self, url: &str) -> bool {
        self.extract_scheme(url).map_or(false, |scheme| scheme != "file")
    }

    /// List all available filesystem types
    pub fn available_filesystems(&self) -> Vec<&str> {
        self.filesystems.keys().map(|s| s.as_str()).collect()
    }

    pub async fn read(&self, url: &str) -> FsResult<Vec<u8>> {
        tracing::debug!("🔍 FilesystemFactory::read() - URL: {}", url);
        let fs = self.get_filesystem(url)?;
        let result = fs.read(url).await;

        match &result {
            Ok(data) => tracing::debug!("✅ Read {} bytes from {}", data.len(), url),
            Err(FilesystemError::NotFound(_)) => tracing::debug!("📭 Not found: {}", url),
            Err(e) => tracing::error!("❌ Read failed from {}: {}", url, e),
        }

        result
    }

    pub async fn write(&self, url: &str, data: &[u8], options: Option<FileOptions>) -> FsResult<()> {
        tracing::debug!("📝 FilesystemFactory::write() - URL: {} ({} bytes)", url, data.len());
        let fs = self.get_filesystem(url)?;
        let result = fs.write(url, data, options).await;

        match &result {
            Ok(_) => tracing::debug!("✅ Wrote {} bytes to {}", data.len(), url),
            Err(e) => tracing::error!("❌ Write failed to {}: {}", url, e),
        }

        result
    }

    /// Write to a sibling temp file, then rename over the target
    pub async fn write_atomic(&self, url: &str, data: &[u8]) -> FsResult<()> {
        let temp = format!("{}{}", url, TEMP_SUFFIX);
        self.write(&temp, data, None).await?;
        self.move_file(&temp, url).await
    }

    pub async fn delete(&self, url: &str) -> FsResult<()> {
        tracing::debug!("🗑️ FilesystemFactory::delete() - URL: {}", url);
        let fs = self.get_filesystem(url)?;
        let result = fs.delete(url).await;

        if let Err(e) = &result {
            tracing::error!("❌ Delete failed for {}: {}", url, e);
        }

        result
    }

    pub async fn exists(&self, url: &str) -> FsResult<bool> {
        let fs = self.get_filesystem(url)?;
        fs.exists(url).await
    }

    pub async fn metadata(&self, url: &str) -> FsResult<FileMetadata> {
        let fs = self.get_filesystem(url)?;
        fs.metadata(url).await
    }

    pub async fn list(&self, url: &str) -> FsResult<Vec<DirEntry>> {
        let fs = self.get_filesystem(url)?;
        fs.list(url).await
    }

    /// Recursive listing of files (directories excluded)
    pub async fn list_files_recursive(&self, url: &str) -> FsResult<Vec<DirEntry>> {
        let mut files = Vec::new();
        let mut pending = vec![url.to_string()];
        while let Some(dir) = pending.pop() {
            for entry in self.list(&dir).await? {
                if entry.metadata.is_directory {
                    pending.push(entry.path);
                } else {
                    files.push(entry);
                }
            }
        }
        Ok(files)
    }

    pub async fn create_dir_all(&self, url: &str) -> FsResult<()> {
        let fs = self.get_filesystem(url)?;
        fs.create_dir_all(url).await
    }

    pub async fn copy(&self, from_url: &str, to_url: &str) -> FsResult<()> {
        let from_scheme = self.extract_scheme(from_url)?;
        let to_scheme = self.extract_scheme(to_url)?;

        if from_scheme == to_scheme {
            let fs = self.get_filesystem(from_url)?;
            fs.copy(from_url, to_url).await
        } else {
            // Cross-filesystem copy - read from source, write to destination
            let data = self.read(from_url).await?;
            self.write(to_url, &data, None).await
        }
    }

    pub async fn move_file(&self, from_url: &str, to_url: &str) -> FsResult<()> {
        let from_scheme = self.extract_scheme(from_url)?;
        let to_scheme = self.extract_scheme(to_url)?;

        if from_scheme == to_scheme {
            let fs = self.get_filesystem(from_url)?;
            fs.move_file(from_url, to_url).await
        } else {
            self.copy(from_url, to_url).await?;
            self.delete(from_url).await
        }
    }

    pub async fn presigned_url(&self, url: &str) -> FsResult<Option<String>> {
        let fs = self.get_filesystem(url)?;
        fs.presigned_url(url).await
    }
}

/// Join a child path onto a location, whatever its scheme
pub fn join(base: &str, child: &str) -> String {
    if base.is_empty() {
        return child.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        child.trim_start_matches('/')
    )
}

/// Last path component of a location
pub fn file_name(location: &str) -> &str {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_filesystem_factory_creation() {
        let factory = FilesystemFactory::new(FilesystemConfig::default()).await.unwrap();

        assert!(factory.available_filesystems().contains(&"file"));
        assert!(matches!(
            factory.get_filesystem("s3://bucket/key"),
            Err(FilesystemError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_url_scheme_extraction() {
        let factory = FilesystemFactory::new(FilesystemConfig::default()).await.unwrap();

        assert_eq!(factory.extract_scheme("file:///tmp/test.txt").unwrap(), "file");
        assert_eq!(factory.extract_scheme("s3://bucket/key").unwrap(), "s3");
        assert_eq!(factory.extract_scheme("/local/path").unwrap(), "file");
        assert!(factory.is_remote("s3://bucket/key"));
        assert!(!factory.is_remote("/local/path"));
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_target() {
        let temp_dir = TempDir::new().unwrap();
        let factory = FilesystemFactory::new(FilesystemConfig::default()).await.unwrap();
        let target = join(temp_dir.path().to_str().unwrap(), "db.json");

        factory.write_atomic(&target, b"{\"v\":1}").await.unwrap();
        factory.write_atomic(&target, b"{\"v\":2}").await.unwrap();

        assert_eq!(factory.read(&target).await.unwrap(), b"{\"v\":2}");
        assert!(!factory.exists(&format!("{}{}", target, TEMP_SUFFIX)).await.unwrap());
    }

    #[test]
    fn test_location_helpers() {
        assert_eq!(join("s3://bucket/lib/", "/ds/db.json"), "s3://bucket/lib/ds/db.json");
        assert_eq!(join("/data", "ds"), "/data/ds");
        assert_eq!(file_name("/data/ds/"), "ds");
        assert_eq!(file_name("s3://bucket/lib/ds/db.json"), "db.json");
    }
}
