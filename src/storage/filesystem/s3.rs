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

//! S3-compatible object store backend (AWS S3, MinIO, ...)
//!
//! The client is built on first access and validated with a bucket probe, so a bad
//! configuration surfaces at that first access rather than at construction.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use super::{DirEntry, FileMetadata, FileOptions, FileSystem, FilesystemError, FsResult};

/// S3 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,

    /// AWS region
    pub region: String,

    /// Static credentials; the default provider chain is used when absent
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Path-style addressing, required by most self-hosted stores
    pub force_path_style: bool,

    /// Lifetime of presigned URLs in seconds
    pub presign_expiry_seconds: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: true,
            presign_expiry_seconds: 3600,
        }
    }
}

/// S3 filesystem implementation
pub struct S3FileSystem {
    config: S3Config,
    client: OnceCell<Client>,
}

fn network<E: std::error::Error>(err: E) -> FilesystemError {
    FilesystemError::Network(DisplayErrorContext(err).to_string())
}

impl S3FileSystem {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    /// Parse `s3://bucket/key` into bucket and key
    pub fn parse_s3_url(path: &str) -> FsResult<(String, String)> {
        let url = Url::parse(path)?;
        if url.scheme() != "s3" {
            return Err(FilesystemError::UnsupportedScheme(url.scheme().to_string()));
        }
        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| FilesystemError::Config(format!("Invalid S3 path format: {}", path)))?;
        Ok((bucket.to_string(), url.path().trim_start_matches('/').to_string()))
    }

    async fn client(&self, bucket: &str) -> FsResult<&Client> {
        self.client
            .get_or_try_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.config.region.clone()));

                if let (Some(key), Some(secret)) =
                    (&self.config.access_key_id, &self.config.secret_access_key)
                {
                    loader = loader.credentials_provider(Credentials::new(
                        key.clone(),
                        secret.clone(),
                        None,
                        None,
                        "pixano-settings",
                    ));
                }
                if let Some(endpoint) = &self.config.endpoint {
                    loader = loader.endpoint_url(endpoint.clone());
                }

                let shared = loader.load().await;
                let s3_config = aws_sdk_s3::config::Builder::from(&shared)
                    .force_path_style(self.config.force_path_style)
                    .build();
                let client = Client::from_conf(s3_config);

                tracing::debug!("🔐 Probing S3 bucket {}", bucket);
                client
                    .head_bucket()
                    .bucket(bucket)
                    .send()
                    .await
                    .map_err(|e| {
                        FilesystemError::Auth(format!(
                            "cannot access bucket {}: {}",
                            bucket,
                            DisplayErrorContext(e)
                        ))
                    })?;
                tracing::info!("✅ S3 client ready for bucket {}", bucket);

                Ok::<Client, FilesystemError>(client)
            })
            .await
    }

    async fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> FsResult<(Vec<aws_sdk_s3::types::Object>, Vec<String>)> {
        let client = self.client(bucket).await?;
        let mut objects = Vec::new();
        let mut prefixes = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_delimiter(delimiter.map(str::to_string))
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(network)?;

            objects.extend(output.contents().iter().cloned());
            prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok((objects, prefixes))
    }
}

fn timestamp(value: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<chrono::DateTime<chrono::Utc>> {
    value.and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

#[async_trait]
impl FileSystem for S3FileSystem {
    async fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let (bucket, key) = Self::parse_s3_url(path)?;
        let client = self.client(&bucket).await?;

        let output = client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map_or(false, |service| service.is_no_such_key()) {
                    FilesystemError::NotFound(path.to_string())
                } else {
                    network(e)
                }
            })?;

        let data = output.body.collect().await.map_err(network)?;
        Ok(data.into_bytes().to_vec())
    }

    async fn write(&self, path: &str, data: &[u8], options: Option<FileOptions>) -> FsResult<()> {
        let (bucket, key) = Self::parse_s3_url(path)?;
        let options = options.unwrap_or_default();

        if !options.overwrite && self.exists(path).await? {
            return Err(FilesystemError::AlreadyExists(path.to_string()));
        }

        let client = self.client(&bucket).await?;
        client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(network)?;
        Ok(())
    }

    /// Deletes an object, or every object under the prefix when given a "directory"
    async fn delete(&self, path: &str) -> FsResult<()> {
        let (bucket, key) = Self::parse_s3_url(path)?;
        let client = self.client(&bucket).await?;

        let keys: Vec<String> = if self.exists(path).await? {
            vec![key]
        } else {
            let prefix = format!("{}/", key.trim_end_matches('/'));
            let (objects, _) = self.list_keys(&bucket, &prefix, None).await?;
            objects.iter().filter_map(|o| o.key().map(str::to_string)).collect()
        };

        if keys.is_empty() {
            return Err(FilesystemError::NotFound(path.to_string()));
        }

        for key in keys {
            client
                .delete_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(network)?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(FilesystemError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn metadata(&self, path: &str) -> FsResult<FileMetadata> {
        let (bucket, key) = Self::parse_s3_url(path)?;
        let client = self.client(&bucket).await?;

        let output = client
            .head_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map_or(false, |service| service.is_not_found()) {
                    FilesystemError::NotFound(path.to_string())
                } else {
                    network(e)
                }
            })?;

        Ok(FileMetadata {
            path: path.to_string(),
            size: output.content_length().unwrap_or(0).max(0) as u64,
            modified: timestamp(output.last_modified()),
            is_directory: false,
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn list(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let (bucket, key) = Self::parse_s3_url(path)?;
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key.trim_end_matches('/'))
        };
        let (objects, prefixes) = self.list_keys(&bucket, &prefix, Some("/")).await?;

        let mut entries: Vec<DirEntry> = prefixes
            .into_iter()
            .map(|p| {
                let location = format!("s3://{}/{}", bucket, p.trim_end_matches('/'));
                DirEntry {
                    name: super::file_name(&location).to_string(),
                    path: location.clone(),
                    metadata: FileMetadata {
                        path: location,
                        size: 0,
                        modified: None,
                        is_directory: true,
                        etag: None,
                    },
                }
            })
            .collect();

        entries.extend(objects.iter().filter_map(|object| {
            let key = object.key()?;
            let location = format!("s3://{}/{}", bucket, key);
            Some(DirEntry {
                name: super::file_name(&location).to_string(),
                path: location.clone(),
                metadata: FileMetadata {
                    path: location,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    modified: timestamp(object.last_modified()),
                    is_directory: false,
                    etag: object.e_tag().map(str::to_string),
                },
            })
        }));

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn create_dir_all(&self, _path: &str) -> FsResult<()> {
        // Object stores have no directories
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> FsResult<()> {
        let (from_bucket, from_key) = Self::parse_s3_url(from)?;
        let (to_bucket, to_key) = Self::parse_s3_url(to)?;
        let client = self.client(&to_bucket).await?;

        client
            .copy_object()
            .copy_source(format!("{}/{}", from_bucket, from_key))
            .bucket(&to_bucket)
            .key(&to_key)
            .send()
            .await
            .map_err(network)?;
        Ok(())
    }

    async fn move_file(&self, from: &str, to: &str) -> FsResult<()> {
        self.copy(from, to).await?;
        self.delete(from).await
    }

    async fn presigned_url(&self, path: &str) -> FsResult<Option<String>> {
        let (bucket, key) = Self::parse_s3_url(path)?;
        let client = self.client(&bucket).await?;

        let presigning = PresigningConfig::expires_in(Duration::from_secs(self.config.presign_expiry_seconds))
            .map_err(|e| FilesystemError::Config(e.to_string()))?;
        let request = client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(network)?;

        Ok(Some(request.uri().to_string()))
    }

    fn filesystem_type(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_url_parsing() {
        let (bucket, key) = S3FileSystem::parse_s3_url("s3://pixano/library/coco/db.json").unwrap();
        assert_eq!(bucket, "pixano");
        assert_eq!(key, "library/coco/db.json");

        let (bucket, key) = S3FileSystem::parse_s3_url("s3://pixano").unwrap();
        assert_eq!(bucket, "pixano");
        assert_eq!(key, "");

        assert!(S3FileSystem::parse_s3_url("file:///tmp/a").is_err());
    }

    #[test]
    fn test_construction_does_not_connect() {
        let fs = S3FileSystem::new(S3Config {
            endpoint: Some("http://127.0.0.1:1".to_string()),
            ..Default::default()
        });
        assert_eq!(fs.filesystem_type(), "s3");
        assert!(fs.client.get().is_none());
    }
}
