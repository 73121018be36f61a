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

use thiserror::Error;

use crate::storage::filesystem::FilesystemError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PixanoError>;

#[derive(Error, Debug)]
pub enum PixanoError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid cell: {0}")]
    InvalidCell(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("No search index: {0}")]
    NoSearchIndex(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Missing source: {0}")]
    MissingSource(String),

    #[error("Mask is empty")]
    EmptyMask,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filesystem error: {0}")]
    Filesystem(FilesystemError),

    #[error("Disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PixanoError {
    /// HTTP status the external service layer should surface for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PixanoError::EntityNotFound(_) | PixanoError::NoSearchIndex(_) => 404,
            PixanoError::UnknownFieldType(_)
            | PixanoError::SchemaMismatch(_)
            | PixanoError::InvalidCell(_)
            | PixanoError::EmptyMask => 400,
            PixanoError::StoreUnavailable(_) => 503,
            PixanoError::Filesystem(FilesystemError::NotFound(_)) => 404,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PixanoError::EntityNotFound(_) | PixanoError::Filesystem(FilesystemError::NotFound(_))
        )
    }
}

impl From<FilesystemError> for PixanoError {
    fn from(err: FilesystemError) -> Self {
        match err {
            FilesystemError::Auth(msg)
            | FilesystemError::PermissionDenied(msg)
            | FilesystemError::Network(msg) => PixanoError::StoreUnavailable(msg),
            FilesystemError::Config(msg) => PixanoError::StoreUnavailable(msg),
            other => PixanoError::Filesystem(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PixanoError::EntityNotFound("x".into()).status_code(), 404);
        assert_eq!(PixanoError::UnknownFieldType("blob".into()).status_code(), 400);
        assert_eq!(PixanoError::InvalidCell("nan".into()).status_code(), 400);
        assert_eq!(PixanoError::StoreUnavailable("s3".into()).status_code(), 503);
        assert_eq!(PixanoError::NoSearchIndex("ds".into()).status_code(), 404);
    }

    #[test]
    fn test_filesystem_auth_maps_to_store_unavailable() {
        let err: PixanoError = FilesystemError::Auth("bad key".into()).into();
        assert!(matches!(err, PixanoError::StoreUnavailable(_)));

        let err: PixanoError = FilesystemError::NotFound("db.json".into()).into();
        assert!(err.is_not_found());
    }
}
