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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::error::{PixanoError, Result};
use crate::storage::filesystem::s3::S3Config;
use crate::storage::filesystem::FilesystemConfig;

/// Options recognized in the settings file and in the environment
const SETTING_KEYS: &[&str] = &[
    "library_dir",
    "model_dir",
    "aws_endpoint",
    "aws_access_key_id",
    "aws_secret_access_key",
    "aws_region",
    "local_model_dir",
];

/// Process-wide settings block. Read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Filesystem path or `s3://` URI of the dataset library
    pub library_dir: String,

    /// Local directory holding ONNX models
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    #[serde(default)]
    pub aws_endpoint: Option<String>,

    #[serde(default)]
    pub aws_access_key_id: Option<String>,

    #[serde(default)]
    pub aws_secret_access_key: Option<String>,

    #[serde(default)]
    pub aws_region: Option<String>,

    /// Local mirror for models when the library is remote
    #[serde(default)]
    pub local_model_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from an optional TOML file overlaid with process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(path, env)
    }

    /// Load settings from an optional file and an explicit environment map
    pub fn load_from(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        Self::build(path, env, None)
    }

    /// Load settings with `library_dir` forced to the given location
    pub fn load_with_library(path: Option<&Path>, library_dir: &str) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::build(path, env, Some(library_dir))
    }

    fn build(path: Option<&Path>, env: HashMap<String, String>, library_dir: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        // Only the recognized options are lifted from the environment
        let env: config::Map<String, String> = env
            .into_iter()
            .filter(|(key, _)| SETTING_KEYS.contains(&key.to_lowercase().as_str()))
            .collect();
        builder = builder
            .add_source(config::Environment::default().source(Some(env)))
            .set_override_option("library_dir", library_dir)
            .map_err(|e| PixanoError::Config(e.to_string()))?;

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PixanoError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check presence of required options
    pub fn validate(&self) -> Result<()> {
        if self.library_dir.trim().is_empty() {
            return Err(PixanoError::Config("library_dir is required".to_string()));
        }

        if self.is_remote() {
            let missing: Vec<&str> = [
                ("aws_endpoint", &self.aws_endpoint),
                ("aws_access_key_id", &self.aws_access_key_id),
                ("aws_secret_access_key", &self.aws_secret_access_key),
                ("aws_region", &self.aws_region),
            ]
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(key, _)| *key)
            .collect();

            if !missing.is_empty() {
                return Err(PixanoError::Config(format!(
                    "S3 library requires: {}",
                    missing.join(", ")
                )));
            }
            if self.local_model_dir.is_none() {
                return Err(PixanoError::Config(
                    "local_model_dir is required when library_dir is remote".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// True when the library lives in an S3-compatible object store
    pub fn is_remote(&self) -> bool {
        self.library_dir.starts_with("s3://")
    }

    /// Directory listed by `list_models`
    pub fn models_dir(&self) -> Option<&Path> {
        if self.is_remote() {
            self.local_model_dir.as_deref()
        } else {
            self.model_dir.as_deref()
        }
    }

    /// Filesystem backends needed to reach the library
    pub fn filesystem_config(&self) -> FilesystemConfig {
        let mut config = FilesystemConfig::default();
        if self.is_remote() {
            config.s3 = Some(S3Config {
                endpoint: self.aws_endpoint.clone(),
                region: self.aws_region.clone().unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: self.aws_access_key_id.clone(),
                secret_access_key: self.aws_secret_access_key.clone(),
                ..Default::default()
            });
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_local_settings_from_env() {
        let settings = Settings::load_from(
            None,
            env(&[("LIBRARY_DIR", "/data/library"), ("MODEL_DIR", "/data/models"), ("HOME", "/root")]),
        )
        .unwrap();

        assert_eq!(settings.library_dir, "/data/library");
        assert_eq!(settings.model_dir, Some(PathBuf::from("/data/models")));
        assert!(!settings.is_remote());
        assert!(settings.filesystem_config().s3.is_none());
    }

    #[test]
    fn test_library_dir_required() {
        let err = Settings::load_from(None, env(&[("MODEL_DIR", "/models")])).unwrap_err();
        assert!(matches!(err, PixanoError::Config(_)));
    }

    #[test]
    fn test_remote_library_requires_credentials() {
        let err = Settings::load_from(None, env(&[("LIBRARY_DIR", "s3://bucket/datasets")])).unwrap_err();
        assert!(matches!(err, PixanoError::Config(msg) if msg.contains("aws_endpoint")));

        let settings = Settings::load_from(
            None,
            env(&[
                ("LIBRARY_DIR", "s3://bucket/datasets"),
                ("AWS_ENDPOINT", "http://localhost:9000"),
                ("AWS_ACCESS_KEY_ID", "key"),
                ("AWS_SECRET_ACCESS_KEY", "secret"),
                ("AWS_REGION", "eu-west-3"),
                ("LOCAL_MODEL_DIR", "/tmp/models"),
            ]),
        )
        .unwrap();
        assert!(settings.is_remote());
        assert_eq!(settings.models_dir(), Some(Path::new("/tmp/models")));
        assert_eq!(settings.filesystem_config().s3.unwrap().region, "eu-west-3");
    }

    #[test]
    fn test_library_override_keeps_file_settings() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pixano.toml");
        std::fs::write(
            &path,
            "aws_endpoint = \"http://localhost:9000\"\n\
             aws_access_key_id = \"key\"\n\
             aws_secret_access_key = \"secret\"\n\
             aws_region = \"eu-west-3\"\n\
             local_model_dir = \"/tmp/models\"\n",
        )
        .unwrap();

        let settings = Settings::build(Some(&path), env(&[]), Some("s3://bucket/datasets")).unwrap();
        assert_eq!(settings.library_dir, "s3://bucket/datasets");
        assert_eq!(settings.aws_access_key_id.as_deref(), Some("key"));

        std::fs::write(&path, "aws_region = [unclosed").unwrap();
        assert!(matches!(
            Settings::build(Some(&path), env(&[]), Some("/data/library")),
            Err(PixanoError::Config(_))
        ));
    }
}
