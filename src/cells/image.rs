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

use arrow_schema::DataType;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::{base64_bytes, field, invalid, struct_of, Cell, Scalar};
use crate::core::Result;

/// Longest side of a stored preview
pub const PREVIEW_SIZE: u32 = 128;

/// Image media cell. `uri` is absolute (has a scheme) or relative to the dataset media dir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Image {
    pub uri: String,
    #[serde(default, with = "base64_bytes::option", skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
    #[serde(default, with = "base64_bytes::option", skip_serializing_if = "Option::is_none")]
    pub preview_bytes: Option<Vec<u8>>,
}

impl Image {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            bytes: None,
            preview_bytes: None,
        }
    }

    pub fn with_preview(mut self, preview: Vec<u8>) -> Self {
        self.preview_bytes = Some(preview);
        self
    }

    /// Build the cell for a media file, computing its preview from the raw bytes
    pub fn from_file_bytes(uri: impl Into<String>, raw: &[u8]) -> Result<Self> {
        Ok(Self::new(uri).with_preview(Self::thumbnail(raw)?))
    }

    pub fn is_absolute(&self) -> bool {
        url::Url::parse(&self.uri).is_ok()
    }

    /// Resolve the uri against the dataset media prefix
    pub fn url(&self, media_prefix: &str) -> String {
        if self.is_absolute() || media_prefix.is_empty() {
            self.uri.clone()
        } else {
            format!(
                "{}/{}",
                media_prefix.trim_end_matches('/'),
                self.uri.trim_start_matches('/')
            )
        }
    }

    /// Preview as an inline `data:` URL
    pub fn preview_url(&self) -> Option<String> {
        self.preview_bytes
            .as_ref()
            .map(|bytes| format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }

    /// PNG thumbnail bounded by [`PREVIEW_SIZE`], aspect ratio preserved
    pub fn thumbnail(raw: &[u8]) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(raw)?;
        let thumb = decoded.resize(PREVIEW_SIZE, PREVIEW_SIZE, FilterType::Triangle);
        let mut out = Cursor::new(Vec::new());
        thumb.to_rgb8().write_to(&mut out, image::ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }
}

impl Cell for Image {
    fn to_struct() -> DataType {
        struct_of(vec![
            field("uri", DataType::Utf8),
            field("bytes", DataType::Binary),
            field("preview_bytes", DataType::Binary),
        ])
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Struct(vec![
            Scalar::Utf8(self.uri.clone()),
            self.bytes.clone().map(Scalar::Binary).unwrap_or(Scalar::Null),
            self.preview_bytes.clone().map(Scalar::Binary).unwrap_or(Scalar::Null),
        ])
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        let children = scalar.struct_children("image", 3)?;
        Ok(Self {
            uri: children[0].to_string_value()?,
            bytes: children[1].optional(Scalar::to_bytes)?,
            preview_bytes: children[2].optional(Scalar::to_bytes)?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(invalid("image", "empty uri"));
        }
        if let Some(preview) = &self.preview_bytes {
            let size = imagesize::blob_size(preview)
                .map_err(|e| invalid("image", format!("unreadable preview: {}", e)))?;
            if size.width > PREVIEW_SIZE as usize || size.height > PREVIEW_SIZE as usize {
                return Err(invalid(
                    "image",
                    format!("preview {}x{} exceeds {}px", size.width, size.height, PREVIEW_SIZE),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_thumbnail_is_bounded() {
        let image = Image::from_file_bytes("train/a.png", &png(640, 320)).unwrap();
        image.validate().unwrap();

        let size = imagesize::blob_size(image.preview_bytes.as_ref().unwrap()).unwrap();
        assert_eq!(size.width, 128);
        assert_eq!(size.height, 64);
    }

    #[test]
    fn test_oversized_preview_rejected() {
        let image = Image::new("a.png").with_preview(png(200, 10));
        assert!(image.validate().is_err());
    }

    #[test]
    fn test_url_resolution() {
        let relative = Image::new("train/a.png");
        assert_eq!(relative.url("/data/ds/media/image"), "/data/ds/media/image/train/a.png");
        assert!(!relative.is_absolute());

        let absolute = Image::new("s3://bucket/a.png");
        assert!(absolute.is_absolute());
        assert_eq!(absolute.url("/ignored"), "s3://bucket/a.png");
    }

    #[test]
    fn test_json_uses_base64() {
        let image = Image::new("a.png").with_preview(vec![0, 1, 2]);
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["preview_bytes"], "AAEC");
        assert!(json.get("bytes").is_none());
        assert_eq!(serde_json::from_value::<Image>(json).unwrap(), image);
    }
}
