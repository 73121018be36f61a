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
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{field, invalid, list_of, struct_of, Cell, Scalar};
use crate::codec;
use crate::core::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BBoxFormat {
    Xyxy,
    #[default]
    Xywh,
}

impl BBoxFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BBoxFormat::Xyxy => "xyxy",
            BBoxFormat::Xywh => "xywh",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "xyxy" => Ok(BBoxFormat::Xyxy),
            "xywh" => Ok(BBoxFormat::Xywh),
            other => Err(invalid("bbox", format!("unknown format {:?}", other))),
        }
    }
}

impl fmt::Display for BBoxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in `xyxy` or `xywh` layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub coords: [f32; 4],
    #[serde(default)]
    pub format: BBoxFormat,
    #[serde(default = "default_normalized")]
    pub is_normalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

fn default_normalized() -> bool {
    true
}

impl BBox {
    pub fn new(coords: [f32; 4], format: BBoxFormat, is_normalized: bool) -> Result<Self> {
        let bbox = Self {
            coords,
            format,
            is_normalized,
            confidence: None,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn from_xywh(coords: [f32; 4], is_normalized: bool) -> Result<Self> {
        Self::new(coords, BBoxFormat::Xywh, is_normalized)
    }

    pub fn from_xyxy(coords: [f32; 4], is_normalized: bool) -> Result<Self> {
        Self::new(coords, BBoxFormat::Xyxy, is_normalized)
    }

    /// Normalized xywh box around the set pixels of a mask
    pub fn from_rle(rle: &codec::CompressedRle) -> Result<Self> {
        let mask = codec::rle_to_mask(rle)?;
        let [x, y, w, h] = codec::mask_to_bbox(mask.view())?;
        Self::from_xywh([x as f32, y as f32, w as f32, h as f32], true)
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// True for the all-zero placeholder box some clients submit
    pub fn is_zero(&self) -> bool {
        self.coords.iter().all(|&c| c == 0.0)
    }

    pub fn to_xyxy(&self) -> BBox {
        match self.format {
            BBoxFormat::Xyxy => self.clone(),
            BBoxFormat::Xywh => {
                let converted = codec::xywh_to_xyxy(self.coords_f64());
                self.with_coords(converted, BBoxFormat::Xyxy)
            }
        }
    }

    pub fn to_xywh(&self) -> BBox {
        match self.format {
            BBoxFormat::Xywh => self.clone(),
            BBoxFormat::Xyxy => {
                let converted = codec::xyxy_to_xywh(self.coords_f64());
                self.with_coords(converted, BBoxFormat::Xywh)
            }
        }
    }

    pub fn normalize(&self, height: usize, width: usize) -> Result<BBox> {
        if self.is_normalized {
            return Ok(self.clone());
        }
        let coords = codec::normalize(&self.coords_f64(), height, width)?;
        let bbox = BBox {
            is_normalized: true,
            ..self.with_coords([coords[0], coords[1], coords[2], coords[3]], self.format)
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn denormalize(&self, height: usize, width: usize) -> Result<BBox> {
        if !self.is_normalized {
            return Ok(self.clone());
        }
        let coords = codec::denormalize(&self.coords_f64(), height, width)?;
        Ok(BBox {
            is_normalized: false,
            ..self.with_coords([coords[0], coords[1], coords[2], coords[3]], self.format)
        })
    }

    /// Box area in the box's own units
    pub fn area(&self) -> f64 {
        let [_, _, w, h] = self.to_xywh().coords_f64();
        (w * h).max(0.0)
    }

    fn coords_f64(&self) -> [f64; 4] {
        self.coords.map(|c| c as f64)
    }

    fn with_coords(&self, coords: [f64; 4], format: BBoxFormat) -> BBox {
        BBox {
            coords: coords.map(|c| c as f32),
            format,
            is_normalized: self.is_normalized,
            confidence: self.confidence,
        }
    }
}

impl Cell for BBox {
    fn to_struct() -> DataType {
        struct_of(vec![
            field("coords", list_of(DataType::Float32)),
            field("format", DataType::Utf8),
            field("is_normalized", DataType::Boolean),
            field("confidence", DataType::Float32),
        ])
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Struct(vec![
            Scalar::List(self.coords.iter().map(|&c| Scalar::Float32(c)).collect()),
            Scalar::Utf8(self.format.as_str().to_string()),
            Scalar::Bool(self.is_normalized),
            self.confidence.map(Scalar::Float32).unwrap_or(Scalar::Null),
        ])
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        let children = scalar.struct_children("bbox", 4)?;
        let coords = children[0].to_f64_list()?;
        if coords.len() != 4 {
            return Err(invalid("bbox", format!("expected 4 coords, got {}", coords.len())));
        }
        Ok(Self {
            coords: [coords[0] as f32, coords[1] as f32, coords[2] as f32, coords[3] as f32],
            format: BBoxFormat::parse(&children[1].to_string_value()?)?,
            is_normalized: children[2].to_bool()?,
            confidence: children[3].optional(|s| s.to_f64().map(|c| c as f32))?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.coords.iter().any(|c| !c.is_finite()) {
            return Err(invalid("bbox", format!("non-finite coords {:?}", self.coords)));
        }
        if self.is_normalized && self.coords.iter().any(|&c| !(0.0..=1.0).contains(&c)) {
            return Err(invalid(
                "bbox",
                format!("normalized coords out of [0, 1]: {:?}", self.coords),
            ));
        }
        if let Some(confidence) = self.confidence {
            if !confidence.is_finite() {
                return Err(invalid("bbox", "non-finite confidence"));
            }
        }
        Ok(())
    }
}
