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
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{base64_bytes, field, invalid, list_of, struct_of, Cell, Scalar};
use crate::core::Result;

/// 16-bit depth raster, little-endian, row-major, `shape = [height, width]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthImage {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub shape: [u32; 2],
}

impl DepthImage {
    pub fn new(bytes: Vec<u8>, shape: [u32; 2]) -> Result<Self> {
        let depth = Self { bytes, shape };
        depth.validate()?;
        Ok(depth)
    }

    /// Decode a 16-bit (or 8-bit, widened) grayscale image file
    pub fn from_encoded(raw: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(raw)?.to_luma16();
        let (width, height) = decoded.dimensions();
        let bytes = decoded
            .as_raw()
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        Self::new(bytes, [height, width])
    }

    pub fn height(&self) -> usize {
        self.shape[0] as usize
    }

    pub fn width(&self) -> usize {
        self.shape[1] as usize
    }

    pub fn to_array(&self) -> Result<Array2<u16>> {
        let values: Vec<u16> = self
            .bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Array2::from_shape_vec((self.height(), self.width()), values)
            .map_err(|e| invalid("depthimage", e))
    }
}

impl Cell for DepthImage {
    fn to_struct() -> DataType {
        struct_of(vec![
            field("bytes", DataType::Binary),
            field("shape", list_of(DataType::Int32)),
        ])
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Struct(vec![
            Scalar::Binary(self.bytes.clone()),
            Scalar::List(self.shape.iter().map(|&d| Scalar::Int32(d as i32)).collect()),
        ])
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        let children = scalar.struct_children("depthimage", 2)?;
        let shape = children[1].to_i64_list()?;
        if shape.len() != 2 || shape.iter().any(|&d| d < 0) {
            return Err(invalid("depthimage", format!("bad shape {:?}", shape)));
        }
        Ok(Self {
            bytes: children[0].to_bytes()?,
            shape: [shape[0] as u32, shape[1] as u32],
        })
    }

    fn validate(&self) -> Result<()> {
        let expected = 2 * self.height() * self.width();
        if self.bytes.len() != expected {
            return Err(invalid(
                "depthimage",
                format!(
                    "{} bytes for shape {:?}, expected {}",
                    self.bytes.len(),
                    self.shape,
                    expected
                ),
            ));
        }
        Ok(())
    }
}
