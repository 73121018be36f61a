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

//! Embedding payloads: opaque segment blobs and fixed-size search vectors

use arrow_schema::DataType;

use super::{invalid, list_of, Scalar};
use crate::core::Result;

/// Table type of embedding tables holding per-view segmentation blobs
pub const SEGMENT: &str = "segment";

/// Table type of embedding tables holding per-view search vectors
pub const SEARCH: &str = "search";

pub fn segment_type() -> DataType {
    DataType::Binary
}

pub fn vector_type() -> DataType {
    list_of(DataType::Float32)
}

pub fn vector_to_scalar(vector: &[f32], dim: usize) -> Result<Scalar> {
    check_dimension(vector, dim)?;
    Ok(Scalar::List(vector.iter().map(|&v| Scalar::Float32(v)).collect()))
}

pub fn vector_from_scalar(scalar: &Scalar, dim: usize) -> Result<Vec<f32>> {
    let vector: Vec<f32> = scalar.to_f64_list()?.into_iter().map(|v| v as f32).collect();
    check_dimension(&vector, dim)?;
    Ok(vector)
}

fn check_dimension(vector: &[f32], dim: usize) -> Result<()> {
    if vector.len() != dim {
        return Err(invalid(
            "embedding",
            format!("vector has {} components, column declares {}", vector.len(), dim),
        ));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(invalid("embedding", "non-finite component"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_enforced() {
        let scalar = vector_to_scalar(&[0.5, 0.25, 0.0], 3).unwrap();
        assert_eq!(vector_from_scalar(&scalar, 3).unwrap(), vec![0.5, 0.25, 0.0]);
        assert!(vector_from_scalar(&scalar, 512).is_err());
        assert!(vector_to_scalar(&[0.0; 4], 3).is_err());
    }
}
