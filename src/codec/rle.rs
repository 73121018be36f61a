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

//! Run-length mask encodings
//!
//! Masks are scanned column-major. The uncompressed form (URLE) is a list of run
//! lengths starting with the leading zero run; the compressed form packs the same
//! runs into the COCO character encoding (5 bits per char, second-order deltas).

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Deserializer, Serialize};

use super::polygon;
use crate::core::{PixanoError, Result};

/// Compressed run-length mask, `size = [height, width]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedRle {
    pub size: [u32; 2],
    #[serde(with = "counts_string")]
    pub counts: Vec<u8>,
}

/// Uncompressed run-length mask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Urle {
    pub size: [u32; 2],
    pub counts: Vec<u32>,
}

/// Any mask representation accepted by [`encode_rle`]
#[derive(Debug, Clone, PartialEq)]
pub enum MaskInput {
    Polygons(Vec<Vec<f64>>),
    Uncompressed(Urle),
    Compressed(CompressedRle),
}

impl CompressedRle {
    pub fn empty(height: u32, width: u32) -> Self {
        Self {
            size: [height, width],
            counts: Vec::new(),
        }
    }

    pub fn height(&self) -> usize {
        self.size[0] as usize
    }

    pub fn width(&self) -> usize {
        self.size[1] as usize
    }

    /// Number of set pixels
    pub fn area(&self) -> Result<u64> {
        let runs = decode_counts(&self.counts)?;
        Ok(runs.iter().skip(1).step_by(2).map(|&r| r as u64).sum())
    }
}

impl MaskInput {
    /// Dispatch on the JSON shape: list of lists is a polygon set, an object with a
    /// list `counts` is URLE, an object with a string `counts` is already compressed.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Array(items) if items.iter().all(Value::is_array) => {
                let polygons: Vec<Vec<f64>> = serde_json::from_value(value.clone())
                    .map_err(|e| PixanoError::InvalidCell(format!("invalid polygon list: {}", e)))?;
                Ok(MaskInput::Polygons(polygons))
            }
            Value::Object(map) => match map.get("counts") {
                Some(Value::Array(_)) => serde_json::from_value(value.clone())
                    .map(MaskInput::Uncompressed)
                    .map_err(|e| PixanoError::InvalidCell(format!("invalid URLE: {}", e))),
                Some(Value::String(_)) => serde_json::from_value(value.clone())
                    .map(MaskInput::Compressed)
                    .map_err(|e| PixanoError::InvalidCell(format!("invalid RLE: {}", e))),
                _ => Err(PixanoError::InvalidCell("mask object without counts".to_string())),
            },
            other => Err(PixanoError::InvalidCell(format!(
                "unrecognized mask shape: {}",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for MaskInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        MaskInput::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Canonicalize any mask representation to compressed RLE
pub fn encode_rle(input: &MaskInput, height: usize, width: usize) -> Result<CompressedRle> {
    match input {
        MaskInput::Polygons(polygons) => polygon::polygons_to_rle(polygons, height, width),
        MaskInput::Uncompressed(urle) => urle_to_rle(urle),
        MaskInput::Compressed(rle) => Ok(rle.clone()),
    }
}

pub fn rle_to_urle(rle: &CompressedRle) -> Result<Urle> {
    Ok(Urle {
        size: rle.size,
        counts: decode_counts(&rle.counts)?,
    })
}

pub fn urle_to_rle(urle: &Urle) -> Result<CompressedRle> {
    check_run_total(&urle.counts, urle.size)?;
    Ok(CompressedRle {
        size: urle.size,
        counts: encode_counts(&urle.counts),
    })
}

pub fn rle_to_mask(rle: &CompressedRle) -> Result<Array2<u8>> {
    urle_to_mask(&rle_to_urle(rle)?)
}

pub fn mask_to_rle(mask: ArrayView2<u8>) -> CompressedRle {
    let urle = mask_to_urle(mask);
    CompressedRle {
        size: urle.size,
        counts: encode_counts(&urle.counts),
    }
}

pub fn urle_to_mask(urle: &Urle) -> Result<Array2<u8>> {
    let (height, width) = (urle.size[0] as usize, urle.size[1] as usize);
    let mut mask = Array2::<u8>::zeros((height, width));
    if urle.counts.is_empty() {
        return Ok(mask);
    }
    check_run_total(&urle.counts, urle.size)?;

    let mut position = 0usize;
    for (i, &run) in urle.counts.iter().enumerate() {
        let run = run as usize;
        if i % 2 == 1 {
            for p in position..position + run {
                mask[[p % height, p / height]] = 1;
            }
        }
        position += run;
    }
    Ok(mask)
}

pub fn mask_to_urle(mask: ArrayView2<u8>) -> Urle {
    let (height, width) = mask.dim();
    let mut counts = Vec::new();
    let mut current = false;
    let mut run = 0u32;

    for x in 0..width {
        for y in 0..height {
            let value = mask[[y, x]] != 0;
            if value != current {
                counts.push(run);
                run = 0;
                current = value;
            }
            run += 1;
        }
    }
    counts.push(run);

    Urle {
        size: [height as u32, width as u32],
        counts,
    }
}

/// Union of masks sharing the same size
pub fn merge_rles(rles: &[CompressedRle]) -> Result<CompressedRle> {
    let first = rles
        .first()
        .ok_or_else(|| PixanoError::InvalidCell("cannot merge an empty RLE list".to_string()))?;

    let mut merged = rle_to_mask(first)?;
    for rle in &rles[1..] {
        if rle.size != first.size {
            return Err(PixanoError::InvalidCell(format!(
                "cannot merge masks of size {:?} and {:?}",
                first.size, rle.size
            )));
        }
        let mask = rle_to_mask(rle)?;
        merged.zip_mut_with(&mask, |a, &b| *a |= b);
    }
    Ok(mask_to_rle(merged.view()))
}

fn check_run_total(counts: &[u32], size: [u32; 2]) -> Result<()> {
    let total: u64 = counts.iter().map(|&c| c as u64).sum();
    let expected = size[0] as u64 * size[1] as u64;
    if total != expected {
        return Err(PixanoError::InvalidCell(format!(
            "runs cover {} pixels, mask size {}x{} needs {}",
            total, size[0], size[1], expected
        )));
    }
    Ok(())
}

pub(crate) fn encode_counts(counts: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(counts.len() * 2);
    for (i, &count) in counts.iter().enumerate() {
        let mut x = count as i64;
        if i > 2 {
            x -= counts[i - 2] as i64;
        }
        let mut more = true;
        while more {
            let mut c = x & 0x1f;
            x >>= 5;
            more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            out.push((c + 48) as u8);
        }
    }
    out
}

pub(crate) fn decode_counts(encoded: &[u8]) -> Result<Vec<u32>> {
    let mut counts: Vec<i64> = Vec::new();
    let mut p = 0;

    while p < encoded.len() {
        let mut x: i64 = 0;
        let mut k = 0;
        let mut more = true;
        while more {
            let byte = *encoded
                .get(p)
                .ok_or_else(|| PixanoError::InvalidCell("truncated RLE counts".to_string()))?;
            let c = byte as i64 - 48;
            if !(0..64).contains(&c) || k >= 12 {
                return Err(PixanoError::InvalidCell(format!(
                    "invalid RLE counts byte {:?} at {}",
                    byte as char, p
                )));
            }
            x |= (c & 0x1f) << (5 * k);
            more = c & 0x20 != 0;
            p += 1;
            k += 1;
            if !more && c & 0x10 != 0 {
                x |= -1i64 << (5 * k);
            }
        }
        let m = counts.len();
        if m > 2 {
            x += counts[m - 2];
        }
        if x < 0 || x > u32::MAX as i64 {
            return Err(PixanoError::InvalidCell(format!("invalid run length {}", x)));
        }
        counts.push(x);
    }

    Ok(counts.into_iter().map(|c| c as u32).collect())
}

mod counts_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(counts: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(counts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn triangle_urle() -> Urle {
        Urle {
            size: [10, 10],
            counts: vec![45, 2, 8, 3, 8, 2, 32],
        }
    }

    #[test]
    fn test_urle_to_rle_matches_coco_string() {
        let rle = urle_to_rle(&triangle_urle()).unwrap();
        assert_eq!(rle.counts, b"]12810Oh0".to_vec());
        assert_eq!(rle_to_urle(&rle).unwrap(), triangle_urle());
    }

    #[test]
    fn test_triangle_dense_mask() {
        let rle = CompressedRle {
            size: [10, 10],
            counts: b"]12810Oh0".to_vec(),
        };
        let mask = rle_to_mask(&rle).unwrap();

        let mut expected = Array2::<u8>::zeros((10, 10));
        for (y, x) in [(5, 4), (6, 4), (5, 5), (6, 5), (7, 5), (6, 6), (7, 6)] {
            expected[[y, x]] = 1;
        }
        assert_eq!(mask, expected);
        assert_eq!(rle.area().unwrap(), 7);
        assert_eq!(mask_to_rle(mask.view()), rle);
    }

    #[test]
    fn test_empty_counts_is_empty_mask() {
        let mask = rle_to_mask(&CompressedRle::empty(3, 4)).unwrap();
        assert_eq!(mask.dim(), (3, 4));
        assert!(mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_first_pixel_set_starts_with_zero_run() {
        let mut mask = Array2::<u8>::zeros((2, 2));
        mask[[0, 0]] = 1;
        assert_eq!(mask_to_urle(mask.view()).counts, vec![0, 1, 3]);
    }

    #[test]
    fn test_run_total_mismatch_is_invalid() {
        let urle = Urle {
            size: [4, 4],
            counts: vec![3, 2],
        };
        assert!(matches!(urle_to_rle(&urle), Err(PixanoError::InvalidCell(_))));
    }

    #[test]
    fn test_mask_input_dispatch() {
        let polygons = serde_json::json!([[0.0, 0.0, 4.0, 0.0, 4.0, 4.0]]);
        assert!(matches!(MaskInput::from_json(&polygons).unwrap(), MaskInput::Polygons(_)));

        let urle = serde_json::json!({"size": [10, 10], "counts": [45, 2, 8, 3, 8, 2, 32]});
        let input = MaskInput::from_json(&urle).unwrap();
        assert_eq!(encode_rle(&input, 10, 10).unwrap().counts, b"]12810Oh0".to_vec());

        let rle = serde_json::json!({"size": [10, 10], "counts": "]12810Oh0"});
        assert!(matches!(MaskInput::from_json(&rle).unwrap(), MaskInput::Compressed(_)));

        assert!(MaskInput::from_json(&serde_json::json!(42)).is_err());
    }

    #[test]
    fn test_merge_is_union() {
        let mut a = Array2::<u8>::zeros((4, 4));
        a[[0, 0]] = 1;
        let mut b = Array2::<u8>::zeros((4, 4));
        b[[3, 3]] = 1;

        let merged = merge_rles(&[mask_to_rle(a.view()), mask_to_rle(b.view())]).unwrap();
        assert_eq!(merged.area().unwrap(), 2);
    }

    proptest! {
        #[test]
        fn prop_urle_roundtrip(bits in proptest::collection::vec(0u8..2, 1..120), height in 1usize..12) {
            let width = (bits.len() + height - 1) / height;
            let mut mask = Array2::<u8>::zeros((height, width));
            for (i, bit) in bits.iter().enumerate() {
                mask[[i % height, i / height]] = *bit;
            }
            let urle = mask_to_urle(mask.view());
            let rle = urle_to_rle(&urle).unwrap();
            prop_assert_eq!(rle_to_urle(&rle).unwrap(), urle);
            prop_assert_eq!(rle_to_mask(&rle).unwrap(), mask);
        }
    }
}
