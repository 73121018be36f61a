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

//! Bounding box arithmetic: normalization and corner/size conversions

use ndarray::ArrayView2;

use crate::core::{PixanoError, Result};

/// Divide alternating x and y coordinates by image width and height
pub fn normalize(coords: &[f64], height: usize, width: usize) -> Result<Vec<f64>> {
    scale(coords, height, width, |v, size| v / size)
}

/// Multiply alternating x and y coordinates by image width and height
pub fn denormalize(coords: &[f64], height: usize, width: usize) -> Result<Vec<f64>> {
    scale(coords, height, width, |v, size| v * size)
}

fn scale(coords: &[f64], height: usize, width: usize, op: impl Fn(f64, f64) -> f64) -> Result<Vec<f64>> {
    if coords.len() % 2 != 0 {
        return Err(PixanoError::InvalidCell(format!(
            "coordinate sequence must have even length, got {}",
            coords.len()
        )));
    }
    if height == 0 || width == 0 {
        return Err(PixanoError::InvalidCell(format!(
            "image size must be positive, got {}x{}",
            height, width
        )));
    }

    Ok(coords
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i % 2 == 0 {
                op(v, width as f64)
            } else {
                op(v, height as f64)
            }
        })
        .collect())
}

pub fn xywh_to_xyxy(xywh: [f64; 4]) -> [f64; 4] {
    let [x, y, w, h] = xywh;
    [x, y, x + w, y + h]
}

pub fn xyxy_to_xywh(xyxy: [f64; 4]) -> [f64; 4] {
    let [x0, y0, x1, y1] = xyxy;
    [x0, y0, x1 - x0, y1 - y0]
}

/// Tight `[x, y, w, h]` box around the set pixels, normalized by the mask size
pub fn mask_to_bbox(mask: ArrayView2<u8>) -> Result<[f64; 4]> {
    let (height, width) = mask.dim();

    let mut x_min = usize::MAX;
    let mut y_min = usize::MAX;
    let mut x_max = 0;
    let mut y_max = 0;
    for ((y, x), &value) in mask.indexed_iter() {
        if value != 0 {
            x_min = x_min.min(x);
            y_min = y_min.min(y);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }
    }

    if x_min == usize::MAX {
        return Err(PixanoError::EmptyMask);
    }

    let pixel_box = [
        x_min as f64,
        y_min as f64,
        (x_max - x_min + 1) as f64,
        (y_max - y_min + 1) as f64,
    ];
    let normalized = normalize(&pixel_box, height, width)?;
    Ok([normalized[0], normalized[1], normalized[2], normalized[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_xywh_normalize_roundtrip() {
        let xywh = [1.0, 1.0, 2.0, 2.0];
        assert_eq!(xywh_to_xyxy(xywh), [1.0, 1.0, 3.0, 3.0]);
        assert_eq!(xyxy_to_xywh(xywh_to_xyxy(xywh)), xywh);

        let normalized = normalize(&xywh, 4, 6).unwrap();
        let expected = [1.0 / 6.0, 1.0 / 4.0, 2.0 / 6.0, 2.0 / 4.0];
        for (a, b) in normalized.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-9);
        }

        let back = denormalize(&normalized, 4, 6).unwrap();
        for (a, b) in back.iter().zip(xywh.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(matches!(
            normalize(&[1.0, 2.0, 3.0], 10, 10),
            Err(PixanoError::InvalidCell(_))
        ));
    }

    #[test]
    fn test_mask_to_bbox() {
        let mut mask = Array2::<u8>::zeros((10, 20));
        mask[[2, 4]] = 1;
        mask[[5, 9]] = 1;

        let bbox = mask_to_bbox(mask.view()).unwrap();
        assert!((bbox[0] - 4.0 / 20.0).abs() < 1e-9);
        assert!((bbox[1] - 2.0 / 10.0).abs() < 1e-9);
        assert!((bbox[2] - 6.0 / 20.0).abs() < 1e-9);
        assert!((bbox[3] - 4.0 / 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_mask_has_no_bbox() {
        let mask = Array2::<u8>::zeros((4, 4));
        assert!(matches!(mask_to_bbox(mask.view()), Err(PixanoError::EmptyMask)));
    }
}
