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

use super::{f64_list, field, fixed, invalid, list_of, struct_of, Cell, Scalar};
use crate::core::Result;

/// Camera intrinsics and world-to-camera extrinsics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    #[serde(default = "unit_scale")]
    pub depth_scale: f64,
    #[serde(rename = "cam_K")]
    pub cam_k: Vec<f64>,
    #[serde(rename = "cam_R_w2c", default)]
    pub cam_r_w2c: [f64; 9],
    #[serde(default)]
    pub cam_t_w2c: [f64; 3],
}

fn unit_scale() -> f64 {
    1.0
}

impl Camera {
    pub fn new(depth_scale: f64, cam_k: Vec<f64>) -> Result<Self> {
        let camera = Self {
            depth_scale,
            cam_k,
            cam_r_w2c: [0.0; 9],
            cam_t_w2c: [0.0; 3],
        };
        camera.validate()?;
        Ok(camera)
    }
}

impl Cell for Camera {
    fn to_struct() -> DataType {
        struct_of(vec![
            field("depth_scale", DataType::Float64),
            field("cam_K", list_of(DataType::Float64)),
            field("cam_R_w2c", list_of(DataType::Float64)),
            field("cam_t_w2c", list_of(DataType::Float64)),
        ])
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Struct(vec![
            Scalar::Float64(self.depth_scale),
            f64_list(&self.cam_k),
            f64_list(&self.cam_r_w2c),
            f64_list(&self.cam_t_w2c),
        ])
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        let children = scalar.struct_children("camera", 4)?;
        let zeros_if_null = |s: &Scalar| -> Result<Vec<f64>> {
            Ok(s.optional(Scalar::to_f64_list)?.unwrap_or_default())
        };
        let rotation = zeros_if_null(&children[2])?;
        let translation = zeros_if_null(&children[3])?;
        Ok(Self {
            depth_scale: children[0].optional(Scalar::to_f64)?.unwrap_or(1.0),
            cam_k: children[1].to_f64_list()?,
            cam_r_w2c: if rotation.is_empty() { [0.0; 9] } else { fixed(rotation, "camera")? },
            cam_t_w2c: if translation.is_empty() { [0.0; 3] } else { fixed(translation, "camera")? },
        })
    }

    fn validate(&self) -> Result<()> {
        if self.cam_k.len() < 3 {
            return Err(invalid(
                "camera",
                format!("cam_K needs at least 3 entries, got {}", self.cam_k.len()),
            ));
        }
        let finite = std::iter::once(&self.depth_scale)
            .chain(self.cam_k.iter())
            .chain(self.cam_r_w2c.iter())
            .chain(self.cam_t_w2c.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(invalid("camera", "non-finite component"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_extrinsics_default_to_zero() {
        let camera: Camera = serde_json::from_value(serde_json::json!({
            "cam_K": [572.4, 0.0, 325.2, 0.0, 573.5, 242.0, 0.0, 0.0, 1.0],
            "depth_scale": 0.1
        }))
        .unwrap();
        assert_eq!(camera.cam_r_w2c, [0.0; 9]);
        assert_eq!(camera.cam_t_w2c, [0.0; 3]);
        assert_eq!(Camera::from_scalar(&camera.to_scalar()).unwrap(), camera);
    }

    #[test]
    fn test_short_intrinsics_rejected() {
        assert!(Camera::new(1.0, vec![1.0, 2.0]).is_err());
    }
}
