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

/// Object pose in camera frame: row-major 3x3 rotation and translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    #[serde(rename = "cam_R_m2c")]
    pub cam_r_m2c: [f64; 9],
    pub cam_t_m2c: [f64; 3],
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            cam_r_m2c: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            cam_t_m2c: [0.0; 3],
        }
    }
}

impl Cell for Pose {
    fn to_struct() -> DataType {
        struct_of(vec![
            field("cam_R_m2c", list_of(DataType::Float64)),
            field("cam_t_m2c", list_of(DataType::Float64)),
        ])
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Struct(vec![f64_list(&self.cam_r_m2c), f64_list(&self.cam_t_m2c)])
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        let children = scalar.struct_children("pose", 2)?;
        Ok(Self {
            cam_r_m2c: fixed(children[0].to_f64_list()?, "pose")?,
            cam_t_m2c: fixed(children[1].to_f64_list()?, "pose")?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self
            .cam_r_m2c
            .iter()
            .chain(self.cam_t_m2c.iter())
            .any(|v| !v.is_finite())
        {
            return Err(invalid("pose", "non-finite component"));
        }
        Ok(())
    }
}
