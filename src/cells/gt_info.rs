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

use super::{field, invalid, struct_of, BBox, Cell, Scalar};
use crate::core::Result;

/// Per-object visibility statistics (BOP `scene_gt_info`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GtInfo {
    pub bbox_obj: BBox,
    pub bbox_visib: BBox,
    pub px_count_all: i32,
    pub px_count_valid: i32,
    pub px_count_visib: i32,
    pub visib_fract: f32,
}

impl Cell for GtInfo {
    fn to_struct() -> DataType {
        struct_of(vec![
            field("bbox_obj", BBox::to_struct()),
            field("bbox_visib", BBox::to_struct()),
            field("px_count_all", DataType::Int32),
            field("px_count_valid", DataType::Int32),
            field("px_count_visib", DataType::Int32),
            field("visib_fract", DataType::Float32),
        ])
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Struct(vec![
            self.bbox_obj.to_scalar(),
            self.bbox_visib.to_scalar(),
            Scalar::Int32(self.px_count_all),
            Scalar::Int32(self.px_count_valid),
            Scalar::Int32(self.px_count_visib),
            Scalar::Float32(self.visib_fract),
        ])
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        let children = scalar.struct_children("gtinfo", 6)?;
        Ok(Self {
            bbox_obj: BBox::from_scalar(&children[0])?,
            bbox_visib: BBox::from_scalar(&children[1])?,
            px_count_all: children[2].to_i64()? as i32,
            px_count_valid: children[3].to_i64()? as i32,
            px_count_visib: children[4].to_i64()? as i32,
            visib_fract: children[5].to_f64()? as f32,
        })
    }

    fn validate(&self) -> Result<()> {
        self.bbox_obj.validate()?;
        self.bbox_visib.validate()?;
        if !(0.0..=1.0).contains(&self.visib_fract) {
            return Err(invalid(
                "gtinfo",
                format!("visib_fract {} out of [0, 1]", self.visib_fract),
            ));
        }
        Ok(())
    }
}
