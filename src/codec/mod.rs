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

//! Geometry and mask codecs shared by the cells, importers and item service

pub mod bbox;
pub mod polygon;
pub mod rle;

pub use bbox::{denormalize, mask_to_bbox, normalize, xywh_to_xyxy, xyxy_to_xywh};
pub use polygon::{polygons_to_mask, polygons_to_rle, rle_to_polygons};
pub use rle::{
    encode_rle, mask_to_rle, mask_to_urle, merge_rles, rle_to_mask, rle_to_urle, urle_to_mask,
    urle_to_rle, CompressedRle, MaskInput, Urle,
};
