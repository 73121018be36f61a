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

//! # PixanoDB - Columnar Dataset Engine
//!
//! Storage and data-access core for annotated computer-vision datasets.
//!
//! ## Layout
//!
//! - **codec**: RLE masks, polygons and bounding-box kernels
//! - **cells**: typed values (images, boxes, masks, poses, embeddings) and rows
//! - **schema**: field type registry and the arrow mapping of every cell
//! - **storage**: local/S3 filesystems and versioned parquet tables
//! - **catalog**: dataset library and `db.json`
//! - **importers**: COCO, DOTA, image folder, BOP and legacy sources
//! - **services**: item assembly, similarity search and stats

pub mod catalog;
pub mod cells;
pub mod codec;
pub mod compute;
pub mod core;
pub mod importers;
pub mod schema;
pub mod services;
pub mod storage;

pub use crate::catalog::{Dataset, DatasetLibrary};
pub use crate::core::*;
pub use crate::services::{DatasetItem, DatasetService};
