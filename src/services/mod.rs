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

//! Service layer shared by the CLI and any server built on the core

pub mod dataset_service;
pub mod item_service;
pub mod search_service;
pub mod stats_service;

pub use dataset_service::DatasetService;
pub use item_service::{DatasetItem, ItemService, LoadOptions};
pub use search_service::{QueryEncoder, SearchService};
pub use stats_service::{compute_stats, write_stats, Stat, StatType};
