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

//! Dataset preview mosaic written as `preview.png`

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;
use std::io::Cursor;

use crate::catalog::Dataset;
use crate::cells::{Image, Value};
use crate::core::{Result, TableGroup};

pub const TILE_SIZE: u32 = 64;
pub const TILES_X: u32 = 4;
pub const TILES_Y: u32 = 2;

/// 4x2 mosaic of thumbnails sampled at random from the first image media table.
/// `None` when that table holds no image.
pub async fn build_preview(dataset: &Dataset) -> Result<Option<Vec<u8>>> {
    let Some((table_name, field)) = first_image_field(dataset).await? else {
        return Ok(None);
    };

    let rows = dataset.open_table(&table_name).await?.scan(None).await?;
    let images: Vec<&Image> = rows
        .iter()
        .filter_map(|row| match row.get(&field) {
            Some(Value::Image(image)) => Some(image),
            _ => None,
        })
        .collect();
    if images.is_empty() {
        return Ok(None);
    }

    let wanted = (TILES_X * TILES_Y) as usize;
    let sample: Vec<&Image> = images
        .choose_multiple(&mut rand::thread_rng(), wanted)
        .copied()
        .collect();

    let mut mosaic = RgbImage::from_pixel(TILE_SIZE * TILES_X, TILE_SIZE * TILES_Y, Rgb([0, 0, 0]));
    let mut placed = 0u32;
    for cell in sample {
        let Some(raw) = tile_source(dataset, &field, cell).await else {
            continue;
        };
        let decoded = match image::load_from_memory(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!("⚠️ Skipping undecodable preview tile {}: {}", cell.uri, e);
                continue;
            }
        };
        let tile = decoded.resize_to_fill(TILE_SIZE, TILE_SIZE, FilterType::Triangle).to_rgb8();
        let (x, y) = ((placed % TILES_X) * TILE_SIZE, (placed / TILES_X) * TILE_SIZE);
        imageops::replace(&mut mosaic, &tile, x as i64, y as i64);
        placed += 1;
    }
    if placed == 0 {
        return Ok(None);
    }

    let mut out = Cursor::new(Vec::new());
    mosaic.write_to(&mut out, image::ImageOutputFormat::Png)?;
    tracing::debug!("🖼️ Built {}-tile preview for {}", placed, dataset.id());
    Ok(Some(out.into_inner()))
}

async fn first_image_field(dataset: &Dataset) -> Result<Option<(String, String)>> {
    for spec in dataset.info.tables_in(TableGroup::Media) {
        if !dataset.table_exists(&spec.name).await? {
            continue;
        }
        let table = dataset.open_table(&spec.name).await?;
        let field = table
            .schema()
            .fields()
            .find(|(_, field_type)| field_type.is_image())
            .map(|(field, _)| field.to_string());
        if let Some(field) = field {
            return Ok(Some((spec.name.clone(), field)));
        }
    }
    Ok(None)
}

/// Stored thumbnail when present, otherwise the media file itself
async fn tile_source(dataset: &Dataset, field: &str, image: &Image) -> Option<Vec<u8>> {
    if let Some(preview) = &image.preview_bytes {
        return Some(preview.clone());
    }
    let location = image.url(&dataset.media_prefix(field));
    match dataset.fs().read(&location).await {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::debug!("📭 Media {} unreadable for preview: {}", location, e);
            None
        }
    }
}
