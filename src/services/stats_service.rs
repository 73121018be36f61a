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

//! Dataset statistics: category and area histograms over objects, aspect ratios over
//! image views, persisted as `stats.json`

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::catalog::{Dataset, STATS_FILE};
use crate::cells::{Image, Row, Value};
use crate::core::{Result, TableGroup};

/// Number of bins of numerical histograms
pub const NUM_BINS: usize = 10;

pub const CATEGORY_STAT: &str = "objects - category";
pub const GROUP_OF_STAT: &str = "objects - is group of";
pub const AREA_STAT: &str = "objects - area (%)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    Categorical,
    Numerical,
}

/// One histogram entry of one split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub split: String,
    /// Category of a categorical histogram
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_end: Option<f64>,
    pub counts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StatType,
    pub histogram: Vec<HistogramBin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
}

impl Stat {
    /// Total count over every bin and split
    pub fn total(&self) -> usize {
        self.histogram.iter().map(|bin| bin.counts).sum()
    }

    fn categorical(name: &str, samples: &BTreeMap<String, BTreeMap<String, usize>>) -> Self {
        let histogram = samples
            .iter()
            .flat_map(|(split, counts)| {
                counts.iter().map(move |(value, count)| HistogramBin {
                    split: split.clone(),
                    value: Some(value.clone()),
                    bin_start: None,
                    bin_end: None,
                    counts: *count,
                })
            })
            .collect();
        Self {
            name: name.to_string(),
            kind: StatType::Categorical,
            histogram,
            range: None,
        }
    }

    /// Uniform bins over `range`; the last bin is closed on the right
    pub fn numerical(name: &str, samples: &BTreeMap<String, Vec<f64>>, range: [f64; 2]) -> Self {
        let [low, high] = range;
        let width = (high - low) / NUM_BINS as f64;

        let mut histogram = Vec::with_capacity(samples.len() * NUM_BINS);
        for (split, values) in samples {
            let mut counts = [0usize; NUM_BINS];
            for value in values {
                let index = if width > 0.0 {
                    (((value - low) / width).floor().max(0.0) as usize).min(NUM_BINS - 1)
                } else {
                    0
                };
                counts[index] += 1;
            }
            histogram.extend(counts.iter().enumerate().map(|(i, count)| HistogramBin {
                split: split.clone(),
                value: None,
                bin_start: Some(low + width * i as f64),
                bin_end: Some(low + width * (i + 1) as f64),
                counts: *count,
            }));
        }

        Self {
            name: name.to_string(),
            kind: StatType::Numerical,
            histogram,
            range: Some(range),
        }
    }
}

#[derive(Default)]
struct ObjectSamples {
    categories: BTreeMap<String, BTreeMap<String, usize>>,
    group_of: BTreeMap<String, BTreeMap<String, usize>>,
    areas: BTreeMap<String, Vec<f64>>,
}

impl ObjectSamples {
    fn add(&mut self, split: &str, row: &Row) -> Result<()> {
        let category = row
            .get("category")
            .or_else(|| row.get("category_name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| row.get("category_id").and_then(Value::as_i64).map(|id| id.to_string()));
        if let Some(category) = category {
            *self
                .categories
                .entry(split.to_string())
                .or_default()
                .entry(category)
                .or_default() += 1;
        }

        if let Some(group_of) = row.get("is_group_of").and_then(Value::as_bool) {
            *self
                .group_of
                .entry(split.to_string())
                .or_default()
                .entry(group_of.to_string())
                .or_default() += 1;
        }

        // Objects without mask only count towards categorical stats
        if let Some(Value::Rle(mask)) = row.get("mask") {
            let pixels = (mask.height() * mask.width()) as f64;
            if pixels > 0.0 {
                let area = match row.get("area").and_then(Value::as_f64) {
                    Some(area) => area,
                    None => mask.area()? as f64,
                };
                self.areas
                    .entry(split.to_string())
                    .or_default()
                    .push(100.0 * area / pixels);
            }
        }
        Ok(())
    }
}

/// Compute every statistic of a dataset
pub async fn compute_stats(dataset: &Dataset) -> Result<Vec<Stat>> {
    let main_rows = dataset.main_table().await?.scan(None).await?;
    let splits: HashMap<String, String> = main_rows
        .iter()
        .filter_map(|row| {
            let id = row.get("id")?.as_str()?;
            let split = row.get("split").and_then(Value::as_str).unwrap_or_default();
            Some((id.to_string(), split.to_string()))
        })
        .collect();

    let mut stats = Vec::new();

    let mut objects = ObjectSamples::default();
    for spec in dataset.info.tables_in(TableGroup::Objects) {
        if !dataset.table_exists(&spec.name).await? {
            continue;
        }
        for row in dataset.open_table(&spec.name).await?.scan(None).await? {
            let split = row
                .get("item_id")
                .and_then(Value::as_str)
                .and_then(|id| splits.get(id))
                .map(String::as_str)
                .unwrap_or_default();
            objects.add(split, &row)?;
        }
    }
    if !objects.categories.is_empty() {
        stats.push(Stat::categorical(CATEGORY_STAT, &objects.categories));
    }
    if !objects.group_of.is_empty() {
        stats.push(Stat::categorical(GROUP_OF_STAT, &objects.group_of));
    }
    if !objects.areas.is_empty() {
        stats.push(Stat::numerical(AREA_STAT, &objects.areas, [0.0, 100.0]));
    }

    for spec in dataset.info.tables_in(TableGroup::Media) {
        if !dataset.table_exists(&spec.name).await? {
            continue;
        }
        let table = dataset.open_table(&spec.name).await?;
        let views: Vec<String> = table
            .schema()
            .fields()
            .filter(|(_, field_type)| field_type.is_image())
            .map(|(name, _)| name.to_string())
            .collect();
        if views.is_empty() {
            continue;
        }

        let rows = table.scan(None).await?;
        for view in views {
            let mut ratios: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for row in &rows {
                let Some(Value::Image(image)) = row.get(&view) else {
                    continue;
                };
                if let Some(ratio) = aspect_ratio(dataset, &view, image).await {
                    let split = row
                        .get("id")
                        .and_then(Value::as_str)
                        .and_then(|id| splits.get(id))
                        .map(String::as_str)
                        .unwrap_or_default();
                    ratios.entry(split.to_string()).or_default().push(ratio);
                }
            }

            let observed = ratios.values().flatten().copied();
            let (low, high) = observed.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r), hi.max(r))
            });
            if low.is_finite() {
                let name = format!("{} - aspect ratio", view);
                stats.push(Stat::numerical(&name, &ratios, [low, high]));
            }
        }
    }

    tracing::info!("📊 Computed {} stats for dataset {}", stats.len(), dataset.id());
    Ok(stats)
}

/// Width over height of the media file, falling back to the stored preview
async fn aspect_ratio(dataset: &Dataset, view: &str, image: &Image) -> Option<f64> {
    let location = image.url(&dataset.media_prefix(view));
    let size = match dataset.fs().read(&location).await {
        Ok(data) => imagesize::blob_size(&data).ok(),
        Err(e) => {
            tracing::debug!("📭 Media {} unreadable for stats: {}", location, e);
            None
        }
    }
    .or_else(|| {
        image
            .preview_bytes
            .as_deref()
            .and_then(|preview| imagesize::blob_size(preview).ok())
    })?;

    (size.height > 0).then(|| size.width as f64 / size.height as f64)
}

/// Replace `stats.json` with the given stats
pub async fn write_stats(dataset: &Dataset, stats: &[Stat]) -> Result<()> {
    let data = serde_json::to_vec_pretty(stats)?;
    dataset.fs().write_atomic(&dataset.file(STATS_FILE), &data).await?;
    Ok(())
}
