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

//! Image folder importer: `<input>/<split>/*.{png,jpg,jpeg}`, no annotations

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{
    check_source_dir, dataset_info, file_stem, image_cell, image_files, main_row, main_table_spec,
    subdirectories, Importer, ItemRows, RowStream, IMAGE_TABLE, MAIN_TABLE,
};
use crate::cells::{Row, Value};
use crate::core::{DatasetInfo, Result, TableGroup, TableSpec};

const VIEW: &str = "image";

pub struct ImageFolderImporter {
    info: DatasetInfo,
    input_dir: PathBuf,
}

impl ImageFolderImporter {
    pub fn new(
        name: &str,
        description: &str,
        input_dir: impl Into<PathBuf>,
        splits: Option<Vec<String>>,
    ) -> Result<Self> {
        let input_dir = input_dir.into();
        check_source_dir(&input_dir)?;
        let splits = match splits {
            Some(splits) => splits,
            None => subdirectories(&input_dir)?,
        };

        let mut info = dataset_info(name, description, &splits);
        info.add_table(TableGroup::Main, main_table_spec(&[]));
        info.add_table(
            TableGroup::Media,
            TableSpec::new(IMAGE_TABLE, &[("id", "str"), (VIEW, "image")]),
        );
        Ok(Self { info, input_dir })
    }

    fn item_rows(&self, split: &str, path: &Path) -> Result<ItemRows> {
        // Stems can repeat across splits
        let item_id = format!("{}_{}", split, file_stem(path));
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let uri = format!("{}/{}", split, file_name);

        let mut item = ItemRows::new();
        item.push(TableGroup::Main, MAIN_TABLE, main_row(&item_id, &[VIEW], split));

        let mut media = Row::new();
        media.insert("id".into(), item_id.as_str().into());
        media.insert(VIEW.into(), Value::Image(image_cell(&self.input_dir, &uri)?));
        item.push(TableGroup::Media, IMAGE_TABLE, media);
        Ok(item)
    }
}

impl Importer for ImageFolderImporter {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn media_sources(&self) -> BTreeMap<String, PathBuf> {
        BTreeMap::from([(VIEW.to_string(), self.input_dir.clone())])
    }

    fn import_rows(&self) -> Result<RowStream<'_>> {
        let mut work = Vec::new();
        for split in &self.info.splits {
            for path in image_files(&self.input_dir.join(split))? {
                work.push((split.clone(), path));
            }
        }
        tracing::info!("🔍 Image folder: {} images", work.len());
        Ok(Box::new(
            work.into_iter()
                .map(move |(split, path)| self.item_rows(&split, &path)),
        ))
    }
}
