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

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::cells::{Row, Value};
use crate::core::{Result, TableGroup};

/// Enumerated values of one categorical field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    /// Whether the UI restricts edits to the listed values
    pub restricted: bool,
    pub values: BTreeSet<String>,
}

/// Content of `features_values.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureValues {
    #[serde(default)]
    pub main: BTreeMap<String, FeatureValue>,
    #[serde(default)]
    pub objects: BTreeMap<String, FeatureValue>,
}

impl FeatureValues {
    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.objects.is_empty()
    }

    /// Record the values a row carries for the tracked fields of its group
    pub fn observe(&mut self, group: TableGroup, fields: &[String], row: &Row) -> Result<()> {
        let target = match group {
            TableGroup::Main => &mut self.main,
            TableGroup::Objects => &mut self.objects,
            _ => return Ok(()),
        };
        for field in fields {
            let rendered = match row.get(field) {
                None | Some(Value::Null) => continue,
                Some(Value::Str(s)) => s.clone(),
                Some(Value::Int(i)) => i.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(other) => other.to_json()?.to_string(),
            };
            target
                .entry(field.clone())
                .or_insert_with(|| FeatureValue {
                    restricted: false,
                    values: BTreeSet::new(),
                })
                .values
                .insert(rendered);
        }
        Ok(())
    }
}
