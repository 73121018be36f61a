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

//! Key predicates evaluated against stored batches before rows are decoded

use arrow_array::cast::AsArray;
use arrow_array::{Array, RecordBatch};
use arrow_schema::DataType;
use std::collections::HashSet;

use crate::cells::{Row, Value};

/// Equality or set membership on a string column
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: String },
    In { column: String, values: HashSet<String> },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn in_set<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Primary key filter
    pub fn id(value: impl Into<String>) -> Self {
        Self::eq("id", value)
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::In { column, .. } => column,
        }
    }

    pub fn matches_str(&self, candidate: &str) -> bool {
        match self {
            Filter::Eq { value, .. } => value == candidate,
            Filter::In { values, .. } => values.contains(candidate),
        }
    }

    pub fn matches_row(&self, row: &Row) -> bool {
        match row.get(self.column()) {
            Some(Value::Str(s)) => self.matches_str(s),
            _ => false,
        }
    }

    /// Indices of the matching rows of a batch; a batch without the column matches nothing
    pub fn select(&self, batch: &RecordBatch) -> Vec<usize> {
        let Some(column) = batch.column_by_name(self.column()) else {
            return Vec::new();
        };
        if column.data_type() != &DataType::Utf8 {
            return Vec::new();
        }
        let strings = column.as_string::<i32>();
        (0..strings.len())
            .filter(|&i| strings.is_valid(i) && self.matches_str(strings.value(i)))
            .collect()
    }
}
