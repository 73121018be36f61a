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
use std::collections::BTreeMap;

use super::{BBox, Cell, GtInfo, Pose, Row, Value};
use crate::codec::{urle_to_rle, CompressedRle, Urle};
use crate::core::{PixanoError, Result, GROUND_TRUTH};
use crate::schema::TableSchema;

/// Columns mapped onto dedicated [`ObjectAnnotation`] fields
pub const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "item_id",
    "view_id",
    "bbox",
    "mask",
    "pose",
    "gt_info",
    "category_id",
    "category_name",
    "category",
];

/// Mask as stored (compressed) or as submitted by clients (either form)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskValue {
    Rle(CompressedRle),
    Urle(Urle),
}

impl MaskValue {
    pub fn to_rle(&self) -> Result<CompressedRle> {
        match self {
            MaskValue::Rle(rle) => Ok(rle.clone()),
            MaskValue::Urle(urle) => urle_to_rle(urle),
        }
    }
}

fn default_source() -> String {
    GROUND_TRUTH.to_string()
}

/// One object of an item, joined from whichever objects table holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAnnotation {
    pub id: String,
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub view_id: Option<String>,
    #[serde(default = "default_source")]
    pub source_id: String,
    #[serde(default)]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub mask: Option<MaskValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt_info: Option<GtInfo>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
    /// Free scalar columns of the source table
    #[serde(default)]
    pub features: BTreeMap<String, serde_json::Value>,
}

impl ObjectAnnotation {
    pub fn new(id: impl Into<String>, item_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_id: item_id.into(),
            view_id: None,
            source_id: source_id.into(),
            bbox: None,
            mask: None,
            pose: None,
            gt_info: None,
            category_id: None,
            category_name: None,
            features: BTreeMap::new(),
        }
    }

    /// Rebuild from a stored row of an objects table
    pub fn from_row(row: &Row, source_id: &str) -> Result<Self> {
        let text = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);

        let id = text("id")
            .ok_or_else(|| PixanoError::SchemaMismatch("object row without id".to_string()))?;

        let mut object = ObjectAnnotation::new(id, text("item_id").unwrap_or_default(), source_id);
        object.view_id = text("view_id");
        object.category_id = row.get("category_id").and_then(Value::as_i64);
        object.category_name = text("category_name").or_else(|| text("category"));

        for (name, value) in row {
            match (name.as_str(), value) {
                ("bbox", Value::BBox(bbox)) => object.bbox = Some(bbox.clone()),
                ("mask", Value::Rle(rle)) => object.mask = Some(MaskValue::Rle(rle.clone())),
                ("pose", Value::Pose(pose)) => object.pose = Some(pose.clone()),
                ("gt_info", Value::GtInfo(info)) => object.gt_info = Some(info.clone()),
                (name, value) if !RESERVED_COLUMNS.contains(&name) && !value.is_null() => {
                    object.features.insert(name.to_string(), value.to_json()?);
                }
                _ => {}
            }
        }
        Ok(object)
    }

    /// Convert a submitted URLE mask and fill a missing or zero bbox from the mask
    pub fn canonicalize(&mut self) -> Result<()> {
        let rle = match &self.mask {
            Some(mask) => Some(mask.to_rle()?),
            None => None,
        };
        if let Some(rle) = &rle {
            rle.validate()?;
            let needs_bbox = self.bbox.as_ref().map_or(true, BBox::is_zero);
            if needs_bbox && !rle.counts.is_empty() {
                self.bbox = Some(BBox::from_rle(rle)?);
            }
        }
        self.mask = rle.map(MaskValue::Rle);
        if let Some(bbox) = &self.bbox {
            bbox.validate()?;
        }
        Ok(())
    }

    /// Row shaped for `schema`; columns the object does not carry take their default
    pub fn to_row(&self, schema: &TableSchema) -> Result<Row> {
        let mut row = Row::new();
        for (name, field_type) in schema.fields() {
            let value = match name {
                "id" => Value::Str(self.id.clone()),
                "item_id" => Value::Str(self.item_id.clone()),
                "view_id" => self.view_id.clone().map(Value::Str).unwrap_or(Value::Null),
                "bbox" => self.bbox.clone().map(Value::BBox).unwrap_or(Value::Null),
                "mask" => match &self.mask {
                    Some(mask) => Value::Rle(mask.to_rle()?),
                    None => Value::Null,
                },
                "pose" => self.pose.clone().map(Value::Pose).unwrap_or(Value::Null),
                "gt_info" => self.gt_info.clone().map(Value::GtInfo).unwrap_or(Value::Null),
                "category_id" => self.category_id.map(Value::Int).unwrap_or(Value::Null),
                "category_name" => self.category_name.clone().map(Value::Str).unwrap_or(Value::Null),
                "category" => self
                    .category_name
                    .clone()
                    .map(Value::Str)
                    .unwrap_or_else(|| field_type.default_value()),
                other => match self.features.get(other) {
                    Some(json) => field_type.value_from_json(json)?,
                    None => field_type.default_value(),
                },
            };
            row.insert(name.to_string(), value);
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TableSpec, PIXANO_ANNOTATOR};

    fn annotator_schema() -> TableSchema {
        TableSchema::from_spec(&TableSpec::new(
            "obj_annotator",
            &[
                ("id", "str"),
                ("item_id", "str"),
                ("view_id", "str"),
                ("bbox", "bbox"),
                ("mask", "compressedrle"),
                ("category_id", "int"),
                ("category_name", "str"),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_submitted_urle_is_canonicalized() {
        let mut object: ObjectAnnotation = serde_json::from_value(serde_json::json!({
            "id": "new",
            "item_id": "632",
            "view_id": "image",
            "source_id": PIXANO_ANNOTATOR,
            "bbox": {"coords": [0, 0, 0, 0], "format": "xywh", "is_normalized": true},
            "mask": {"size": [10, 10], "counts": [45, 2, 8, 3, 8, 2, 32]}
        }))
        .unwrap();
        assert!(matches!(object.mask, Some(MaskValue::Urle(_))));

        object.canonicalize().unwrap();
        match &object.mask {
            Some(MaskValue::Rle(rle)) => assert_eq!(rle.counts, b"]12810Oh0".to_vec()),
            other => panic!("unexpected mask {:?}", other),
        }
        let bbox = object.bbox.as_ref().unwrap();
        assert!((bbox.coords[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_row_roundtrip() {
        let mut object = ObjectAnnotation::new("o1", "632", PIXANO_ANNOTATOR);
        object.view_id = Some("image".into());
        object.bbox = Some(BBox::from_xywh([0.1, 0.1, 0.3, 0.3], true).unwrap());
        object.category_id = Some(3);
        object.category_name = Some("dog".into());

        let schema = annotator_schema();
        let row = object.to_row(&schema).unwrap();
        schema.validate_row(&row).unwrap();
        assert_eq!(row["mask"], Value::Null);

        let back = ObjectAnnotation::from_row(&row, PIXANO_ANNOTATOR).unwrap();
        assert_eq!(back, object);
    }

    #[test]
    fn test_features_keep_free_columns() {
        let mut row = Row::new();
        row.insert("id".into(), "o2".into());
        row.insert("item_id".into(), "1".into());
        row.insert("category".into(), "person".into());
        row.insert("is_group_of".into(), Value::Bool(false));

        let object = ObjectAnnotation::from_row(&row, GROUND_TRUTH).unwrap();
        assert_eq!(object.category_name.as_deref(), Some("person"));
        assert_eq!(object.features["is_group_of"], serde_json::json!(false));
        assert_eq!(object.source_id, GROUND_TRUTH);
    }
}
