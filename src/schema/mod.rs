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

//! Schema registry: field type strings -> cell dispatch and Arrow layouts
//!
//! The recorded type string of a column is the only thing read paths consult to
//! decide how a slot is decoded, so every supported cell is listed in [`FieldType`].

pub mod physical;

use arrow_array::RecordBatch;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cells::{
    embedding, list_of, BBox, Camera, Cell, DepthImage, GtInfo, Image, Pose, Row, Scalar, Value,
};
use crate::codec::{CompressedRle, MaskInput};
use crate::core::{PixanoError, Result, TableSpec};

pub use physical::{build_array, read_scalar};

/// Reserved primary key column of every table
pub const ID: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Str,
    Bytes,
    Image,
    DepthImage,
    Camera,
    CompressedRle,
    Pose,
    BBox,
    GtInfo,
    /// Opaque segment embedding blob
    Embedding,
    /// Search embedding of fixed dimension
    Vector(usize),
    List(Box<FieldType>),
}

impl FromStr for FieldType {
    type Err = PixanoError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_lowercase();
        let unknown = || PixanoError::UnknownFieldType(value.to_string());

        if let Some(inner) = normalized
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return Ok(FieldType::List(Box::new(inner.parse()?)));
        }

        if let Some(dim) = normalized
            .strip_prefix("vector(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return match dim.trim().parse::<usize>() {
                Ok(dim) if dim > 0 => Ok(FieldType::Vector(dim)),
                _ => Err(unknown()),
            };
        }

        Ok(match normalized.as_str() {
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "bool" => FieldType::Bool,
            "str" => FieldType::Str,
            "bytes" => FieldType::Bytes,
            "image" => FieldType::Image,
            "depthimage" => FieldType::DepthImage,
            "camera" => FieldType::Camera,
            "compressedrle" => FieldType::CompressedRle,
            "pose" => FieldType::Pose,
            "bbox" => FieldType::BBox,
            "gtinfo" => FieldType::GtInfo,
            "embedding" => FieldType::Embedding,
            _ => return Err(unknown()),
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Str => f.write_str("str"),
            FieldType::Bytes => f.write_str("bytes"),
            FieldType::Image => f.write_str("image"),
            FieldType::DepthImage => f.write_str("depthimage"),
            FieldType::Camera => f.write_str("camera"),
            FieldType::CompressedRle => f.write_str("compressedrle"),
            FieldType::Pose => f.write_str("pose"),
            FieldType::BBox => f.write_str("bbox"),
            FieldType::GtInfo => f.write_str("gtinfo"),
            FieldType::Embedding => f.write_str("embedding"),
            FieldType::Vector(dim) => write!(f, "vector({})", dim),
            FieldType::List(inner) => write!(f, "[{}]", inner),
        }
    }
}

impl FieldType {
    pub fn to_physical(&self) -> DataType {
        match self {
            FieldType::Int => DataType::Int64,
            FieldType::Float => DataType::Float64,
            FieldType::Bool => DataType::Boolean,
            FieldType::Str => DataType::Utf8,
            FieldType::Bytes => DataType::Binary,
            FieldType::Image => Image::to_struct(),
            FieldType::DepthImage => DepthImage::to_struct(),
            FieldType::Camera => Camera::to_struct(),
            FieldType::CompressedRle => CompressedRle::to_struct(),
            FieldType::Pose => Pose::to_struct(),
            FieldType::BBox => BBox::to_struct(),
            FieldType::GtInfo => GtInfo::to_struct(),
            FieldType::Embedding => embedding::segment_type(),
            FieldType::Vector(_) => embedding::vector_type(),
            FieldType::List(inner) => list_of(inner.to_physical()),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, FieldType::Image)
    }

    /// Value written for rows that predate a column
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Str => Value::Str(String::new()),
            _ => Value::Null,
        }
    }

    /// Validate a logical value against this type and lower it to its physical form
    pub fn to_scalar(&self, value: &Value) -> Result<Scalar> {
        let scalar = match (self, value) {
            (_, Value::Null) => Scalar::Null,
            (FieldType::Int, Value::Int(i)) => Scalar::Int64(*i),
            (FieldType::Float, Value::Float(f)) => Scalar::Float64(*f),
            (FieldType::Float, Value::Int(i)) => Scalar::Float64(*i as f64),
            (FieldType::Bool, Value::Bool(b)) => Scalar::Bool(*b),
            (FieldType::Str, Value::Str(s)) => Scalar::Utf8(s.clone()),
            (FieldType::Bytes, Value::Bytes(b)) => Scalar::Binary(b.clone()),
            (FieldType::Image, Value::Image(cell)) => validated(cell)?,
            (FieldType::DepthImage, Value::DepthImage(cell)) => validated(cell)?,
            (FieldType::Camera, Value::Camera(cell)) => validated(cell)?,
            (FieldType::CompressedRle, Value::Rle(cell)) => validated(cell)?,
            (FieldType::Pose, Value::Pose(cell)) => validated(cell)?,
            (FieldType::BBox, Value::BBox(cell)) => validated(cell)?,
            (FieldType::GtInfo, Value::GtInfo(cell)) => validated(cell)?,
            (FieldType::Embedding, Value::Embedding(blob) | Value::Bytes(blob)) => {
                Scalar::Binary(blob.clone())
            }
            (FieldType::Vector(dim), Value::Vector(vector)) => embedding::vector_to_scalar(vector, *dim)?,
            (FieldType::List(inner), Value::List(items)) => Scalar::List(
                items
                    .iter()
                    .map(|item| inner.to_scalar(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            (field_type, value) => {
                return Err(PixanoError::SchemaMismatch(format!(
                    "{} column cannot hold {:?}",
                    field_type,
                    variant_name(value)
                )))
            }
        };
        Ok(scalar)
    }

    /// Decode a physical slot according to this type
    pub fn from_scalar(&self, scalar: &Scalar) -> Result<Value> {
        if scalar.is_null() {
            return Ok(Value::Null);
        }
        Ok(match self {
            FieldType::Int => Value::Int(scalar.to_i64()?),
            FieldType::Float => Value::Float(scalar.to_f64()?),
            FieldType::Bool => Value::Bool(scalar.to_bool()?),
            FieldType::Str => Value::Str(scalar.to_string_value()?),
            FieldType::Bytes => Value::Bytes(scalar.to_bytes()?),
            FieldType::Image => Value::Image(Image::from_scalar(scalar)?),
            FieldType::DepthImage => Value::DepthImage(DepthImage::from_scalar(scalar)?),
            FieldType::Camera => Value::Camera(Camera::from_scalar(scalar)?),
            FieldType::CompressedRle => Value::Rle(CompressedRle::from_scalar(scalar)?),
            FieldType::Pose => Value::Pose(Pose::from_scalar(scalar)?),
            FieldType::BBox => Value::BBox(BBox::from_scalar(scalar)?),
            FieldType::GtInfo => Value::GtInfo(GtInfo::from_scalar(scalar)?),
            FieldType::Embedding => Value::Embedding(scalar.to_bytes()?),
            FieldType::Vector(dim) => Value::Vector(embedding::vector_from_scalar(scalar, *dim)?),
            FieldType::List(inner) => match scalar {
                Scalar::List(items) => Value::List(
                    items
                        .iter()
                        .map(|item| inner.from_scalar(item))
                        .collect::<Result<Vec<_>>>()?,
                ),
                other => {
                    return Err(PixanoError::SchemaMismatch(format!(
                        "{} column holds {:?}",
                        self, other
                    )))
                }
            },
        })
    }

    /// Decode a JSON value submitted through the service surface
    pub fn value_from_json(&self, json: &serde_json::Value) -> Result<Value> {
        use serde_json::Value as Json;

        let mismatch = || PixanoError::SchemaMismatch(format!("{} column cannot hold {}", self, json));
        let cell = |e: serde_json::Error| PixanoError::InvalidCell(format!("{}: {}", self, e));

        if json.is_null() {
            return Ok(Value::Null);
        }
        Ok(match self {
            FieldType::Int => Value::Int(json.as_i64().ok_or_else(mismatch)?),
            FieldType::Float => Value::Float(json.as_f64().ok_or_else(mismatch)?),
            FieldType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
            FieldType::Str => Value::Str(json.as_str().ok_or_else(mismatch)?.to_string()),
            FieldType::Bytes | FieldType::Embedding => {
                let encoded = json.as_str().ok_or_else(mismatch)?;
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| PixanoError::InvalidCell(format!("{}: {}", self, e)))?;
                if *self == FieldType::Bytes {
                    Value::Bytes(bytes)
                } else {
                    Value::Embedding(bytes)
                }
            }
            FieldType::Image => Value::Image(serde_json::from_value(json.clone()).map_err(cell)?),
            FieldType::DepthImage => Value::DepthImage(serde_json::from_value(json.clone()).map_err(cell)?),
            FieldType::Camera => Value::Camera(serde_json::from_value(json.clone()).map_err(cell)?),
            FieldType::Pose => Value::Pose(serde_json::from_value(json.clone()).map_err(cell)?),
            FieldType::BBox => Value::BBox(serde_json::from_value(json.clone()).map_err(cell)?),
            FieldType::GtInfo => Value::GtInfo(serde_json::from_value(json.clone()).map_err(cell)?),
            FieldType::CompressedRle => match MaskInput::from_json(json)? {
                MaskInput::Compressed(rle) => Value::Rle(rle),
                MaskInput::Uncompressed(urle) => Value::Rle(crate::codec::urle_to_rle(&urle)?),
                MaskInput::Polygons(_) => {
                    return Err(PixanoError::InvalidCell(
                        "polygon masks need the image size to be encoded".to_string(),
                    ))
                }
            },
            FieldType::Vector(_) => Value::Vector(serde_json::from_value(json.clone()).map_err(cell)?),
            FieldType::List(inner) => match json {
                Json::Array(items) => Value::List(
                    items
                        .iter()
                        .map(|item| inner.value_from_json(item))
                        .collect::<Result<Vec<_>>>()?,
                ),
                _ => return Err(mismatch()),
            },
        })
    }
}

fn validated<C: Cell>(cell: &C) -> Result<Scalar> {
    cell.validate()?;
    Ok(cell.to_scalar())
}

fn variant_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Str(_) => "str",
        Value::Bytes(_) => "bytes",
        Value::Image(_) => "image",
        Value::DepthImage(_) => "depthimage",
        Value::Camera(_) => "camera",
        Value::Rle(_) => "compressedrle",
        Value::Pose(_) => "pose",
        Value::BBox(_) => "bbox",
        Value::GtInfo(_) => "gtinfo",
        Value::Embedding(_) => "embedding",
        Value::Vector(_) => "vector",
        Value::List(_) => "list",
    }
}

/// Ordered, parsed column types of one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    fields: IndexMap<String, FieldType>,
}

impl TableSchema {
    /// Parse every type string; unknown types fail here, never at write time
    pub fn from_spec(spec: &TableSpec) -> Result<Self> {
        let fields = spec
            .fields
            .iter()
            .map(|(name, type_str)| Ok((name.clone(), type_str.parse::<FieldType>()?)))
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(Self {
            name: spec.name.clone(),
            fields,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Type strings in declaration order, as stored in `db.json`
    pub fn type_strings(&self) -> IndexMap<String, String> {
        self.fields
            .iter()
            .map(|(name, ty)| (name.clone(), ty.to_string()))
            .collect()
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn to_physical(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.fields
                .iter()
                .map(|(name, ty)| Field::new(name, ty.to_physical(), true))
                .collect::<Vec<_>>(),
        ))
    }

    /// Reject unknown columns, a missing id and values of the wrong shape
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        if let Some(unknown) = row.keys().find(|key| !self.fields.contains_key(*key)) {
            return Err(PixanoError::SchemaMismatch(format!(
                "table {} has no column {}",
                self.name, unknown
            )));
        }
        match row.get(ID) {
            Some(Value::Str(id)) if !id.is_empty() => {}
            _ => {
                return Err(PixanoError::SchemaMismatch(format!(
                    "row of table {} is missing its id",
                    self.name
                )))
            }
        }
        for (name, ty) in &self.fields {
            if let Some(value) = row.get(name) {
                ty.to_scalar(value)?;
            }
        }
        Ok(())
    }

    pub fn rows_to_batch(&self, rows: &[Row]) -> Result<RecordBatch> {
        let columns = self
            .fields
            .iter()
            .map(|(name, ty)| {
                let scalars = rows
                    .iter()
                    .map(|row| row.get(name).map_or(Ok(Scalar::Null), |v| ty.to_scalar(v)))
                    .collect::<Result<Vec<_>>>()?;
                build_array(&ty.to_physical(), &scalars)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordBatch::try_new(self.to_physical(), columns)?)
    }

    /// Decode a stored batch; columns missing from older fragments take their default
    pub fn batch_to_rows(&self, batch: &RecordBatch) -> Result<Vec<Row>> {
        self.batch_rows_at(batch, 0..batch.num_rows())
    }

    pub fn batch_rows_at(
        &self,
        batch: &RecordBatch,
        indices: impl IntoIterator<Item = usize>,
    ) -> Result<Vec<Row>> {
        let columns: Vec<(&String, &FieldType, Option<&arrow_array::ArrayRef>)> = self
            .fields
            .iter()
            .map(|(name, ty)| (name, ty, batch.column_by_name(name)))
            .collect();

        indices
            .into_iter()
            .map(|index| {
                columns
                    .iter()
                    .map(|(name, ty, column)| {
                        let value = match column {
                            Some(array) => ty.from_scalar(&read_scalar(array.as_ref(), index)?)?,
                            None => ty.default_value(),
                        };
                        Ok(((*name).clone(), value))
                    })
                    .collect::<Result<Row>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_strings_parse_case_insensitively() {
        assert_eq!("Image".parse::<FieldType>().unwrap(), FieldType::Image);
        assert_eq!("CompressedRLE".parse::<FieldType>().unwrap(), FieldType::CompressedRle);
        assert_eq!(
            "[str]".parse::<FieldType>().unwrap(),
            FieldType::List(Box::new(FieldType::Str))
        );
        assert_eq!("vector(512)".parse::<FieldType>().unwrap(), FieldType::Vector(512));
        assert_eq!(FieldType::List(Box::new(FieldType::BBox)).to_string(), "[bbox]");
    }

    #[test]
    fn test_unknown_type_fails_at_schema_build() {
        let spec = TableSpec::new("db", &[("id", "str"), ("cloud", "pointcloud")]);
        assert!(matches!(
            TableSchema::from_spec(&spec),
            Err(PixanoError::UnknownFieldType(t)) if t == "pointcloud"
        ));
        assert!("vector(0)".parse::<FieldType>().is_err());
    }

    fn objects_schema() -> TableSchema {
        TableSchema::from_spec(&TableSpec::new(
            "objects",
            &[("id", "str"), ("item_id", "str"), ("bbox", "bbox"), ("area", "float")],
        ))
        .unwrap()
    }

    #[test]
    fn test_validate_row() {
        let schema = objects_schema();
        let mut row = Row::new();
        row.insert("id".into(), "o1".into());
        row.insert(
            "bbox".into(),
            Value::BBox(BBox::from_xywh([0.1, 0.1, 0.2, 0.2], true).unwrap()),
        );
        schema.validate_row(&row).unwrap();

        let mut unknown = row.clone();
        unknown.insert("color".into(), "red".into());
        assert!(matches!(schema.validate_row(&unknown), Err(PixanoError::SchemaMismatch(_))));

        let mut no_id = row.clone();
        no_id.remove("id");
        assert!(matches!(schema.validate_row(&no_id), Err(PixanoError::SchemaMismatch(_))));

        let mut wrong_shape = row.clone();
        wrong_shape.insert("area".into(), "big".into());
        assert!(matches!(schema.validate_row(&wrong_shape), Err(PixanoError::SchemaMismatch(_))));
    }

    #[test]
    fn test_batch_roundtrip_and_widening() {
        let schema = objects_schema();
        let mut row = Row::new();
        row.insert("id".into(), "o1".into());
        row.insert("item_id".into(), "1".into());
        row.insert("area".into(), Value::Int(12));

        let batch = schema.rows_to_batch(&[row]).unwrap();
        let widened = schema.clone().with_field("label", FieldType::Str);
        let rows = widened.batch_to_rows(&batch).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["area"], Value::Float(12.0));
        assert_eq!(rows[0]["bbox"], Value::Null);
        assert_eq!(rows[0]["label"], Value::Str(String::new()));
    }

    #[test]
    fn test_json_values_follow_field_type() {
        let urle = serde_json::json!({"size": [10, 10], "counts": [45, 2, 8, 3, 8, 2, 32]});
        match FieldType::CompressedRle.value_from_json(&urle).unwrap() {
            Value::Rle(rle) => assert_eq!(rle.counts, b"]12810Oh0".to_vec()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            FieldType::List(Box::new(FieldType::Str))
                .value_from_json(&serde_json::json!(["image"]))
                .unwrap(),
            Value::List(vec!["image".into()])
        );
        assert!(FieldType::Int.value_from_json(&serde_json::json!("7")).is_err());
    }
}
