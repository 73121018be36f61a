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

//! Typed cells: the closed set of vision values stored in dataset tables
//!
//! Every cell maps to one Arrow struct (or primitive) layout through [`Cell`]. Rows
//! exchanged with the store are maps of [`Value`]; the physical side of a value is a
//! [`Scalar`] tree that mirrors the Arrow layout of its column.

pub mod bbox;
pub mod camera;
pub mod compressed_rle;
pub mod depth_image;
pub mod embedding;
pub mod gt_info;
pub mod image;
pub mod object_annotation;
pub mod pose;

use arrow_schema::{DataType, Field, Fields};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::codec::CompressedRle;
use crate::core::{PixanoError, Result};

pub use self::bbox::{BBox, BBoxFormat};
pub use self::camera::Camera;
pub use self::depth_image::DepthImage;
pub use self::gt_info::GtInfo;
pub use self::image::Image;
pub use self::object_annotation::{MaskValue, ObjectAnnotation};
pub use self::pose::Pose;

/// Physical value of one column slot, shaped like the column's Arrow type
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    List(Vec<Scalar>),
    /// Children in the order of the struct fields
    Struct(Vec<Scalar>),
}

/// Binding between a semantic cell and its columnar layout
pub trait Cell: Sized {
    /// Arrow type of the column holding this cell
    fn to_struct() -> DataType;

    fn to_scalar(&self) -> Scalar;

    fn from_scalar(scalar: &Scalar) -> Result<Self>;

    /// Check the cell invariants, failing with `InvalidCell`
    fn validate(&self) -> Result<()>;
}

/// Logical value of one row field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(#[serde(serialize_with = "base64_bytes::serialize")] Vec<u8>),
    Image(Image),
    DepthImage(DepthImage),
    Camera(Camera),
    Rle(CompressedRle),
    Pose(Pose),
    BBox(BBox),
    GtInfo(GtInfo),
    Embedding(#[serde(serialize_with = "base64_bytes::serialize")] Vec<u8>),
    Vector(Vec<f32>),
    List(Vec<Value>),
}

/// One table row keyed by column name
pub type Row = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Strings of a `[str]` value
    pub fn as_str_list(&self) -> Option<Vec<&str>> {
        match self {
            Value::List(items) => items.iter().map(Value::as_str).collect(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Nullable struct field, the only kind used by cell layouts
pub(crate) fn field(name: &str, data_type: DataType) -> Field {
    Field::new(name, data_type, true)
}

pub(crate) fn list_of(data_type: DataType) -> DataType {
    DataType::List(std::sync::Arc::new(Field::new("item", data_type, true)))
}

pub(crate) fn struct_of(fields: Vec<Field>) -> DataType {
    DataType::Struct(Fields::from(fields))
}

pub(crate) fn invalid(cell: &str, detail: impl std::fmt::Display) -> PixanoError {
    PixanoError::InvalidCell(format!("{}: {}", cell, detail))
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Children of a struct scalar with the expected arity
    pub fn struct_children(&self, cell: &str, arity: usize) -> Result<&[Scalar]> {
        match self {
            Scalar::Struct(children) if children.len() == arity => Ok(children),
            other => Err(invalid(cell, format!("expected struct of {} fields, got {:?}", arity, other))),
        }
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self {
            Scalar::Bool(b) => Ok(*b),
            other => Err(invalid("bool", format!("{:?}", other))),
        }
    }

    pub fn to_i64(&self) -> Result<i64> {
        match self {
            Scalar::Int32(i) => Ok(*i as i64),
            Scalar::Int64(i) => Ok(*i),
            other => Err(invalid("int", format!("{:?}", other))),
        }
    }

    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Scalar::Float32(f) => Ok(*f as f64),
            Scalar::Float64(f) => Ok(*f),
            Scalar::Int32(i) => Ok(*i as f64),
            Scalar::Int64(i) => Ok(*i as f64),
            other => Err(invalid("float", format!("{:?}", other))),
        }
    }

    pub fn to_string_value(&self) -> Result<String> {
        match self {
            Scalar::Utf8(s) => Ok(s.clone()),
            other => Err(invalid("str", format!("{:?}", other))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Scalar::Binary(b) => Ok(b.clone()),
            other => Err(invalid("bytes", format!("{:?}", other))),
        }
    }

    pub fn to_f64_list(&self) -> Result<Vec<f64>> {
        match self {
            Scalar::List(items) => items.iter().map(Scalar::to_f64).collect(),
            other => Err(invalid("list", format!("{:?}", other))),
        }
    }

    pub fn to_i64_list(&self) -> Result<Vec<i64>> {
        match self {
            Scalar::List(items) => items.iter().map(Scalar::to_i64).collect(),
            other => Err(invalid("list", format!("{:?}", other))),
        }
    }

    pub fn optional<T>(&self, read: impl FnOnce(&Scalar) -> Result<T>) -> Result<Option<T>> {
        if self.is_null() {
            Ok(None)
        } else {
            read(self).map(Some)
        }
    }
}

pub(crate) fn f64_list(values: &[f64]) -> Scalar {
    Scalar::List(values.iter().map(|&v| Scalar::Float64(v)).collect())
}

pub(crate) fn fixed<const N: usize>(values: Vec<f64>, cell: &str) -> Result<[f64; N]> {
    let len = values.len();
    values
        .try_into()
        .map_err(|_| invalid(cell, format!("expected {} values, got {}", N, len)))
}

/// Base64 (standard alphabet) for binary payloads in JSON
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => super::serialize(bytes, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(encoded) => STANDARD
                    .decode(encoded)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
