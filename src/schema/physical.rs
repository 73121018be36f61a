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

//! Scalar trees <-> Arrow arrays

use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Float64Type, Int32Type, Int64Type};
use arrow_array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    ListArray, StringArray, StructArray,
};
use arrow_buffer::{NullBuffer, OffsetBuffer};
use arrow_schema::DataType;
use std::sync::Arc;

use crate::cells::Scalar;
use crate::core::{PixanoError, Result};

fn mismatch(data_type: &DataType, scalar: &Scalar) -> PixanoError {
    PixanoError::SchemaMismatch(format!("{:?} cannot hold {:?}", data_type, scalar))
}

fn nulls(validity: Vec<bool>) -> Option<NullBuffer> {
    if validity.iter().all(|&v| v) {
        None
    } else {
        Some(NullBuffer::from(validity))
    }
}

macro_rules! primitive {
    ($values:expr, $data_type:expr, $array:ty, $variant:ident) => {{
        let items = $values
            .iter()
            .map(|v| match v {
                Scalar::$variant(x) => Ok(Some(x.clone())),
                Scalar::Null => Ok(None),
                other => Err(mismatch($data_type, other)),
            })
            .collect::<Result<Vec<_>>>()?;
        Arc::new(<$array>::from(items)) as ArrayRef
    }};
}

/// Build one column of `data_type` from physical scalars
pub fn build_array(data_type: &DataType, values: &[Scalar]) -> Result<ArrayRef> {
    let array = match data_type {
        DataType::Boolean => primitive!(values, data_type, BooleanArray, Bool),
        DataType::Int32 => primitive!(values, data_type, Int32Array, Int32),
        DataType::Int64 => primitive!(values, data_type, Int64Array, Int64),
        DataType::Float32 => primitive!(values, data_type, Float32Array, Float32),
        DataType::Float64 => primitive!(values, data_type, Float64Array, Float64),
        DataType::Utf8 => primitive!(values, data_type, StringArray, Utf8),
        DataType::Binary => {
            let items = values
                .iter()
                .map(|v| match v {
                    Scalar::Binary(bytes) => Ok(Some(bytes.as_slice())),
                    Scalar::Null => Ok(None),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            Arc::new(BinaryArray::from(items)) as ArrayRef
        }
        DataType::List(item_field) => {
            let mut children = Vec::new();
            let mut lengths = Vec::with_capacity(values.len());
            let mut validity = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Scalar::List(items) => {
                        children.extend(items.iter().cloned());
                        lengths.push(items.len());
                        validity.push(true);
                    }
                    Scalar::Null => {
                        lengths.push(0);
                        validity.push(false);
                    }
                    other => return Err(mismatch(data_type, other)),
                }
            }
            let child = build_array(item_field.data_type(), &children)?;
            Arc::new(ListArray::try_new(
                item_field.clone(),
                OffsetBuffer::<i32>::from_lengths(lengths),
                child,
                nulls(validity),
            )?) as ArrayRef
        }
        DataType::Struct(fields) => {
            let mut columns: Vec<Vec<Scalar>> = vec![Vec::with_capacity(values.len()); fields.len()];
            let mut validity = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Scalar::Struct(children) if children.len() == fields.len() => {
                        for (column, child) in columns.iter_mut().zip(children) {
                            column.push(child.clone());
                        }
                        validity.push(true);
                    }
                    Scalar::Null => {
                        for column in columns.iter_mut() {
                            column.push(Scalar::Null);
                        }
                        validity.push(false);
                    }
                    other => return Err(mismatch(data_type, other)),
                }
            }
            let arrays = fields
                .iter()
                .zip(columns.iter())
                .map(|(field, column)| build_array(field.data_type(), column))
                .collect::<Result<Vec<_>>>()?;
            Arc::new(StructArray::try_new(fields.clone(), arrays, nulls(validity))?) as ArrayRef
        }
        other => {
            return Err(PixanoError::SchemaMismatch(format!(
                "unsupported column type {:?}",
                other
            )))
        }
    };
    Ok(array)
}

/// Read slot `index` of an array back into a scalar tree
pub fn read_scalar(array: &dyn Array, index: usize) -> Result<Scalar> {
    if array.is_null(index) {
        return Ok(Scalar::Null);
    }
    let scalar = match array.data_type() {
        DataType::Boolean => Scalar::Bool(array.as_boolean().value(index)),
        DataType::Int32 => Scalar::Int32(array.as_primitive::<Int32Type>().value(index)),
        DataType::Int64 => Scalar::Int64(array.as_primitive::<Int64Type>().value(index)),
        DataType::Float32 => Scalar::Float32(array.as_primitive::<Float32Type>().value(index)),
        DataType::Float64 => Scalar::Float64(array.as_primitive::<Float64Type>().value(index)),
        DataType::Utf8 => Scalar::Utf8(array.as_string::<i32>().value(index).to_string()),
        DataType::Binary => Scalar::Binary(array.as_binary::<i32>().value(index).to_vec()),
        DataType::List(_) => {
            let items = array.as_list::<i32>().value(index);
            Scalar::List(
                (0..items.len())
                    .map(|i| read_scalar(items.as_ref(), i))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        DataType::Struct(_) => Scalar::Struct(
            array
                .as_struct()
                .columns()
                .iter()
                .map(|column| read_scalar(column.as_ref(), index))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => {
            return Err(PixanoError::SchemaMismatch(format!(
                "unsupported column type {:?}",
                other
            )))
        }
    };
    Ok(scalar)
}
