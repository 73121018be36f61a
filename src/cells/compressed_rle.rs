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

use arrow_schema::DataType;

use super::{field, invalid, list_of, struct_of, Cell, Scalar};
use crate::codec::{rle_to_urle, CompressedRle};
use crate::core::Result;

impl Cell for CompressedRle {
    fn to_struct() -> DataType {
        struct_of(vec![
            field("size", list_of(DataType::Int32)),
            field("counts", DataType::Binary),
        ])
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Struct(vec![
            Scalar::List(self.size.iter().map(|&d| Scalar::Int32(d as i32)).collect()),
            Scalar::Binary(self.counts.clone()),
        ])
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self> {
        let children = scalar.struct_children("compressedrle", 2)?;
        let size = children[0].to_i64_list()?;
        if size.len() != 2 || size.iter().any(|&d| d < 0) {
            return Err(invalid("compressedrle", format!("bad size {:?}", size)));
        }
        Ok(Self {
            size: [size[0] as u32, size[1] as u32],
            counts: children[1].to_bytes()?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.counts.is_empty() {
            return Ok(());
        }
        let runs = rle_to_urle(self)?.counts;
        let total: u64 = runs.iter().map(|&r| r as u64).sum();
        let expected = self.height() as u64 * self.width() as u64;
        if total != expected {
            return Err(invalid(
                "compressedrle",
                format!("runs cover {} pixels, size {:?} needs {}", total, self.size, expected),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_run_total() {
        let good = CompressedRle {
            size: [10, 10],
            counts: b"]12810Oh0".to_vec(),
        };
        good.validate().unwrap();
        assert_eq!(CompressedRle::from_scalar(&good.to_scalar()).unwrap(), good);

        let wrong_size = CompressedRle {
            size: [10, 11],
            ..good
        };
        assert!(wrong_size.validate().is_err());

        CompressedRle::empty(5, 5).validate().unwrap();
    }
}
