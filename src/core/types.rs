// Copyright 2025 Relcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core type definitions: DataType and object identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Catalog object identifier (operators, functions, types, indexes)
pub type Oid = u32;

/// Identifier of a base relation inside a query
pub type RelId = u32;

/// Column position inside a relation (1-based; negative for system columns)
pub type AttrNumber = i16;

/// Marker for "no object"
pub const INVALID_OID: Oid = 0;

/// Attribute number of the tuple identifier system column
pub const CTID_ATTNO: AttrNumber = -1;

// Type identifiers known to the catalog
pub const BOOL_TYPE_OID: Oid = 16;
pub const INT8_TYPE_OID: Oid = 20;
pub const TEXT_TYPE_OID: Oid = 25;
pub const TID_TYPE_OID: Oid = 27;
pub const FLOAT8_TYPE_OID: Oid = 701;
pub const TIMESTAMP_TYPE_OID: Oid = 1114;
pub const ANYARRAY_TYPE_OID: Oid = 2277;
pub const UNKNOWN_TYPE_OID: Oid = 705;

/// SQL data types understood by the expression model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// NULL data type, used for unknown/unspecified types
    #[default]
    Null = 0,

    /// 64-bit signed integer
    Integer = 1,

    /// 64-bit floating point number
    Float = 2,

    /// UTF-8 text string
    Text = 3,

    /// Boolean true/false
    Boolean = 4,

    /// Timestamp (stored as UTC)
    Timestamp = 5,

    /// One-dimensional array of values
    Array = 6,

    /// Tuple identifier (block, offset) encoded as an integer
    Tid = 7,
}

impl DataType {
    /// Returns true if this type is numeric (INTEGER or FLOAT)
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Returns true if this type can be compared for ordering
    pub fn is_orderable(&self) -> bool {
        !matches!(self, DataType::Array)
    }

    /// Fixed storage length in bytes, or -1 for variable-length types
    pub fn typlen(&self) -> i16 {
        match self {
            DataType::Null => 0,
            DataType::Integer | DataType::Float | DataType::Timestamp | DataType::Tid => 8,
            DataType::Boolean => 1,
            DataType::Text | DataType::Array => -1,
        }
    }

    /// Whether values of this type are passed by value
    pub fn is_by_value(&self) -> bool {
        self.typlen() > 0
    }

    /// Returns the type ID as u8 for serialization
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Create DataType from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DataType::Null),
            1 => Some(DataType::Integer),
            2 => Some(DataType::Float),
            3 => Some(DataType::Text),
            4 => Some(DataType::Boolean),
            5 => Some(DataType::Timestamp),
            6 => Some(DataType::Array),
            7 => Some(DataType::Tid),
            _ => None,
        }
    }

    /// Catalog type identifier for this type
    pub fn type_oid(&self) -> Oid {
        match self {
            DataType::Null => UNKNOWN_TYPE_OID,
            DataType::Integer => INT8_TYPE_OID,
            DataType::Float => FLOAT8_TYPE_OID,
            DataType::Text => TEXT_TYPE_OID,
            DataType::Boolean => BOOL_TYPE_OID,
            DataType::Timestamp => TIMESTAMP_TYPE_OID,
            DataType::Array => ANYARRAY_TYPE_OID,
            DataType::Tid => TID_TYPE_OID,
        }
    }

    /// Inverse of [`DataType::type_oid`]
    pub fn from_type_oid(oid: Oid) -> Option<Self> {
        match oid {
            UNKNOWN_TYPE_OID => Some(DataType::Null),
            INT8_TYPE_OID => Some(DataType::Integer),
            FLOAT8_TYPE_OID => Some(DataType::Float),
            TEXT_TYPE_OID => Some(DataType::Text),
            BOOL_TYPE_OID => Some(DataType::Boolean),
            TIMESTAMP_TYPE_OID => Some(DataType::Timestamp),
            ANYARRAY_TYPE_OID => Some(DataType::Array),
            TID_TYPE_OID => Some(DataType::Tid),
            _ => None,
        }
    }

    /// Binary-coercible types can share a transition state without conversion
    pub fn is_binary_coercible_to(&self, target: DataType) -> bool {
        *self == target
            || *self == DataType::Null
            || matches!(
                (self, target),
                (DataType::Integer, DataType::Tid) | (DataType::Tid, DataType::Integer)
            )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Array => write!(f, "ARRAY"),
            DataType::Tid => write!(f, "TID"),
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NULL" => Ok(DataType::Null),
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "INT4" | "INT8" => Ok(DataType::Integer),
            "FLOAT" | "DOUBLE" | "REAL" | "FLOAT8" | "NUMERIC" => Ok(DataType::Float),
            "TEXT" | "VARCHAR" | "CHAR" => Ok(DataType::Text),
            "BOOLEAN" | "BOOL" => Ok(DataType::Boolean),
            "TIMESTAMP" | "TIMESTAMPTZ" => Ok(DataType::Timestamp),
            "ARRAY" => Ok(DataType::Array),
            "TID" => Ok(DataType::Tid),
            _ => Err(Error::type_error(format!("unknown type name '{}'", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typlen_and_byval() {
        assert_eq!(DataType::Integer.typlen(), 8);
        assert!(DataType::Integer.is_by_value());
        assert_eq!(DataType::Text.typlen(), -1);
        assert!(!DataType::Text.is_by_value());
    }

    #[test]
    fn test_roundtrip_u8() {
        for v in 0..8u8 {
            let dt = DataType::from_u8(v).unwrap();
            assert_eq!(dt.as_u8(), v);
        }
        assert!(DataType::from_u8(99).is_none());
    }

    #[test]
    fn test_type_oid_mapping() {
        for v in 0..8u8 {
            let dt = DataType::from_u8(v).unwrap();
            assert_eq!(DataType::from_type_oid(dt.type_oid()), Some(dt));
        }
        assert_eq!(DataType::from_type_oid(12345), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("int8".parse::<DataType>().unwrap(), DataType::Integer);
        assert_eq!("Float8".parse::<DataType>().unwrap(), DataType::Float);
        assert!("geometry".parse::<DataType>().is_err());
    }
}
