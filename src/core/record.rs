//! Records, values and fixed-width schemas
//!
//! This module defines the data that flows between operators: typed values,
//! records (ordered value sequences), and schemas that give every record a
//! fixed encoded byte width so it can live in a page slot.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::operator::{ExecError, ExecResult};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "width", rename_all = "snake_case")]
pub enum DataType {
    /// 4-byte signed integer
    Int,
    /// 4-byte IEEE-754 float
    Float,
    /// 1-byte boolean
    Bool,
    /// Fixed-width UTF-8 string, zero padded to the given byte width
    String(usize),
}

impl DataType {
    /// Encoded width in bytes
    pub fn size(&self) -> usize {
        match self {
            DataType::Int | DataType::Float => 4,
            DataType::Bool => 1,
            DataType::String(width) => *width,
        }
    }

    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::String(_) => "string",
        }
    }

    fn ordinal(&self) -> u32 {
        match self {
            DataType::Bool => 0,
            DataType::Int => 1,
            DataType::Float => 2,
            DataType::String(_) => 3,
        }
    }

    fn from_ordinal(ordinal: u32, width: usize) -> ExecResult<Self> {
        match ordinal {
            0 => Ok(DataType::Bool),
            1 => Ok(DataType::Int),
            2 => Ok(DataType::Float),
            3 => Ok(DataType::String(width)),
            other => Err(ExecError::Storage(format!("unknown type ordinal {}", other))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String(width) => write!(f, "string({})", width),
            other => write!(f, "{}", other.type_name()),
        }
    }
}

/// A single typed value
///
/// Values of the same type are totally ordered (floats use IEEE total
/// ordering). Comparing values of different types through [`Value::compare`]
/// is a type error; no coercion is ever attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
}

impl Value {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
        }
    }

    /// Whether this value can be stored in a column of the given type
    pub fn conforms_to(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Int(_), DataType::Int)
            | (Value::Float(_), DataType::Float)
            | (Value::Bool(_), DataType::Bool) => true,
            (Value::String(s), DataType::String(width)) => s.len() <= *width,
            _ => false,
        }
    }

    /// Compare two values of the same type.
    ///
    /// # Errors
    /// Returns [`ExecError::TypeMismatch`] when the operands differ in type.
    pub fn compare(&self, other: &Value) -> ExecResult<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(ExecError::TypeMismatch {
                left: self.type_name(),
                right: other.type_name(),
            }),
        }
    }

    /// Equality through the fallible comparison primitive
    pub fn key_eq(&self, other: &Value) -> ExecResult<bool> {
        Ok(self.compare(other)? == Ordering::Equal)
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::String(_) => 3,
        }
    }

    /// Canonical big-endian bytes, without padding
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Value::Int(v) => v.to_be_bytes().to_vec(),
            Value::Float(v) => v.to_be_bytes().to_vec(),
            Value::Bool(v) => vec![u8::from(*v)],
            Value::String(s) => s.as_bytes().to_vec(),
        }
    }

    fn encode_into(&self, data_type: &DataType, out: &mut Vec<u8>) {
        let mut bytes = self.canonical_bytes();
        bytes.resize(data_type.size(), 0);
        out.extend_from_slice(&bytes);
    }

    fn decode(data_type: &DataType, bytes: &[u8]) -> ExecResult<Value> {
        let fixed4 = |bytes: &[u8]| -> ExecResult<[u8; 4]> {
            bytes
                .try_into()
                .map_err(|_| ExecError::Schema(format!("expected 4 bytes, found {}", bytes.len())))
        };
        match data_type {
            DataType::Int => Ok(Value::Int(i32::from_be_bytes(fixed4(bytes)?))),
            DataType::Float => Ok(Value::Float(f32::from_be_bytes(fixed4(bytes)?))),
            DataType::Bool => match bytes {
                [b] => Ok(Value::Bool(*b != 0)),
                _ => Err(ExecError::Schema("expected 1 byte for bool".into())),
            },
            DataType::String(_) => {
                let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                let s = std::str::from_utf8(&bytes[..end])
                    .map_err(|e| ExecError::Schema(format!("invalid utf-8 in string column: {}", e)))?;
                Ok(Value::String(s.to_string()))
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Total order used by indexes and the sort phase: values of one type
    /// compare naturally, differing types order by type rank.
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|_| self.rank().cmp(&other.rank()))
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Bool(v) => v.hash(state),
            Value::String(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Float)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Bool)
    }

    pub fn string(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, DataType::String(width))
    }
}

/// Ordered list of fields with a fixed encoded width
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Encoded size in bytes of one record
    pub fn entry_size(&self) -> usize {
        self.fields.iter().map(|f| f.data_type.size()).sum()
    }

    pub fn data_type(&self, index: usize) -> Option<DataType> {
        self.fields.get(index).map(|f| f.data_type)
    }

    /// Resolve a column name to its position.
    ///
    /// Accepts the exact field name, or a qualified `relation.column` name
    /// whose unqualified part matches a field.
    pub fn column_index(&self, name: &str) -> ExecResult<usize> {
        if let Some(idx) = self.fields.iter().position(|f| f.name == name) {
            return Ok(idx);
        }
        let unqualified = name.rsplit('.').next().unwrap_or(name);
        self.fields
            .iter()
            .position(|f| f.name == unqualified || f.name.rsplit('.').next() == Some(unqualified))
            .ok_or_else(|| {
                ExecError::Configuration(format!(
                    "column '{}' not found in schema ({})",
                    name,
                    self.field_names().join(", ")
                ))
            })
    }

    /// Schema of the concatenation `self ++ other`
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema { fields }
    }

    /// Check that a list of values conforms to this schema.
    pub fn verify(&self, values: Vec<Value>) -> ExecResult<Record> {
        if values.len() != self.fields.len() {
            return Err(ExecError::Schema(format!(
                "expected {} values, found {}",
                self.fields.len(),
                values.len()
            )));
        }
        for (value, field) in values.iter().zip(&self.fields) {
            if !value.conforms_to(&field.data_type) {
                return Err(ExecError::Schema(format!(
                    "value {} does not fit column '{}' of type {}",
                    value, field.name, field.data_type
                )));
            }
        }
        Ok(Record::new(values))
    }

    /// Serialize a conforming record into exactly [`Schema::entry_size`] bytes.
    pub fn encode(&self, record: &Record) -> ExecResult<Vec<u8>> {
        if record.len() != self.fields.len() {
            return Err(ExecError::Schema(format!(
                "expected {} values, found {}",
                self.fields.len(),
                record.len()
            )));
        }
        let mut out = Vec::with_capacity(self.entry_size());
        for (value, field) in record.values().iter().zip(&self.fields) {
            if !value.conforms_to(&field.data_type) {
                return Err(ExecError::Schema(format!(
                    "value {} does not fit column '{}' of type {}",
                    value, field.name, field.data_type
                )));
            }
            value.encode_into(&field.data_type, &mut out);
        }
        Ok(out)
    }

    /// Decode one slot's bytes back into a record.
    pub fn decode(&self, bytes: &[u8]) -> ExecResult<Record> {
        if bytes.len() < self.entry_size() {
            return Err(ExecError::Schema(format!(
                "record needs {} bytes, slot holds {}",
                self.entry_size(),
                bytes.len()
            )));
        }
        let mut values = Vec::with_capacity(self.fields.len());
        let mut offset = 0;
        for field in &self.fields {
            let size = field.data_type.size();
            values.push(Value::decode(&field.data_type, &bytes[offset..offset + size])?);
            offset += size;
        }
        Ok(Record::new(values))
    }

    /// Compact binary form stored on a relation's metadata page:
    /// field count, then per field the name length, name bytes, type
    /// ordinal and (strings only) width, all integers 4-byte big-endian.
    pub fn to_metadata_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.fields.len() as u32).to_be_bytes());
        for field in &self.fields {
            out.extend_from_slice(&(field.name.len() as u32).to_be_bytes());
            out.extend_from_slice(field.name.as_bytes());
            out.extend_from_slice(&field.data_type.ordinal().to_be_bytes());
            if let DataType::String(width) = field.data_type {
                out.extend_from_slice(&(width as u32).to_be_bytes());
            }
        }
        out
    }

    /// Inverse of [`Schema::to_metadata_bytes`]
    pub fn from_metadata_bytes(bytes: &[u8]) -> ExecResult<Schema> {
        let mut cursor = 0usize;
        let read_u32 = |cursor: &mut usize| -> ExecResult<u32> {
            let end = *cursor + 4;
            let slice = bytes
                .get(*cursor..end)
                .ok_or_else(|| ExecError::Storage("truncated metadata page".into()))?;
            *cursor = end;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(slice);
            Ok(u32::from_be_bytes(buf))
        };

        let count = read_u32(&mut cursor)? as usize;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let name_len = read_u32(&mut cursor)? as usize;
            let name_bytes = bytes
                .get(cursor..cursor + name_len)
                .ok_or_else(|| ExecError::Storage("truncated field name".into()))?;
            let name = std::str::from_utf8(name_bytes)
                .map_err(|e| ExecError::Storage(format!("invalid field name: {}", e)))?
                .to_string();
            cursor += name_len;
            let ordinal = read_u32(&mut cursor)?;
            let width = if ordinal == 3 { read_u32(&mut cursor)? as usize } else { 0 };
            fields.push(Field::new(name, DataType::from_ordinal(ordinal, width)?));
        }
        Ok(Schema::new(fields))
    }
}

/// An ordered, fixed-arity sequence of values
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Left values followed by right values
    pub fn concat(&self, right: &Record) -> Record {
        let mut values = Vec::with_capacity(self.values.len() + right.values.len());
        values.extend(self.values.iter().cloned());
        values.extend(right.values.iter().cloned());
        Record { values }
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Record::new(values)
    }
}

/// Locator of a stored record: data page number and slot within the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub page_no: usize,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_no: usize, slot: usize) -> Self {
        Self { page_no, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot)
    }
}
