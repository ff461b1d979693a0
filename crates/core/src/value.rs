//! Typed column values and their wire encoding
//!
//! ```text
//! [type tag: u8][null flag: u8][payload]
//! ```
//!
//! Fixed-width payloads are little-endian. Varchar and Varbinary carry a
//! `u32` length followed by the bytes. A NULL has no payload but keeps its
//! type tag, so a decoder can still check it against the column.

use crate::error::{Error, Result};
use crate::serialize::{SerializeInput, SerializeOutput};
use std::cmp::Ordering;
use std::fmt;

/// Column / value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// true / false
    Boolean = 1,
    /// 8-bit signed integer
    TinyInt = 2,
    /// 16-bit signed integer
    SmallInt = 3,
    /// 32-bit signed integer
    Integer = 4,
    /// 64-bit signed integer
    BigInt = 5,
    /// 64-bit float
    Decimal = 6,
    /// Microseconds since the Unix epoch
    Timestamp = 7,
    /// Variable-length UTF-8 string
    Varchar = 8,
    /// Variable-length byte string
    Varbinary = 9,
}

impl TypeId {
    /// Decode a wire tag
    pub fn from_tag(tag: u8) -> Result<TypeId> {
        Ok(match tag {
            1 => TypeId::Boolean,
            2 => TypeId::TinyInt,
            3 => TypeId::SmallInt,
            4 => TypeId::Integer,
            5 => TypeId::BigInt,
            6 => TypeId::Decimal,
            7 => TypeId::Timestamp,
            8 => TypeId::Varchar,
            9 => TypeId::Varbinary,
            other => return Err(Error::format(format!("unknown type tag {}", other))),
        })
    }

    /// Wire tag
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Fixed storage size in bytes, `None` for variable-length types
    pub fn fixed_size(self) -> Option<u32> {
        match self {
            TypeId::Boolean | TypeId::TinyInt => Some(1),
            TypeId::SmallInt => Some(2),
            TypeId::Integer => Some(4),
            TypeId::BigInt | TypeId::Decimal | TypeId::Timestamp => Some(8),
            TypeId::Varchar | TypeId::Varbinary => None,
        }
    }

    /// True for the variable-length types
    pub fn is_variable_length(self) -> bool {
        self.fixed_size().is_none()
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeId::TinyInt | TypeId::SmallInt | TypeId::Integer | TypeId::BigInt | TypeId::Decimal
        )
    }
}

/// One column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL of the given type
    Null(TypeId),
    /// Boolean
    Boolean(bool),
    /// TinyInt
    TinyInt(i8),
    /// SmallInt
    SmallInt(i16),
    /// Integer
    Integer(i32),
    /// BigInt
    BigInt(i64),
    /// Decimal
    Decimal(f64),
    /// Timestamp (microseconds)
    Timestamp(u64),
    /// Varchar
    Varchar(String),
    /// Varbinary
    Varbinary(Vec<u8>),
}

impl Value {
    /// Type of this value (NULLs keep their declared type)
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Null(t) => *t,
            Value::Boolean(_) => TypeId::Boolean,
            Value::TinyInt(_) => TypeId::TinyInt,
            Value::SmallInt(_) => TypeId::SmallInt,
            Value::Integer(_) => TypeId::Integer,
            Value::BigInt(_) => TypeId::BigInt,
            Value::Decimal(_) => TypeId::Decimal,
            Value::Timestamp(_) => TypeId::Timestamp,
            Value::Varchar(_) => TypeId::Varchar,
            Value::Varbinary(_) => TypeId::Varbinary,
        }
    }

    /// True for NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Payload length in bytes for variable-length values
    pub fn var_len(&self) -> Option<usize> {
        match self {
            Value::Varchar(s) => Some(s.len()),
            Value::Varbinary(b) => Some(b.len()),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::TinyInt(v) => Some(*v as f64),
            Value::SmallInt(v) => Some(*v as f64),
            Value::Integer(v) => Some(*v as f64),
            Value::BigInt(v) => Some(*v as f64),
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    /// SQL-style comparison. NULLs and incompatible types compare as `None`.
    /// Numeric types compare across widths.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null(_), _) | (_, Value::Null(_)) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            (Value::Varbinary(a), Value::Varbinary(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            (a, b) if a.type_id().is_numeric() && b.type_id().is_numeric() => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            _ => None,
        }
    }

    /// Append the wire encoding of this value
    pub fn serialize_to(&self, out: &mut SerializeOutput) {
        out.write_byte(self.type_id().tag());
        out.write_bool(self.is_null());
        match self {
            Value::Null(_) => {}
            Value::Boolean(v) => out.write_bool(*v),
            Value::TinyInt(v) => out.write_tiny(*v),
            Value::SmallInt(v) => out.write_short(*v),
            Value::Integer(v) => out.write_int(*v),
            Value::BigInt(v) => out.write_long(*v),
            Value::Decimal(v) => out.write_double(*v),
            Value::Timestamp(v) => out.write_u64(*v),
            Value::Varchar(v) => out.write_string(v),
            Value::Varbinary(v) => out.write_bytes(v),
        }
    }

    /// Decode one value that must be of type `expected`
    pub fn deserialize_from(input: &mut SerializeInput<'_>, expected: TypeId) -> Result<Value> {
        let actual = TypeId::from_tag(input.read_byte()?)?;
        if actual != expected {
            return Err(Error::TypeMismatch { expected, actual });
        }
        if input.read_bool()? {
            return Ok(Value::Null(actual));
        }
        Ok(match actual {
            TypeId::Boolean => Value::Boolean(input.read_bool()?),
            TypeId::TinyInt => Value::TinyInt(input.read_tiny()?),
            TypeId::SmallInt => Value::SmallInt(input.read_short()?),
            TypeId::Integer => Value::Integer(input.read_int()?),
            TypeId::BigInt => Value::BigInt(input.read_long()?),
            TypeId::Decimal => Value::Decimal(input.read_double()?),
            TypeId::Timestamp => Value::Timestamp(input.read_u64()?),
            TypeId::Varchar => Value::Varchar(input.read_string()?),
            TypeId::Varbinary => Value::Varbinary(input.read_bytes()?),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Varchar(v) => write!(f, "'{}'", v),
            Value::Varbinary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode(bytes: &[u8], expected: TypeId) -> Result<Value> {
        Value::deserialize_from(&mut SerializeInput::new(bytes), expected)
    }

    #[test]
    fn test_null_keeps_type() {
        let mut out = SerializeOutput::new();
        Value::Null(TypeId::Varchar).serialize_to(&mut out);
        assert_eq!(out.data(), &[TypeId::Varchar.tag(), 1]);
        assert_eq!(
            decode(out.data(), TypeId::Varchar).unwrap(),
            Value::Null(TypeId::Varchar)
        );
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut out = SerializeOutput::new();
        Value::Integer(3).serialize_to(&mut out);
        let err = decode(out.data(), TypeId::BigInt).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: TypeId::BigInt,
                actual: TypeId::Integer
            }
        ));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert!(decode(&[42, 0], TypeId::Integer).unwrap_err().is_format());
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let mut out = SerializeOutput::new();
        Value::BigInt(1 << 40).serialize_to(&mut out);
        let bytes = &out.data()[..out.size() - 3];
        assert!(decode(bytes, TypeId::BigInt).unwrap_err().is_format());
    }

    #[test]
    fn test_compare_across_numeric_widths() {
        assert_eq!(
            Value::TinyInt(3).compare(&Value::BigInt(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Integer(2).compare(&Value::Decimal(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Integer(2).compare(&Value::Varchar("2".into())), None);
        assert_eq!(Value::Null(TypeId::Integer).compare(&Value::Integer(1)), None);
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Boolean),
            any::<i8>().prop_map(Value::TinyInt),
            any::<i16>().prop_map(Value::SmallInt),
            any::<i32>().prop_map(Value::Integer),
            any::<i64>().prop_map(Value::BigInt),
            (-1.0e12f64..1.0e12).prop_map(Value::Decimal),
            any::<u64>().prop_map(Value::Timestamp),
            ".{0,24}".prop_map(Value::Varchar),
            proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Varbinary),
        ]
    }

    proptest! {
        #[test]
        fn prop_value_survives_the_wire(value in arb_value()) {
            let mut out = SerializeOutput::new();
            value.serialize_to(&mut out);
            let mut input = SerializeInput::new(out.data());
            let decoded = Value::deserialize_from(&mut input, value.type_id()).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert!(input.is_exhausted());
        }
    }
}
