use std::fmt;
use std::sync::Arc;

use crate::error::corrupt_dump;
use crate::reader::{BasicType, Cursor};
use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
    Boolean(bool),
    Char(u16),
    Float(f32),
    Double(f64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

impl Primitive {
    pub fn read(cursor: &mut Cursor, ty: BasicType) -> Result<Primitive> {
        Ok(match ty {
            BasicType::Boolean => Primitive::Boolean(cursor.read_u8()? != 0),
            BasicType::Char => Primitive::Char(cursor.read_u16()?),
            BasicType::Float => Primitive::Float(f32::from_bits(cursor.read_u32()?)),
            BasicType::Double => Primitive::Double(f64::from_bits(cursor.read_u64()?)),
            BasicType::Byte => Primitive::Byte(cursor.read_u8()? as i8),
            BasicType::Short => Primitive::Short(cursor.read_u16()? as i16),
            BasicType::Int => Primitive::Int(cursor.read_u32()? as i32),
            BasicType::Long => Primitive::Long(cursor.read_u64()? as i64),
            BasicType::Object => {
                return Err(corrupt_dump!(cursor.pos(), "expected a primitive value"))
            }
        })
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Primitive::Boolean(b) => b as u8 as f64,
            Primitive::Char(c) => c as f64,
            Primitive::Float(f) => f as f64,
            Primitive::Double(d) => d,
            Primitive::Byte(b) => b as f64,
            Primitive::Short(s) => s as f64,
            Primitive::Int(i) => i as f64,
            Primitive::Long(l) => l as f64,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Primitive::Byte(b) => Some(b as i64),
            Primitive::Short(s) => Some(s as i64),
            Primitive::Int(i) => Some(i as i64),
            Primitive::Long(l) => Some(l),
            Primitive::Char(c) => Some(c as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Boolean(b) => write!(f, "{}", b),
            Primitive::Char(c) => write!(
                f,
                "{}",
                char::from_u32(*c as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
            ),
            Primitive::Float(v) => write!(f, "{}", v),
            Primitive::Double(v) => write!(f, "{}", v),
            Primitive::Byte(v) => write!(f, "{}", v),
            Primitive::Short(v) => write!(f, "{}", v),
            Primitive::Int(v) => write!(f, "{}", v),
            Primitive::Long(v) => write!(f, "{}", v),
        }
    }
}

/// A decoded field, static, or object array slot. Object ids of 0 are null.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Primitive { name: Arc<str>, value: Primitive },
    Object { name: Arc<str>, id: u64 },
    Element { index: u32, id: u64 },
}

impl FieldValue {
    pub(crate) fn read(cursor: &mut Cursor, name: &Arc<str>, ty: BasicType) -> Result<FieldValue> {
        Ok(match ty {
            BasicType::Object => FieldValue::Object {
                name: name.clone(),
                id: cursor.read_id()?,
            },
            _ => FieldValue::Primitive {
                name: name.clone(),
                value: Primitive::read(cursor, ty)?,
            },
        })
    }

    /// Field name, or `[index]` for array slots.
    pub fn name(&self) -> std::borrow::Cow<'_, str> {
        match self {
            FieldValue::Primitive { name, .. } | FieldValue::Object { name, .. } => {
                std::borrow::Cow::Borrowed(&**name)
            }
            FieldValue::Element { index, .. } => std::borrow::Cow::Owned(format!("[{}]", index)),
        }
    }

    /// Referenced object id, if this is a non-null reference.
    pub fn object_id(&self) -> Option<u64> {
        match self {
            FieldValue::Object { id, .. } | FieldValue::Element { id, .. } if *id != 0 => Some(*id),
            _ => None,
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            FieldValue::Primitive { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Declared instance field of a class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: Arc<str>,
    pub ty: BasicType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveArray {
    pub ty: BasicType,
    pub values: Vec<Primitive>,
}
