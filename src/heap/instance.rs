use std::fmt;
use std::hash::{Hash, Hasher};

use super::class::ClassIndex;
use crate::reader::BasicType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Instance,
    ObjectArray,
    PrimitiveArray(BasicType),
    /// A class object. Its owning class is the class it describes.
    Class,
}

/// Handle to one object of the heap. Cheap to copy; equality is id equality.
#[derive(Clone, Copy, Debug)]
pub struct Instance {
    pub(crate) index: u32,
    pub(crate) id: u64,
    pub(crate) class: ClassIndex,
    pub(crate) kind: ObjectKind,
    pub(crate) size: u64,
    pub(crate) number: u32,
    pub(crate) offset: u64,
    pub(crate) length: u32,
}

impl Instance {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> ClassIndex {
        self.class
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn shallow_size(&self) -> u64 {
        self.size
    }

    /// 1-based ordinal among the instances of its class, 0 for class objects.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Byte offset of the object's record in the dump.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Element count for arrays.
    pub fn array_length(&self) -> Option<u32> {
        match self.kind {
            ObjectKind::ObjectArray | ObjectKind::PrimitiveArray(_) => Some(self.length),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        self.array_length().is_some()
    }

    pub fn is_class(&self) -> bool {
        self.kind == ObjectKind::Class
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.id)
    }
}
