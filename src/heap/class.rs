use std::fmt;

use super::field::{FieldDecl, FieldValue};
use crate::reader::BasicType;

/// Dense index of a class in build order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassIndex(pub(crate) u32);

impl ClassIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

pub struct ClassMetadata {
    pub(crate) index: ClassIndex,
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) superclass: Option<u64>,
    pub(crate) loader: u64,
    pub(crate) instance_size: u32,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) statics: Vec<FieldValue>,
    pub(crate) subclasses: Vec<ClassIndex>,
    pub(crate) instances: Vec<u32>,
    pub(crate) instances_size: u64,
    /// Dense object index of the class object, absent for synthesized classes.
    pub(crate) object: Option<u32>,
    pub(crate) element_type: Option<BasicType>,
}

impl ClassMetadata {
    pub fn index(&self) -> ClassIndex {
        self.index
    }

    /// Id of the class object; 0 for primitive array classes the dump did not contain.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass_id(&self) -> Option<u64> {
        self.superclass
    }

    pub fn loader_id(&self) -> u64 {
        self.loader
    }

    /// Instance size recorded in the class dump.
    pub fn instance_size(&self) -> u32 {
        self.instance_size
    }

    /// Fields declared by this class only, in dump order.
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn statics(&self) -> &[FieldValue] {
        &self.statics
    }

    pub fn static_value(&self, name: &str) -> Option<&FieldValue> {
        self.statics.iter().find(|s| s.name() == name)
    }

    pub fn subclasses(&self) -> &[ClassIndex] {
        &self.subclasses
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Sum of the shallow sizes of all instances.
    pub fn instances_size(&self) -> u64 {
        self.instances_size
    }

    pub fn is_array(&self) -> bool {
        self.name.ends_with("[]")
    }

    /// Element type of primitive array classes.
    pub fn element_type(&self) -> Option<BasicType> {
        self.element_type
    }
}

impl fmt::Debug for ClassMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("id", &format_args!("{:#x}", self.id))
            .field("name", &self.name)
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl fmt::Display for ClassMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Converts a JVM internal class name or descriptor into the dotted form
/// used everywhere else: `java/lang/String` -> `java.lang.String`,
/// `[I` -> `int[]`, `[[Ljava/lang/Object;` -> `java.lang.Object[][]`.
/// Also accepts the shorthand `[java.lang.String`.
pub fn java_class_name(internal: &str) -> String {
    let dims = internal.bytes().take_while(|b| *b == b'[').count();
    if dims == 0 {
        return internal.replace('/', ".");
    }
    let element = &internal[dims..];
    let mut chars = element.chars();
    let base = match (chars.next(), chars.next()) {
        (Some(c), None) => match BasicType::from_descriptor(c) {
            Some(ty) => ty.name().to_string(),
            None => element.to_string(),
        },
        _ => match element.strip_prefix('L').and_then(|e| e.strip_suffix(';')) {
            Some(name) => name.replace('/', "."),
            None => element.replace('/', "."),
        },
    };
    format!("{}{}", base, "[]".repeat(dims))
}
