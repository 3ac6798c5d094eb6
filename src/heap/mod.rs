//! Random-access indexes over one heap dump.

mod builder;
mod class;
mod field;
mod gc_root;
mod instance;
mod options;
mod sizes;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use regex::Regex;
use smallvec::SmallVec;

pub use class::{java_class_name, ClassIndex, ClassMetadata};
pub use field::{FieldDecl, FieldValue, Primitive, PrimitiveArray};
pub use gc_root::{GcRoot, GcRootKind};
pub use instance::{Instance, ObjectKind};
pub use options::HeapOptions;
pub use sizes::SizeSettings;

use crate::constants::JAVA_LANG_STRING;
use crate::reachability::Derived;
use crate::reader::{BasicType, DumpReader, HprofHeader};
use crate::Result;

/// An indexed heap dump. Immutable once built and safe to share between threads.
pub struct Heap {
    pub(crate) reader: DumpReader,
    pub(crate) options: HeapOptions,
    pub(crate) sizes: SizeSettings,
    pub(crate) classes: Vec<ClassMetadata>,
    pub(crate) class_ids: HashMap<u64, ClassIndex>,
    pub(crate) class_names: HashMap<String, ClassIndex>,
    pub(crate) objects: Vec<Instance>,
    pub(crate) object_ids: HashMap<u64, u32>,
    pub(crate) roots: Vec<GcRoot>,
    /// Most rooted objects are named by a single root record.
    pub(crate) roots_by_object: HashMap<u32, SmallVec<[u32; 1]>>,
    pub(crate) field_cache: Mutex<LruCache<u32, Arc<[FieldValue]>>>,
    pub(crate) derived: Derived,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapSummary {
    pub format: String,
    pub id_size: u8,
    pub classes: usize,
    pub instances: usize,
    pub total_size: u64,
    pub gc_roots: usize,
}

impl Heap {
    pub fn build(reader: DumpReader, options: HeapOptions) -> Result<Heap> {
        builder::build(reader, options)
    }

    pub fn open(path: impl AsRef<Path>, options: HeapOptions) -> Result<Heap> {
        Heap::build(DumpReader::open(path)?, options)
    }

    pub fn from_bytes(bytes: Vec<u8>, options: HeapOptions) -> Result<Heap> {
        Heap::build(DumpReader::from_bytes(bytes)?, options)
    }

    pub fn header(&self) -> &HprofHeader {
        self.reader.header()
    }

    pub fn id_size(&self) -> u8 {
        self.reader.id_size()
    }

    pub fn options(&self) -> &HeapOptions {
        &self.options
    }

    pub fn size_settings(&self) -> &SizeSettings {
        &self.sizes
    }

    pub fn summary(&self) -> HeapSummary {
        let instances = self.objects.iter().filter(|o| !o.is_class()).count();
        HeapSummary {
            format: self.header().format.clone(),
            id_size: self.id_size(),
            classes: self.classes.len(),
            instances,
            total_size: self.objects.iter().map(|o| o.size).sum(),
            gc_roots: self.roots.len(),
        }
    }

    /// All classes in build order.
    pub fn all_classes(&self) -> &[ClassMetadata] {
        &self.classes
    }

    pub fn class(&self, index: ClassIndex) -> &ClassMetadata {
        &self.classes[index.as_usize()]
    }

    pub fn class_by_name(&self, name: &str) -> Option<&ClassMetadata> {
        self.class_names.get(name).map(|c| self.class(*c))
    }

    pub fn class_by_id(&self, id: u64) -> Option<&ClassMetadata> {
        self.class_ids.get(&id).map(|c| self.class(*c))
    }

    /// Classes whose whole name matches `pattern`, in build order.
    pub fn classes_matching(&self, pattern: &str) -> Result<Vec<&ClassMetadata>> {
        let re = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(self.classes.iter().filter(|c| re.is_match(&c.name)).collect())
    }

    pub fn superclass(&self, class: &ClassMetadata) -> Option<&ClassMetadata> {
        class.superclass.and_then(|id| self.class_by_id(id))
    }

    /// Superclasses of `class`, nearest first.
    pub fn superclasses(&self, class: &ClassMetadata) -> Vec<&ClassMetadata> {
        let mut result = vec![];
        let mut current = self.superclass(class);
        while let Some(c) = current {
            result.push(c);
            current = self.superclass(c);
        }
        result
    }

    /// True if `class` is `ancestor` or inherits from it.
    pub fn is_subclass_of(&self, class: &ClassMetadata, ancestor: &ClassMetadata) -> bool {
        let mut current = Some(class);
        while let Some(c) = current {
            if c.index == ancestor.index {
                return true;
            }
            current = self.superclass(c);
        }
        false
    }

    /// `class` followed by all of its transitive subclasses, depth first.
    pub fn class_and_subclasses(&self, class: &ClassMetadata) -> Vec<&ClassMetadata> {
        let mut result = vec![];
        let mut stack = vec![class.index];
        while let Some(c) = stack.pop() {
            let class = self.class(c);
            result.push(class);
            stack.extend(class.subclasses.iter().rev().copied());
        }
        result
    }

    pub fn instance_by_id(&self, id: u64) -> Option<Instance> {
        self.object_ids.get(&id).map(|i| self.objects[*i as usize])
    }

    pub(crate) fn object_at(&self, index: usize) -> Instance {
        self.objects[index]
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Object describing `class`, absent for synthesized array classes.
    pub fn class_object(&self, class: &ClassMetadata) -> Option<Instance> {
        class.object.map(|i| self.objects[i as usize])
    }

    pub fn instances<'a>(&'a self, class: &'a ClassMetadata) -> impl Iterator<Item = Instance> + 'a {
        class.instances.iter().map(move |i| self.objects[*i as usize])
    }

    pub fn instances_including_subclasses<'a>(
        &'a self,
        class: &'a ClassMetadata,
    ) -> impl Iterator<Item = Instance> + 'a {
        self.class_and_subclasses(class)
            .into_iter()
            .flat_map(move |c| self.instances(c))
    }

    /// Every instance and array, excluding class objects, in dump order.
    pub fn all_instances(&self) -> impl Iterator<Item = Instance> + '_ {
        self.objects.iter().copied().filter(|o| !o.is_class())
    }

    /// Every object, class objects included, in dump order.
    pub fn all_objects(&self) -> impl Iterator<Item = Instance> + '_ {
        self.objects.iter().copied()
    }

    pub fn gc_roots(&self) -> &[GcRoot] {
        &self.roots
    }

    /// Root records that name `instance`.
    pub fn gc_roots_for(&self, instance: &Instance) -> Vec<GcRoot> {
        self.roots_by_object
            .get(&instance.index)
            .map(|rs| rs.iter().map(|r| self.roots[*r as usize]).collect())
            .unwrap_or_default()
    }

    pub fn is_gc_root(&self, instance: &Instance) -> bool {
        self.roots_by_object.contains_key(&instance.index)
    }

    /// Decoded fields of an instance (own class first, then superclasses),
    /// slots of an object array, or statics of a class object.
    pub fn fields(&self, instance: &Instance) -> Result<Arc<[FieldValue]>> {
        if let Some(cached) = self.field_cache.lock().unwrap().get(&instance.index) {
            return Ok(cached.clone());
        }
        let decoded: Arc<[FieldValue]> = self.decode_fields(instance)?.into();
        self.field_cache
            .lock()
            .unwrap()
            .put(instance.index, decoded.clone());
        Ok(decoded)
    }

    /// First field called `name`, searching the object's class before its superclasses.
    pub fn field_value(&self, instance: &Instance, name: &str) -> Result<Option<FieldValue>> {
        Ok(self
            .fields(instance)?
            .iter()
            .find(|f| f.name() == name)
            .cloned())
    }

    pub(crate) fn decode_fields(&self, instance: &Instance) -> Result<Vec<FieldValue>> {
        let id = self.id_size() as u64;
        match instance.kind {
            ObjectKind::Instance => {
                let mut cursor = self.reader.cursor_at(instance.offset + 1 + id + 4 + id + 4);
                let mut values = vec![];
                let mut class = Some(self.class(instance.class));
                while let Some(c) = class {
                    for decl in &c.fields {
                        values.push(FieldValue::read(&mut cursor, &decl.name, decl.ty)?);
                    }
                    class = self.superclass(c);
                }
                Ok(values)
            }
            ObjectKind::ObjectArray => {
                let mut cursor = self.reader.cursor_at(instance.offset + 1 + id + 4 + 4 + id);
                let mut values = Vec::with_capacity(instance.length as usize);
                for index in 0..instance.length {
                    values.push(FieldValue::Element {
                        index,
                        id: cursor.read_id()?,
                    });
                }
                Ok(values)
            }
            ObjectKind::Class => Ok(self.class(instance.class).statics.clone()),
            ObjectKind::PrimitiveArray(_) => Ok(vec![]),
        }
    }

    /// Elements of a primitive array.
    pub fn primitive_array(&self, instance: &Instance) -> Result<Option<PrimitiveArray>> {
        let ObjectKind::PrimitiveArray(ty) = instance.kind else {
            return Ok(None);
        };
        let id = self.id_size() as u64;
        let mut cursor = self.reader.cursor_at(instance.offset + 1 + id + 4 + 4 + 1);
        let mut values = Vec::with_capacity(instance.length as usize);
        for _ in 0..instance.length {
            values.push(Primitive::read(&mut cursor, ty)?);
        }
        Ok(Some(PrimitiveArray { ty, values }))
    }

    /// Text of a `java.lang.String`, from either a `char[]` or a compact
    /// `byte[]` value. Legacy `offset`/`count` fields are honoured.
    pub fn string_value(&self, instance: &Instance) -> Result<Option<String>> {
        if instance.kind != ObjectKind::Instance
            || self.class(instance.class).name != JAVA_LANG_STRING
        {
            return Ok(None);
        }
        let fields = self.fields(instance)?;
        let find = |name: &str| fields.iter().find(|f| f.name() == name);
        let int = |name: &str| {
            find(name)
                .and_then(FieldValue::primitive)
                .and_then(Primitive::as_i64)
        };
        let Some(array) = find("value")
            .and_then(FieldValue::object_id)
            .and_then(|id| self.instance_by_id(id))
        else {
            return Ok(None);
        };
        let Some(data) = self.primitive_array(&array)? else {
            return Ok(None);
        };
        let text = match data.ty {
            BasicType::Char => {
                let units: Vec<u16> = data
                    .values
                    .iter()
                    .map(|v| match v {
                        Primitive::Char(c) => *c,
                        _ => 0,
                    })
                    .collect();
                let start = (int("offset").unwrap_or(0).max(0) as usize).min(units.len());
                let end = match int("count") {
                    Some(count) => (start + count.max(0) as usize).min(units.len()),
                    None => units.len(),
                };
                String::from_utf16_lossy(&units[start..end])
            }
            BasicType::Byte => {
                let bytes: Vec<u8> = data
                    .values
                    .iter()
                    .map(|v| match v {
                        Primitive::Byte(b) => *b as u8,
                        _ => 0,
                    })
                    .collect();
                if int("coder") == Some(1) {
                    let units: Vec<u16> = bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                        .collect();
                    String::from_utf16_lossy(&units)
                } else {
                    bytes.iter().map(|b| *b as char).collect()
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(text))
    }
}
