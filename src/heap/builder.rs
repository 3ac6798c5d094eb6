//! Single-pass construction of the heap indexes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use lru::LruCache;
use smallvec::SmallVec;

use super::class::{java_class_name, ClassIndex, ClassMetadata};
use super::field::{FieldDecl, FieldValue};
use super::gc_root::GcRoot;
use super::instance::{Instance, ObjectKind};
use super::options::HeapOptions;
use super::sizes::SizeSettings;
use super::Heap;
use crate::constants::JAVA_LANG_OBJECT;
use crate::error::corrupt_dump;
use crate::reachability::Derived;
use crate::reader::*;
use crate::Result;

struct RawClass {
    id: u64,
    offset: u64,
    superclass: u64,
    loader: u64,
    instance_size: u32,
    /// Name string id, type and file offset of each static value.
    statics: Vec<(u64, BasicType, u64)>,
    fields: Vec<(u64, BasicType)>,
}

enum PendingKind {
    Class(usize),
    Instance { class_id: u64, data_len: u32 },
    ObjectArray { class_id: u64, length: u32 },
    PrimitiveArray { ty: BasicType, length: u32, has_data: bool },
}

struct PendingObject {
    id: u64,
    offset: u64,
    kind: PendingKind,
}

/// Everything learnt from the record stream before resolution.
#[derive(Default)]
struct Scan {
    strings: HashMap<u64, (usize, usize)>,
    load_names: HashMap<u64, u64>,
    classes: Vec<RawClass>,
    objects: Vec<PendingObject>,
    roots: Vec<(GcRoot, u64)>,
}

impl Scan {
    fn record(&mut self, reader: &DumpReader, record: &RawRecord) -> Result<()> {
        let id_size = reader.id_size() as usize;
        let mut cursor = reader.cursor_at(record.body);
        match record.kind {
            RecordKind::Utf8 => {
                let id = cursor.read_id()?;
                let len = (record.length as usize).checked_sub(id_size).ok_or_else(|| {
                    corrupt_dump!(record.offset, "string record shorter than its id")
                })?;
                self.strings.insert(id, (cursor.pos(), len));
            }
            RecordKind::LoadClass => {
                let _serial = cursor.read_u32()?;
                let class_id = cursor.read_id()?;
                let _stack = cursor.read_u32()?;
                let name_id = cursor.read_id()?;
                self.load_names.insert(class_id, name_id);
            }
            RecordKind::ClassDump => {
                let raw = read_class_dump(&mut cursor, record.offset)?;
                self.objects.push(PendingObject {
                    id: raw.id,
                    offset: record.offset,
                    kind: PendingKind::Class(self.classes.len()),
                });
                self.classes.push(raw);
            }
            RecordKind::InstanceDump => {
                let id = cursor.read_id()?;
                let _stack = cursor.read_u32()?;
                let class_id = cursor.read_id()?;
                let data_len = cursor.read_u32()?;
                self.objects.push(PendingObject {
                    id,
                    offset: record.offset,
                    kind: PendingKind::Instance { class_id, data_len },
                });
            }
            RecordKind::ObjectArrayDump => {
                let id = cursor.read_id()?;
                let _stack = cursor.read_u32()?;
                let length = cursor.read_u32()?;
                let class_id = cursor.read_id()?;
                self.objects.push(PendingObject {
                    id,
                    offset: record.offset,
                    kind: PendingKind::ObjectArray { class_id, length },
                });
            }
            RecordKind::PrimitiveArrayDump => {
                let id = cursor.read_id()?;
                let _stack = cursor.read_u32()?;
                let length = cursor.read_u32()?;
                let ty = read_basic_type(&mut cursor)?;
                self.objects.push(PendingObject {
                    id,
                    offset: record.offset,
                    kind: PendingKind::PrimitiveArray {
                        ty,
                        length,
                        has_data: record.tag == SUB_PRIMITIVE_ARRAY_DUMP,
                    },
                });
            }
            RecordKind::GcRoot(kind) => {
                let id = cursor.read_id()?;
                self.roots.push((GcRoot { kind, id }, record.offset));
            }
            _ => {}
        }
        Ok(())
    }

    fn string(&self, data: &[u8], id: u64) -> Option<String> {
        let (start, len) = *self.strings.get(&id)?;
        Some(String::from_utf8_lossy(&data[start..start + len]).into_owned())
    }
}

fn read_class_dump(cursor: &mut Cursor, offset: u64) -> Result<RawClass> {
    let id_size = cursor.id_size();
    let id = cursor.read_id()?;
    let _stack = cursor.read_u32()?;
    let superclass = cursor.read_id()?;
    let loader = cursor.read_id()?;
    // signers, protection domain, two reserved ids
    cursor.skip(4 * id_size as usize)?;
    let instance_size = cursor.read_u32()?;
    let constants = cursor.read_u16()?;
    for _ in 0..constants {
        let _index = cursor.read_u16()?;
        let ty = read_basic_type(cursor)?;
        cursor.skip(ty.size(id_size))?;
    }
    let static_count = cursor.read_u16()?;
    let mut statics = Vec::with_capacity(static_count as usize);
    for _ in 0..static_count {
        let name = cursor.read_id()?;
        let ty = read_basic_type(cursor)?;
        statics.push((name, ty, cursor.pos() as u64));
        cursor.skip(ty.size(id_size))?;
    }
    let field_count = cursor.read_u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let name = cursor.read_id()?;
        let ty = read_basic_type(cursor)?;
        fields.push((name, ty));
    }
    Ok(RawClass {
        id,
        offset,
        superclass,
        loader,
        instance_size,
        statics,
        fields,
    })
}

fn primitive_element_type(name: &str) -> Option<BasicType> {
    let element = name.strip_suffix("[]")?;
    [
        BasicType::Boolean,
        BasicType::Char,
        BasicType::Float,
        BasicType::Double,
        BasicType::Byte,
        BasicType::Short,
        BasicType::Int,
        BasicType::Long,
    ]
    .into_iter()
    .find(|ty| ty.name() == element)
}

pub(crate) fn build(reader: DumpReader, options: HeapOptions) -> Result<Heap> {
    let start = Instant::now();
    let mut scan = Scan::default();
    for record in reader.records() {
        scan.record(&reader, &record?)?;
    }
    debug!(
        "Scanned {} strings, {} classes, {} objects, {} roots in {} ms",
        scan.strings.len(),
        scan.classes.len(),
        scan.objects.len(),
        scan.roots.len(),
        start.elapsed().as_millis()
    );

    let id_size = reader.id_size();
    let data = reader.data();
    let mut names: HashMap<u64, Arc<str>> = HashMap::new();
    let mut intern = |scan: &Scan, id: u64| -> Arc<str> {
        names
            .entry(id)
            .or_insert_with(|| {
                scan.string(data, id)
                    .unwrap_or_else(|| format!("unknown{:#x}", id))
                    .into()
            })
            .clone()
    };

    let mut classes = Vec::with_capacity(scan.classes.len());
    let mut class_ids = HashMap::with_capacity(scan.classes.len());
    let mut class_names = HashMap::with_capacity(scan.classes.len());
    for (i, raw) in scan.classes.iter().enumerate() {
        let name = match scan
            .load_names
            .get(&raw.id)
            .and_then(|name_id| scan.string(data, *name_id))
        {
            Some(name) => java_class_name(&name),
            None => {
                warn!("Class {:#x} has no LOAD_CLASS record", raw.id);
                format!("unknown.Class{:#x}", raw.id)
            }
        };
        let fields = raw
            .fields
            .iter()
            .map(|(name_id, ty)| FieldDecl {
                name: intern(&scan, *name_id),
                ty: *ty,
            })
            .collect();
        let mut statics = Vec::with_capacity(raw.statics.len());
        for (name_id, ty, offset) in &raw.statics {
            let name = intern(&scan, *name_id);
            statics.push(FieldValue::read(&mut reader.cursor_at(*offset), &name, *ty)?);
        }
        let index = ClassIndex(i as u32);
        if class_ids.insert(raw.id, index).is_some() {
            return Err(corrupt_dump!(raw.offset, "duplicate class dump {:#x}", raw.id));
        }
        class_names.entry(name.clone()).or_insert(index);
        classes.push(ClassMetadata {
            index,
            id: raw.id,
            element_type: primitive_element_type(&name),
            name,
            superclass: (raw.superclass != 0).then_some(raw.superclass),
            loader: raw.loader,
            instance_size: raw.instance_size,
            fields,
            statics,
            subclasses: vec![],
            instances: vec![],
            instances_size: 0,
            object: None,
        });
    }

    // Primitive arrays name their element type rather than a class.
    let object_class_id = class_names
        .get(JAVA_LANG_OBJECT)
        .map(|c: &ClassIndex| classes[c.as_usize()].id);
    let mut array_classes: HashMap<BasicType, ClassIndex> = HashMap::new();
    for pending in &scan.objects {
        if let PendingKind::PrimitiveArray { ty, .. } = pending.kind {
            if array_classes.contains_key(&ty) {
                continue;
            }
            let name = ty.array_class_name();
            let index = match class_names.get(&name) {
                Some(index) => *index,
                None => {
                    let index = ClassIndex(classes.len() as u32);
                    debug!("Synthesizing class {}", name);
                    class_names.insert(name.clone(), index);
                    classes.push(ClassMetadata {
                        index,
                        id: 0,
                        name,
                        superclass: object_class_id,
                        loader: 0,
                        instance_size: 0,
                        fields: vec![],
                        statics: vec![],
                        subclasses: vec![],
                        instances: vec![],
                        instances_size: 0,
                        object: None,
                        element_type: Some(ty),
                    });
                    index
                }
            };
            array_classes.insert(ty, index);
        }
    }

    link_superclasses(&mut classes, &class_ids, &scan)?;

    let sizes = options
        .sizes
        .unwrap_or_else(|| SizeSettings::for_id_size(id_size));
    let layouts: Vec<u64> = (0..classes.len())
        .map(|i| layout_size(&classes, &class_ids, ClassIndex(i as u32), id_size))
        .collect();
    let resolve = |class_id: u64, offset: u64, id: u64| -> Result<ClassIndex> {
        class_ids.get(&class_id).copied().ok_or_else(|| {
            corrupt_dump!(
                offset,
                "object {:#x} references unknown class {:#x}",
                id,
                class_id
            )
        })
    };
    let mut objects: Vec<Instance> = Vec::with_capacity(scan.objects.len());
    let mut object_ids: HashMap<u64, u32> = HashMap::with_capacity(scan.objects.len());
    for pending in &scan.objects {
        if object_ids.contains_key(&pending.id) {
            warn!("Ignoring duplicate object {:#x}", pending.id);
            continue;
        }
        let (class, kind, size, length) = match pending.kind {
            PendingKind::Class(raw) => {
                let statics_size: usize = scan.classes[raw]
                    .statics
                    .iter()
                    .map(|(_, ty, _)| ty.size(id_size))
                    .sum();
                let size = sizes.instance(statics_size as u64);
                (ClassIndex(raw as u32), ObjectKind::Class, size, 0)
            }
            PendingKind::Instance { class_id, data_len } => {
                let class = resolve(class_id, pending.offset, pending.id)?;
                let layout = layouts[class.as_usize()];
                if (data_len as u64) < layout {
                    return Err(corrupt_dump!(
                        pending.offset,
                        "instance {:#x} holds {} bytes of fields, its class declares {}",
                        pending.id,
                        data_len,
                        layout
                    ));
                }
                (class, ObjectKind::Instance, sizes.instance(data_len as u64), 0)
            }
            PendingKind::ObjectArray { class_id, length } => {
                let class = resolve(class_id, pending.offset, pending.id)?;
                let size = sizes.array(length as u64, id_size as u64);
                (class, ObjectKind::ObjectArray, size, length)
            }
            PendingKind::PrimitiveArray {
                ty,
                length,
                has_data,
            } => {
                let size = sizes.array(length as u64, ty.size(id_size) as u64);
                let length = if has_data { length } else { 0 };
                (array_classes[&ty], ObjectKind::PrimitiveArray(ty), size, length)
            }
        };
        let index = objects.len() as u32;
        let metadata = &mut classes[class.as_usize()];
        let number = if kind == ObjectKind::Class {
            metadata.object = Some(index);
            0
        } else {
            metadata.instances.push(index);
            metadata.instances_size += size;
            metadata.instances.len() as u32
        };
        object_ids.insert(pending.id, index);
        objects.push(Instance {
            index,
            id: pending.id,
            class,
            kind,
            size,
            number,
            offset: pending.offset,
            length,
        });
    }

    let mut roots = Vec::with_capacity(scan.roots.len());
    let mut roots_by_object: HashMap<u32, SmallVec<[u32; 1]>> = HashMap::new();
    for (root, offset) in &scan.roots {
        if root.id == 0 {
            continue;
        }
        let index = object_ids.get(&root.id).ok_or_else(|| {
            corrupt_dump!(
                *offset,
                "{} root references unknown object {:#x}",
                root.kind,
                root.id
            )
        })?;
        roots_by_object
            .entry(*index)
            .or_default()
            .push(roots.len() as u32);
        roots.push(*root);
    }

    info!(
        "Indexed {} classes, {} objects and {} GC roots in {} ms",
        classes.len(),
        objects.len(),
        roots.len(),
        start.elapsed().as_millis()
    );

    let capacity = std::num::NonZeroUsize::new(options.field_cache_capacity)
        .unwrap_or(std::num::NonZeroUsize::MIN);
    Ok(Heap {
        reader,
        sizes,
        classes,
        class_ids,
        class_names,
        objects,
        object_ids,
        roots,
        roots_by_object,
        field_cache: Mutex::new(LruCache::new(capacity)),
        derived: Derived::default(),
        options,
    })
}

/// Resolves superclass ids, rejects cycles, and fills in subclass lists.
/// Bytes of instance field data a class and its superclasses declare.
/// Superclass chains are already known to be acyclic.
fn layout_size(
    classes: &[ClassMetadata],
    class_ids: &HashMap<u64, ClassIndex>,
    class: ClassIndex,
    id_size: u8,
) -> u64 {
    let mut total = 0;
    let mut current = Some(class);
    while let Some(c) = current {
        let metadata = &classes[c.as_usize()];
        total += metadata
            .fields
            .iter()
            .map(|f| f.ty.size(id_size) as u64)
            .sum::<u64>();
        current = metadata.superclass.and_then(|id| class_ids.get(&id).copied());
    }
    total
}

fn link_superclasses(
    classes: &mut [ClassMetadata],
    class_ids: &HashMap<u64, ClassIndex>,
    scan: &Scan,
) -> Result<()> {
    let mut supers = Vec::with_capacity(classes.len());
    for (i, class) in classes.iter().enumerate() {
        let offset = scan.classes.get(i).map_or(0, |raw| raw.offset);
        let superclass = match class.superclass {
            Some(id) => Some(*class_ids.get(&id).ok_or_else(|| {
                corrupt_dump!(
                    offset,
                    "superclass {:#x} of {} is not a class",
                    id,
                    class.name
                )
            })?),
            None => None,
        };
        supers.push(superclass);
    }
    for (i, class) in classes.iter().enumerate() {
        let mut steps = 0;
        let mut current = supers[i];
        while let Some(c) = current {
            steps += 1;
            if steps > classes.len() {
                let offset = scan.classes.get(i).map_or(0, |raw| raw.offset);
                return Err(corrupt_dump!(
                    offset,
                    "superclass chain of {} is cyclic",
                    class.name
                ));
            }
            current = supers[c.as_usize()];
        }
    }
    for (i, superclass) in supers.into_iter().enumerate() {
        if let Some(s) = superclass {
            classes[s.as_usize()].subclasses.push(ClassIndex(i as u32));
        }
    }
    Ok(())
}
