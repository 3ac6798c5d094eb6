//! Synthetic HPROF dumps for tests.

use std::collections::HashMap;

use crate::reader::*;
use crate::{Heap, HeapOptions};

#[derive(Clone, Copy, Debug)]
pub enum Val {
    Obj(u64),
    Bool(bool),
    Char(u16),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Val {
    fn basic_type(self) -> BasicType {
        match self {
            Val::Obj(_) => BasicType::Object,
            Val::Bool(_) => BasicType::Boolean,
            Val::Char(_) => BasicType::Char,
            Val::Byte(_) => BasicType::Byte,
            Val::Short(_) => BasicType::Short,
            Val::Int(_) => BasicType::Int,
            Val::Long(_) => BasicType::Long,
            Val::Float(_) => BasicType::Float,
            Val::Double(_) => BasicType::Double,
        }
    }
}

pub struct HprofWriter {
    id_size: u8,
    out: Vec<u8>,
    segment: Vec<u8>,
    strings: HashMap<String, u64>,
    next_string_id: u64,
    next_serial: u32,
}

impl HprofWriter {
    pub fn new(id_size: u8) -> HprofWriter {
        let mut out = b"JAVA PROFILE 1.0.2\0".to_vec();
        out.extend_from_slice(&(id_size as u32).to_be_bytes());
        out.extend_from_slice(&0x0000_0190_0000_0000u64.to_be_bytes());
        HprofWriter {
            id_size,
            out,
            segment: vec![],
            strings: HashMap::new(),
            next_string_id: 0x00ff_0000,
            next_serial: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    fn put_id(id_size: u8, buf: &mut Vec<u8>, id: u64) {
        if id_size == 4 {
            buf.extend_from_slice(&(id as u32).to_be_bytes());
        } else {
            buf.extend_from_slice(&id.to_be_bytes());
        }
    }

    fn put_val(id_size: u8, buf: &mut Vec<u8>, val: Val) {
        match val {
            Val::Obj(id) => Self::put_id(id_size, buf, id),
            Val::Bool(b) => buf.push(b as u8),
            Val::Char(c) => buf.extend_from_slice(&c.to_be_bytes()),
            Val::Byte(b) => buf.push(b as u8),
            Val::Short(s) => buf.extend_from_slice(&s.to_be_bytes()),
            Val::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
            Val::Long(l) => buf.extend_from_slice(&l.to_be_bytes()),
            Val::Float(f) => buf.extend_from_slice(&f.to_bits().to_be_bytes()),
            Val::Double(d) => buf.extend_from_slice(&d.to_bits().to_be_bytes()),
        }
    }

    pub fn raw_record(&mut self, tag: u8, body: &[u8]) {
        self.out.push(tag);
        self.out.extend_from_slice(&0u32.to_be_bytes());
        self.out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.out.extend_from_slice(body);
    }

    /// Writes a UTF-8 record for `text` once and returns its string id.
    pub fn utf8(&mut self, text: &str) -> u64 {
        if let Some(id) = self.strings.get(text) {
            return *id;
        }
        let id = self.next_string_id;
        self.next_string_id += 1;
        let mut body = vec![];
        Self::put_id(self.id_size, &mut body, id);
        body.extend_from_slice(text.as_bytes());
        self.raw_record(TAG_UTF8, &body);
        self.strings.insert(text.to_string(), id);
        id
    }

    /// `name` uses the JVM internal form, e.g. `java/lang/String` or `[I`.
    pub fn load_class(&mut self, class_id: u64, name: &str) {
        let name_id = self.utf8(name);
        let mut body = vec![];
        body.extend_from_slice(&self.next_serial.to_be_bytes());
        self.next_serial += 1;
        Self::put_id(self.id_size, &mut body, class_id);
        body.extend_from_slice(&0u32.to_be_bytes());
        Self::put_id(self.id_size, &mut body, name_id);
        self.raw_record(TAG_LOAD_CLASS, &body);
    }

    pub fn class_dump(
        &mut self,
        class_id: u64,
        super_id: u64,
        instance_size: u32,
        statics: &[(&str, Val)],
        fields: &[(&str, BasicType)],
    ) {
        let static_names: Vec<u64> = statics.iter().map(|(n, _)| self.utf8(n)).collect();
        let field_names: Vec<u64> = fields.iter().map(|(n, _)| self.utf8(n)).collect();
        let id_size = self.id_size;
        let buf = &mut self.segment;
        buf.push(SUB_CLASS_DUMP);
        Self::put_id(id_size, buf, class_id);
        buf.extend_from_slice(&0u32.to_be_bytes());
        Self::put_id(id_size, buf, super_id);
        for _ in 0..5 {
            Self::put_id(id_size, buf, 0);
        }
        buf.extend_from_slice(&instance_size.to_be_bytes());
        // one constant pool entry to exercise skipping
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&7u16.to_be_bytes());
        buf.push(BasicType::Int.code());
        buf.extend_from_slice(&42i32.to_be_bytes());
        buf.extend_from_slice(&(statics.len() as u16).to_be_bytes());
        for ((_, val), name) in statics.iter().zip(static_names) {
            Self::put_id(id_size, buf, name);
            buf.push(val.basic_type().code());
            Self::put_val(id_size, buf, *val);
        }
        buf.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for ((_, ty), name) in fields.iter().zip(field_names) {
            Self::put_id(id_size, buf, name);
            buf.push(ty.code());
        }
    }

    /// `values` are laid out as in the dump: the class's own fields first,
    /// then each superclass's.
    pub fn instance(&mut self, id: u64, class_id: u64, values: &[Val]) {
        let mut data = vec![];
        for v in values {
            Self::put_val(self.id_size, &mut data, *v);
        }
        let buf = &mut self.segment;
        buf.push(SUB_INSTANCE_DUMP);
        Self::put_id(self.id_size, buf, id);
        buf.extend_from_slice(&0u32.to_be_bytes());
        Self::put_id(self.id_size, buf, class_id);
        buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&data);
    }

    pub fn object_array(&mut self, id: u64, class_id: u64, elements: &[u64]) {
        let buf = &mut self.segment;
        buf.push(SUB_OBJECT_ARRAY_DUMP);
        Self::put_id(self.id_size, buf, id);
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&(elements.len() as u32).to_be_bytes());
        Self::put_id(self.id_size, buf, class_id);
        for e in elements {
            Self::put_id(self.id_size, buf, *e);
        }
    }

    pub fn primitive_array(&mut self, id: u64, ty: BasicType, values: &[Val]) {
        let buf = &mut self.segment;
        buf.push(SUB_PRIMITIVE_ARRAY_DUMP);
        Self::put_id(self.id_size, buf, id);
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&(values.len() as u32).to_be_bytes());
        buf.push(ty.code());
        for v in values {
            Self::put_val(self.id_size, buf, *v);
        }
    }

    pub fn char_array(&mut self, id: u64, text: &str) {
        let chars: Vec<Val> = text.encode_utf16().map(Val::Char).collect();
        self.primitive_array(id, BasicType::Char, &chars);
    }

    pub fn root(&mut self, kind: GcRootKind, id: u64) {
        let tag = match kind {
            GcRootKind::Unknown => SUB_ROOT_UNKNOWN,
            GcRootKind::JniGlobal => SUB_ROOT_JNI_GLOBAL,
            GcRootKind::JniLocal => SUB_ROOT_JNI_LOCAL,
            GcRootKind::JavaFrame => SUB_ROOT_JAVA_FRAME,
            GcRootKind::NativeStack => SUB_ROOT_NATIVE_STACK,
            GcRootKind::StickyClass => SUB_ROOT_STICKY_CLASS,
            GcRootKind::ThreadBlock => SUB_ROOT_THREAD_BLOCK,
            GcRootKind::MonitorUsed => SUB_ROOT_MONITOR_USED,
            GcRootKind::ThreadObject => SUB_ROOT_THREAD_OBJECT,
            GcRootKind::InternedString => SUB_ROOT_INTERNED_STRING,
            GcRootKind::Finalizing => SUB_ROOT_FINALIZING,
            GcRootKind::Debugger => SUB_ROOT_DEBUGGER,
            GcRootKind::ReferenceCleanup => SUB_ROOT_REFERENCE_CLEANUP,
            GcRootKind::VmInternal => SUB_ROOT_VM_INTERNAL,
            GcRootKind::JniMonitor => SUB_ROOT_JNI_MONITOR,
            GcRootKind::Unreachable => SUB_ROOT_UNREACHABLE,
        };
        let buf = &mut self.segment;
        buf.push(tag);
        Self::put_id(self.id_size, buf, id);
        buf.resize(buf.len() + kind.trailer_len(self.id_size), 0);
    }

    /// Emits the pending sub-records as one heap dump segment.
    pub fn flush_segment(&mut self) {
        if !self.segment.is_empty() {
            let segment = std::mem::take(&mut self.segment);
            self.raw_record(TAG_HEAP_DUMP_SEGMENT, &segment);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush_segment();
        self.raw_record(TAG_HEAP_DUMP_END, &[]);
        self.out
    }
}

// Object ids of the sample heap.
pub const OBJECT_CLASS: u64 = 0x100;
pub const STRING_CLASS: u64 = 0x110;
pub const CHAR_ARRAY_CLASS: u64 = 0x120;
pub const NODE_CLASS: u64 = 0x130;
pub const REFERENCE_CLASS: u64 = 0x140;
pub const WEAK_REFERENCE_CLASS: u64 = 0x150;
pub const HOLDER_CLASS: u64 = 0x160;
pub const OBJECT_ARRAY_CLASS: u64 = 0x170;
pub const SPECIAL_NODE_CLASS: u64 = 0x180;

pub const S1: u64 = 0x1000;
pub const C1: u64 = 0x1010;
pub const S2: u64 = 0x1020;
pub const C2: u64 = 0x1030;
pub const N1: u64 = 0x2000;
pub const N2: u64 = 0x2010;
pub const N3: u64 = 0x2020;
pub const A1: u64 = 0x3000;
pub const W1: u64 = 0x4000;
pub const U1: u64 = 0x6000;
pub const H1: u64 = 0x7000;

/// A small heap with a known shape, 8-byte ids.
///
/// Roots: the `Holder` class (sticky), `N1` (Java frame), `W1` (JNI global).
/// Edges: Holder.INSTANCE -> H1 -> A1 -> {N1, N3}; N1 -> {N2, S1}; N2 -> N3;
/// N3 -> S2; S1 -> C1; S2 -> C2; W1 -weak-> N2. `U1` is unreachable.
pub fn sample_dump() -> Vec<u8> {
    let mut w = HprofWriter::new(8);
    w.load_class(OBJECT_CLASS, "java/lang/Object");
    w.load_class(STRING_CLASS, "java/lang/String");
    w.load_class(CHAR_ARRAY_CLASS, "[C");
    w.load_class(NODE_CLASS, "com/example/Node");
    w.load_class(REFERENCE_CLASS, "java/lang/ref/Reference");
    w.load_class(WEAK_REFERENCE_CLASS, "java/lang/ref/WeakReference");
    w.load_class(HOLDER_CLASS, "com/example/Holder");
    w.load_class(OBJECT_ARRAY_CLASS, "[Ljava/lang/Object;");
    w.load_class(SPECIAL_NODE_CLASS, "com/example/SpecialNode");

    w.class_dump(OBJECT_CLASS, 0, 0, &[], &[]);
    w.class_dump(
        STRING_CLASS,
        OBJECT_CLASS,
        12,
        &[],
        &[("value", BasicType::Object), ("hash", BasicType::Int)],
    );
    w.class_dump(CHAR_ARRAY_CLASS, OBJECT_CLASS, 0, &[], &[]);
    w.class_dump(
        NODE_CLASS,
        OBJECT_CLASS,
        20,
        &[],
        &[
            ("next", BasicType::Object),
            ("payload", BasicType::Object),
            ("weight", BasicType::Int),
        ],
    );
    w.class_dump(
        REFERENCE_CLASS,
        OBJECT_CLASS,
        16,
        &[],
        &[("referent", BasicType::Object), ("queue", BasicType::Object)],
    );
    w.class_dump(WEAK_REFERENCE_CLASS, REFERENCE_CLASS, 16, &[], &[]);
    w.class_dump(
        HOLDER_CLASS,
        OBJECT_CLASS,
        8,
        &[("INSTANCE", Val::Obj(H1)), ("enabled", Val::Bool(true))],
        &[("items", BasicType::Object)],
    );
    w.class_dump(OBJECT_ARRAY_CLASS, OBJECT_CLASS, 0, &[], &[]);
    w.class_dump(
        SPECIAL_NODE_CLASS,
        NODE_CLASS,
        24,
        &[],
        &[("tag", BasicType::Int)],
    );

    w.instance(S1, STRING_CLASS, &[Val::Obj(C1), Val::Int(0)]);
    w.char_array(C1, "hello");
    w.instance(S2, STRING_CLASS, &[Val::Obj(C2), Val::Int(0)]);
    w.char_array(C2, "world");
    w.instance(N1, NODE_CLASS, &[Val::Obj(N2), Val::Obj(S1), Val::Int(1)]);
    w.instance(N2, NODE_CLASS, &[Val::Obj(N3), Val::Obj(0), Val::Int(2)]);
    w.instance(
        N3,
        SPECIAL_NODE_CLASS,
        &[Val::Int(7), Val::Obj(0), Val::Obj(S2), Val::Int(3)],
    );
    w.object_array(A1, OBJECT_ARRAY_CLASS, &[N1, N3]);
    w.instance(W1, WEAK_REFERENCE_CLASS, &[Val::Obj(N2), Val::Obj(0)]);
    w.instance(U1, NODE_CLASS, &[Val::Obj(0), Val::Obj(0), Val::Int(9)]);
    w.instance(H1, HOLDER_CLASS, &[Val::Obj(A1)]);

    w.root(GcRootKind::StickyClass, HOLDER_CLASS);
    w.root(GcRootKind::JavaFrame, N1);
    w.root(GcRootKind::JniGlobal, W1);
    w.finish()
}

pub fn sample_heap() -> Heap {
    Heap::from_bytes(sample_dump(), HeapOptions::default()).unwrap()
}
