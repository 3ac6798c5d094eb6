//! HPROF record tags and the basic value types that appear in them.

use std::fmt;

pub const TAG_UTF8: u8 = 0x01;
pub const TAG_LOAD_CLASS: u8 = 0x02;
pub const TAG_STACK_FRAME: u8 = 0x04;
pub const TAG_STACK_TRACE: u8 = 0x05;
pub const TAG_HEAP_DUMP: u8 = 0x0c;
pub const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1c;
pub const TAG_HEAP_DUMP_END: u8 = 0x2c;

pub const SUB_ROOT_UNKNOWN: u8 = 0xff;
pub const SUB_ROOT_JNI_GLOBAL: u8 = 0x01;
pub const SUB_ROOT_JNI_LOCAL: u8 = 0x02;
pub const SUB_ROOT_JAVA_FRAME: u8 = 0x03;
pub const SUB_ROOT_NATIVE_STACK: u8 = 0x04;
pub const SUB_ROOT_STICKY_CLASS: u8 = 0x05;
pub const SUB_ROOT_THREAD_BLOCK: u8 = 0x06;
pub const SUB_ROOT_MONITOR_USED: u8 = 0x07;
pub const SUB_ROOT_THREAD_OBJECT: u8 = 0x08;
pub const SUB_ROOT_INTERNED_STRING: u8 = 0x89;
pub const SUB_ROOT_FINALIZING: u8 = 0x8a;
pub const SUB_ROOT_DEBUGGER: u8 = 0x8b;
pub const SUB_ROOT_REFERENCE_CLEANUP: u8 = 0x8c;
pub const SUB_ROOT_VM_INTERNAL: u8 = 0x8d;
pub const SUB_ROOT_JNI_MONITOR: u8 = 0x8e;
pub const SUB_ROOT_UNREACHABLE: u8 = 0x90;
pub const SUB_CLASS_DUMP: u8 = 0x20;
pub const SUB_INSTANCE_DUMP: u8 = 0x21;
pub const SUB_OBJECT_ARRAY_DUMP: u8 = 0x22;
pub const SUB_PRIMITIVE_ARRAY_DUMP: u8 = 0x23;
pub const SUB_PRIMITIVE_ARRAY_NODATA: u8 = 0xc3;
pub const SUB_HEAP_DUMP_INFO: u8 = 0xfe;

/// The type code attached to fields, statics, constants and primitive arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BasicType {
    Object,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl BasicType {
    pub fn from_code(code: u8) -> Option<BasicType> {
        Some(match code {
            // 1 marks array-typed fields in some older dumps
            1 | 2 => BasicType::Object,
            4 => BasicType::Boolean,
            5 => BasicType::Char,
            6 => BasicType::Float,
            7 => BasicType::Double,
            8 => BasicType::Byte,
            9 => BasicType::Short,
            10 => BasicType::Int,
            11 => BasicType::Long,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            BasicType::Object => 2,
            BasicType::Boolean => 4,
            BasicType::Char => 5,
            BasicType::Float => 6,
            BasicType::Double => 7,
            BasicType::Byte => 8,
            BasicType::Short => 9,
            BasicType::Int => 10,
            BasicType::Long => 11,
        }
    }

    /// The letter used in JVM array descriptors such as `[I`.
    pub fn from_descriptor(c: char) -> Option<BasicType> {
        Some(match c {
            'Z' => BasicType::Boolean,
            'C' => BasicType::Char,
            'F' => BasicType::Float,
            'D' => BasicType::Double,
            'B' => BasicType::Byte,
            'S' => BasicType::Short,
            'I' => BasicType::Int,
            'J' => BasicType::Long,
            _ => return None,
        })
    }

    pub fn size(self, id_size: u8) -> usize {
        match self {
            BasicType::Object => id_size as usize,
            BasicType::Boolean | BasicType::Byte => 1,
            BasicType::Char | BasicType::Short => 2,
            BasicType::Float | BasicType::Int => 4,
            BasicType::Double | BasicType::Long => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BasicType::Object => "object",
            BasicType::Boolean => "boolean",
            BasicType::Char => "char",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::Byte => "byte",
            BasicType::Short => "short",
            BasicType::Int => "int",
            BasicType::Long => "long",
        }
    }

    /// Name of the primitive array class holding elements of this type.
    pub fn array_class_name(self) -> String {
        format!("{}[]", self.name())
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GcRootKind {
    Unknown,
    JniGlobal,
    JniLocal,
    JavaFrame,
    NativeStack,
    StickyClass,
    ThreadBlock,
    MonitorUsed,
    ThreadObject,
    InternedString,
    Finalizing,
    Debugger,
    ReferenceCleanup,
    VmInternal,
    JniMonitor,
    Unreachable,
}

impl GcRootKind {
    pub fn from_sub_tag(tag: u8) -> Option<GcRootKind> {
        Some(match tag {
            SUB_ROOT_UNKNOWN => GcRootKind::Unknown,
            SUB_ROOT_JNI_GLOBAL => GcRootKind::JniGlobal,
            SUB_ROOT_JNI_LOCAL => GcRootKind::JniLocal,
            SUB_ROOT_JAVA_FRAME => GcRootKind::JavaFrame,
            SUB_ROOT_NATIVE_STACK => GcRootKind::NativeStack,
            SUB_ROOT_STICKY_CLASS => GcRootKind::StickyClass,
            SUB_ROOT_THREAD_BLOCK => GcRootKind::ThreadBlock,
            SUB_ROOT_MONITOR_USED => GcRootKind::MonitorUsed,
            SUB_ROOT_THREAD_OBJECT => GcRootKind::ThreadObject,
            SUB_ROOT_INTERNED_STRING => GcRootKind::InternedString,
            SUB_ROOT_FINALIZING => GcRootKind::Finalizing,
            SUB_ROOT_DEBUGGER => GcRootKind::Debugger,
            SUB_ROOT_REFERENCE_CLEANUP => GcRootKind::ReferenceCleanup,
            SUB_ROOT_VM_INTERNAL => GcRootKind::VmInternal,
            SUB_ROOT_JNI_MONITOR => GcRootKind::JniMonitor,
            SUB_ROOT_UNREACHABLE => GcRootKind::Unreachable,
            _ => return None,
        })
    }

    /// Bytes following the root's object id in its sub-record.
    pub(crate) fn trailer_len(self, id_size: u8) -> usize {
        match self {
            GcRootKind::JniGlobal => id_size as usize,
            GcRootKind::JniLocal
            | GcRootKind::JavaFrame
            | GcRootKind::ThreadObject
            | GcRootKind::JniMonitor => 8,
            GcRootKind::NativeStack | GcRootKind::ThreadBlock => 4,
            _ => 0,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GcRootKind::Unknown => "unknown",
            GcRootKind::JniGlobal => "JNI global",
            GcRootKind::JniLocal => "JNI local",
            GcRootKind::JavaFrame => "Java frame",
            GcRootKind::NativeStack => "native stack",
            GcRootKind::StickyClass => "sticky class",
            GcRootKind::ThreadBlock => "thread block",
            GcRootKind::MonitorUsed => "busy monitor",
            GcRootKind::ThreadObject => "thread object",
            GcRootKind::InternedString => "interned string",
            GcRootKind::Finalizing => "finalizing",
            GcRootKind::Debugger => "debugger",
            GcRootKind::ReferenceCleanup => "reference cleanup",
            GcRootKind::VmInternal => "VM internal",
            GcRootKind::JniMonitor => "JNI monitor",
            GcRootKind::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for GcRootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// What a raw record describes. Heap dump sub-records are reported with
/// their own kind, following the segment that contains them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Utf8,
    LoadClass,
    StackFrame,
    StackTrace,
    HeapDumpSegment,
    HeapDumpEnd,
    GcRoot(GcRootKind),
    ClassDump,
    InstanceDump,
    ObjectArrayDump,
    PrimitiveArrayDump,
    HeapDumpInfo,
    Other(u8),
}

impl RecordKind {
    pub(crate) fn from_tag(tag: u8) -> RecordKind {
        match tag {
            TAG_UTF8 => RecordKind::Utf8,
            TAG_LOAD_CLASS => RecordKind::LoadClass,
            TAG_STACK_FRAME => RecordKind::StackFrame,
            TAG_STACK_TRACE => RecordKind::StackTrace,
            TAG_HEAP_DUMP | TAG_HEAP_DUMP_SEGMENT => RecordKind::HeapDumpSegment,
            TAG_HEAP_DUMP_END => RecordKind::HeapDumpEnd,
            other => RecordKind::Other(other),
        }
    }
}

/// Location of one record in the dump. `offset` points at the tag byte and
/// `body` at the first byte after the record header; `length` is the body size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub kind: RecordKind,
    pub tag: u8,
    pub offset: u64,
    pub body: u64,
    pub length: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_type_codes() {
        for code in 2..=11u8 {
            if let Some(ty) = BasicType::from_code(code) {
                assert_eq!(ty.code(), code);
            }
        }
        assert_eq!(BasicType::from_code(3), None);
        assert_eq!(BasicType::from_code(1), Some(BasicType::Object));
        assert_eq!(BasicType::Long.size(4), 8);
        assert_eq!(BasicType::Object.size(4), 4);
        assert_eq!(BasicType::from_descriptor('J'), Some(BasicType::Long));
        assert_eq!(BasicType::Char.array_class_name(), "char[]");
    }

    #[test]
    fn test_root_trailers() {
        assert_eq!(GcRootKind::JniGlobal.trailer_len(8), 8);
        assert_eq!(GcRootKind::JavaFrame.trailer_len(8), 8);
        assert_eq!(GcRootKind::StickyClass.trailer_len(8), 0);
        assert_eq!(GcRootKind::from_sub_tag(0x8e), Some(GcRootKind::JniMonitor));
        assert_eq!(GcRootKind::from_sub_tag(0x20), None);
    }
}
