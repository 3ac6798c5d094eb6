//! Streaming access to the records of an HPROF dump.

mod backend;
mod cursor;
mod record;

use std::path::Path;

pub use backend::{open_backend, Backend, Memory, Physical};
pub use cursor::Cursor;
pub use record::*;

use crate::constants::HPROF_MAGIC_PREFIX;
use crate::error::corrupt_dump;
use crate::Result;

const RECORD_HEADER_LEN: usize = 9;
const MAX_FORMAT_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HprofHeader {
    pub format: String,
    pub id_size: u8,
    pub timestamp_ms: u64,
}

/// Owns the dump bytes and hands out lazy record iterators over them.
pub struct DumpReader {
    backend: Box<dyn Backend>,
    header: HprofHeader,
    records_start: usize,
}

impl DumpReader {
    pub fn open(path: impl AsRef<Path>) -> Result<DumpReader> {
        DumpReader::new(open_backend(path.as_ref())?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<DumpReader> {
        DumpReader::new(Box::new(Memory::new(bytes)))
    }

    pub fn new(backend: Box<dyn Backend>) -> Result<DumpReader> {
        let data = backend.data();
        let nul = data
            .iter()
            .take(MAX_FORMAT_LEN)
            .position(|b| *b == 0)
            .ok_or_else(|| corrupt_dump!(0, "missing HPROF format string"))?;
        if !data[..nul].starts_with(HPROF_MAGIC_PREFIX) {
            return Err(corrupt_dump!(0, "not an HPROF dump"));
        }
        let format = String::from_utf8_lossy(&data[..nul]).into_owned();
        let mut cursor = Cursor::new(data, nul + 1, 8);
        let id_size = cursor.read_u32()?;
        if id_size != 4 && id_size != 8 {
            return Err(corrupt_dump!(
                nul + 1,
                "unsupported identifier size {}",
                id_size
            ));
        }
        let timestamp_ms = cursor.read_u64()?;
        let header = HprofHeader {
            format,
            id_size: id_size as u8,
            timestamp_ms,
        };
        debug!("Opened {} dump with {}-byte ids", header.format, header.id_size);
        let records_start = cursor.pos();
        Ok(DumpReader {
            backend,
            header,
            records_start,
        })
    }

    pub fn header(&self) -> &HprofHeader {
        &self.header
    }

    pub fn id_size(&self) -> u8 {
        self.header.id_size
    }

    pub fn data(&self) -> &[u8] {
        self.backend.data()
    }

    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    pub fn cursor_at(&self, offset: u64) -> Cursor<'_> {
        Cursor::new(self.backend.data(), offset as usize, self.header.id_size)
    }

    /// Body bytes of a record.
    pub fn payload(&self, record: &RawRecord) -> Result<&[u8]> {
        self.backend
            .data_slice(record.body as usize, record.length as usize)
    }

    pub fn records(&self) -> Records<'_> {
        Records {
            data: self.backend.data(),
            id_size: self.header.id_size,
            pos: self.records_start,
            segment_end: None,
            failed: false,
        }
    }
}

/// Lazy sequence of top-level records and heap dump sub-records, in file order.
/// The iterator stops after yielding the first error.
pub struct Records<'a> {
    data: &'a [u8],
    id_size: u8,
    pos: usize,
    segment_end: Option<usize>,
    failed: bool,
}

impl Records<'_> {
    fn advance(&mut self) -> Result<Option<RawRecord>> {
        if let Some(end) = self.segment_end {
            if self.pos < end {
                return self.next_sub_record(end).map(Some);
            }
            self.segment_end = None;
        }
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let offset = self.pos;
        if self.data.len() - offset < RECORD_HEADER_LEN {
            return Err(corrupt_dump!(offset, "truncated record header"));
        }
        let mut cursor = Cursor::new(self.data, offset, self.id_size);
        let tag = cursor.read_u8()?;
        let _time = cursor.read_u32()?;
        let length = cursor.read_u32()? as usize;
        let body = cursor.pos();
        let available = self.data.len() - body;
        if length > available {
            return Err(corrupt_dump!(
                offset,
                "record {:#04x} declares {} bytes but only {} remain",
                tag,
                length,
                available
            ));
        }
        let kind = RecordKind::from_tag(tag);
        if kind == RecordKind::HeapDumpSegment {
            self.segment_end = Some(body + length);
            self.pos = body;
        } else {
            if let RecordKind::Other(_) = kind {
                trace!("Skipping unknown record {:#04x} at {:#x}", tag, offset);
            }
            self.pos = body + length;
        }
        Ok(Some(RawRecord {
            kind,
            tag,
            offset: offset as u64,
            body: body as u64,
            length: length as u64,
        }))
    }

    fn next_sub_record(&mut self, end: usize) -> Result<RawRecord> {
        let offset = self.pos;
        let id = self.id_size as usize;
        let mut cursor = Cursor::new(&self.data[..end], offset, self.id_size);
        let tag = cursor.read_u8()?;
        let body = cursor.pos();
        let kind = if let Some(root) = GcRootKind::from_sub_tag(tag) {
            cursor.skip(id + root.trailer_len(self.id_size))?;
            RecordKind::GcRoot(root)
        } else {
            match tag {
                SUB_CLASS_DUMP => {
                    skip_class_dump(&mut cursor)?;
                    RecordKind::ClassDump
                }
                SUB_INSTANCE_DUMP => {
                    cursor.skip(id + 4 + id)?;
                    let len = cursor.read_u32()? as usize;
                    cursor.skip(len)?;
                    RecordKind::InstanceDump
                }
                SUB_OBJECT_ARRAY_DUMP => {
                    cursor.skip(id + 4)?;
                    let count = cursor.read_u32()? as usize;
                    cursor.skip(id)?;
                    cursor.skip(count * id)?;
                    RecordKind::ObjectArrayDump
                }
                SUB_PRIMITIVE_ARRAY_DUMP | SUB_PRIMITIVE_ARRAY_NODATA => {
                    cursor.skip(id + 4)?;
                    let count = cursor.read_u32()? as usize;
                    let ty = read_basic_type(&mut cursor)?;
                    if tag == SUB_PRIMITIVE_ARRAY_DUMP {
                        cursor.skip(count * ty.size(self.id_size))?;
                    }
                    RecordKind::PrimitiveArrayDump
                }
                SUB_HEAP_DUMP_INFO => {
                    cursor.skip(4 + id)?;
                    RecordKind::HeapDumpInfo
                }
                _ => {
                    return Err(corrupt_dump!(
                        offset,
                        "unknown heap dump sub-record {:#04x}",
                        tag
                    ))
                }
            }
        };
        self.pos = cursor.pos();
        Ok(RawRecord {
            kind,
            tag,
            offset: offset as u64,
            body: body as u64,
            length: (self.pos - body) as u64,
        })
    }
}

impl Iterator for Records<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

pub(crate) fn read_basic_type(cursor: &mut Cursor) -> Result<BasicType> {
    let pos = cursor.pos();
    let code = cursor.read_u8()?;
    BasicType::from_code(code).ok_or_else(|| corrupt_dump!(pos, "unknown basic type {}", code))
}

fn skip_class_dump(cursor: &mut Cursor) -> Result<()> {
    let id = cursor.id_size() as usize;
    // class, stack serial, super, loader, signers, protection domain, 2 reserved, instance size
    cursor.skip(id + 4 + 6 * id + 4)?;
    let constants = cursor.read_u16()?;
    for _ in 0..constants {
        cursor.skip(2)?;
        let ty = read_basic_type(cursor)?;
        cursor.skip(ty.size(cursor.id_size()))?;
    }
    let statics = cursor.read_u16()?;
    for _ in 0..statics {
        cursor.skip(id)?;
        let ty = read_basic_type(cursor)?;
        cursor.skip(ty.size(cursor.id_size()))?;
    }
    let fields = cursor.read_u16()?;
    cursor.skip(fields as usize * (id + 1))
}
