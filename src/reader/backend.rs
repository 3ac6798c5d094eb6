//! Byte sources a dump can be read from.

use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::constants::LOG_BYTES_IN_MBYTE;
use crate::error::corrupt_dump;
use crate::Result;

/// Read-only, random-access view of the raw dump bytes.
pub trait Backend: Send + Sync {
    fn data(&self) -> &[u8];

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(&self.data()[offset..end]),
            _ => Err(corrupt_dump!(
                offset,
                "read of {} bytes past the end of the dump ({} bytes)",
                len,
                self.len()
            )),
        }
    }
}

/// A dump held in memory, used for compressed dumps and synthetic ones.
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A memory-mapped dump file.
pub struct Physical {
    data: Mmap,
}

impl Physical {
    pub fn new(path: &Path) -> Result<Physical> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and dumps are not modified while analysed.
        let data = unsafe { Mmap::map(&file)? };
        Ok(Physical { data })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Opens `path`, decompressing `.zst` dumps into memory and mapping everything else.
pub fn open_backend(path: &Path) -> Result<Box<dyn Backend>> {
    if path.extension().is_some_and(|ext| ext == "zst") {
        let file = File::open(path)?;
        let mut reader = zstd::Decoder::new(file)?;
        let mut buf = vec![];
        reader.read_to_end(&mut buf)?;
        debug!(
            "Decompressed {} into {} MB",
            path.display(),
            buf.len() >> LOG_BYTES_IN_MBYTE
        );
        Ok(Box::new(Memory::new(buf)))
    } else {
        Ok(Box::new(Physical::new(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_data_slice_bounds() {
        let memory = Memory::new(vec![1, 2, 3, 4]);
        assert_eq!(memory.data_slice(1, 2).unwrap(), &[2, 3]);
        assert_eq!(memory.data_slice(0, 4).unwrap().len(), 4);
        assert!(memory.data_slice(3, 2).is_err());
        assert!(memory.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_open_compressed_dump() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("heapwalk-backend-{}.hprof.zst", std::process::id()));
        let compressed = zstd::encode_all(&b"JAVA PROFILE 1.0.2\0"[..], 0).unwrap();
        File::create(&path).unwrap().write_all(&compressed).unwrap();
        let backend = open_backend(&path).unwrap();
        assert_eq!(backend.data(), b"JAVA PROFILE 1.0.2\0");
        std::fs::remove_file(&path).unwrap();
    }
}
