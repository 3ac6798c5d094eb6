use crate::constants::*;

/// Parameters of the shallow size model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeSettings {
    pub header: u64,
    pub array_length: u64,
    pub alignment: u64,
    pub id_size: u64,
}

impl SizeSettings {
    pub fn for_id_size(id_size: u8) -> SizeSettings {
        SizeSettings {
            header: HEADER_WORDS * id_size as u64,
            array_length: ARRAY_LENGTH_BYTES,
            alignment: OBJECT_ALIGNMENT,
            id_size: id_size as u64,
        }
    }

    pub fn align(&self, size: u64) -> u64 {
        if self.alignment <= 1 {
            return size;
        }
        (size + self.alignment - 1) / self.alignment * self.alignment
    }

    /// `data` is the number of field bytes in the instance record.
    pub fn instance(&self, data: u64) -> u64 {
        self.align(self.header + data)
    }

    pub fn array(&self, length: u64, element_size: u64) -> u64 {
        self.align(self.header + self.array_length + length * element_size)
    }
}
