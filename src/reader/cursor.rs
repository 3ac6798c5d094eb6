use crate::error::corrupt_dump;
use crate::Result;

/// Big-endian reader over the dump bytes that knows the identifier width.
///
/// Positions are absolute offsets into the dump so that errors and records
/// can refer back to them.
#[derive(Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    id_size: u8,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], pos: usize, id_size: u8) -> Cursor<'a> {
        Cursor { data, pos, id_size }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn id_size(&self) -> u8 {
        self.id_size
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(corrupt_dump!(
                self.pos,
                "unexpected end of dump reading {} bytes",
                len
            ));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N)?);
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_id(&mut self) -> Result<u64> {
        match self.id_size {
            4 => Ok(self.read_u32()? as u64),
            _ => self.read_u64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian() {
        let data = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xff];
        let mut cursor = Cursor::new(&data, 0, 4);
        assert_eq!(cursor.read_u16().unwrap(), 1);
        assert_eq!(cursor.read_u32().unwrap(), 2);
        assert_eq!(cursor.read_u8().unwrap(), 0xff);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_id_width() {
        let data = [0, 0, 0, 0, 0, 0, 0x10, 0x20];
        assert_eq!(Cursor::new(&data, 0, 8).read_id().unwrap(), 0x1020);
        assert_eq!(Cursor::new(&data, 4, 4).read_id().unwrap(), 0x1020);
    }

    #[test]
    fn test_overrun_reports_position() {
        let data = [0u8; 6];
        let mut cursor = Cursor::new(&data, 4, 8);
        match cursor.read_u32() {
            Err(crate::Error::CorruptDump { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("expected corrupt dump, got {:?}", other),
        }
    }
}
