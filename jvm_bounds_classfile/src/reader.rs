//! Big-endian byte cursor.

use crate::error::{ClassFileError, Result};

/// Cursor over a byte slice that reads the big-endian integers used by the
/// class-file format and by method bytecode.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Takes the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ClassFileError::UnexpectedEof {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.array()?))
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    /// Skips to the next multiple of four, as `tableswitch` and
    /// `lookupswitch` require.
    pub fn align4(&mut self) -> Result<()> {
        let padding = (4 - self.pos % 4) % 4;
        self.skip(padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian() {
        let mut reader = Reader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0xFF, 0xFE]);
        assert_eq!(reader.u32().unwrap(), 0xCAFE_BABE);
        assert_eq!(reader.i16().unwrap(), -2);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_eof_reports_missing_bytes() {
        let mut reader = Reader::new(&[0x01]);
        let err = reader.u32().unwrap_err();
        assert_eq!(
            err,
            ClassFileError::UnexpectedEof {
                offset: 0,
                needed: 3
            }
        );
    }

    #[test]
    fn test_align4() {
        let mut reader = Reader::new(&[0u8; 8]);
        reader.u8().unwrap();
        reader.align4().unwrap();
        assert_eq!(reader.position(), 4);
        reader.align4().unwrap();
        assert_eq!(reader.position(), 4);
    }
}
