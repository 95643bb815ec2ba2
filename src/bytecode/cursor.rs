use crate::error::DecodeError;

/// A bounds-checked read position inside a flat instruction buffer.
#[derive(Debug, Clone, Copy)]
pub struct InstructionCursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> InstructionCursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    pub fn at(buffer: &'a [u8], offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        self.buffer.get(self.offset..).unwrap_or(&[])
    }

    fn check(&self, needed: usize) -> Result<(), DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::OutOfBounds {
                offset: self.offset,
                needed,
                len: self.buffer.len(),
            });
        }
        Ok(())
    }

    pub fn advance(&mut self, n: usize) -> Result<(), DecodeError> {
        self.check(n)?;
        self.offset += n;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.check(n)?;
        let bytes = &self.buffer[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.read_bytes(4)?);
        Ok(i32::from_le_bytes(raw))
    }

    pub fn read_f64_le(&mut self) -> Result<f64, DecodeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read_bytes(8)?);
        Ok(f64::from_le_bytes(raw))
    }

    /// Reads a `u16` little-endian length prefix followed by that many UTF-8 bytes.
    pub fn read_str(&mut self) -> Result<&'a str, DecodeError> {
        let start = self.offset;
        let len = self.read_u16_le()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }
}
