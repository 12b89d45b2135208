use crate::error::DecodeError;

/// Bounds-checked reader over a borrowed byte buffer.
///
/// Every read either advances the offset or fails with
/// [`DecodeError::TruncatedStream`]; the offset never passes the end of the
/// buffer. `base` is added to offsets reported in errors so a cursor over a
/// track chunk still points into the whole file.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
    base: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        ByteCursor {
            data,
            offset: 0,
            base,
        }
    }

    /// Absolute position of the next byte.
    #[inline]
    pub fn position(&self) -> usize {
        self.base + self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::TruncatedStream {
            offset: self.position(),
            needed,
            available: self.remaining(),
        }
    }

    /// Look at the next byte without consuming it.
    #[inline]
    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.data
            .get(self.offset)
            .copied()
            .ok_or_else(|| self.truncated(1))
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek_u8()?;
        self.offset += 1;
        Ok(byte)
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_tag(&mut self) -> Result<[u8; 4], DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn read_u16_be(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// 24-bit big-endian value, as used by the tempo meta event.
    pub fn read_u24_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(3)?;
        Ok((u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Decode a variable-length quantity: 7 bits per byte, most significant
    /// group first, high bit set on every byte but the last.
    pub fn read_var_len(&mut self) -> Result<u32, DecodeError> {
        let mut result = 0u32;
        loop {
            let byte = self.read_u8()?;
            result = (result << 7) | u32::from(byte & 0x7F);
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
        }
    }
}
