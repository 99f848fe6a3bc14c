use crate::error::ImageError;

/// A cursor over an in-memory `.vmb` buffer. Plays the role `fuel_types`'s
/// `Output`/deserialization helpers play for fixed transaction layouts,
/// adapted to our variable-length instruction/pool records.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ImageError> {
        if self.remaining() < n {
            return Err(ImageError::UnexpectedEof {
                offset: self.pos,
                expected: n,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ImageError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ImageError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ImageError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64, ImageError> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes(b.try_into().expect("8 bytes")))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ImageError> {
        self.take(n)
    }

    pub fn read_string(&mut self, len: usize) -> Result<String, ImageError> {
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Appends little-endian fields to the output buffer. Used by every pool
/// writer in `image.rs`; kept as free functions rather than a trait since,
/// unlike `fuel_types::canonical::Serialize`, every record here has a
/// different shape and no generic dispatch is needed.
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_name(out: &mut Vec<u8>, name: &str) -> Result<(), ImageError> {
    if name.len() > u8::MAX as usize {
        return Err(ImageError::LengthLimitExceeded);
    }
    write_u8(out, name.len() as u8);
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

pub fn write_string_entry(out: &mut Vec<u8>, s: &str) -> Result<(), ImageError> {
    if s.len() > u16::MAX as usize {
        return Err(ImageError::LengthLimitExceeded);
    }
    write_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}
