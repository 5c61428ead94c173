use crate::error::ClassFormatError;

/// Big-endian reader over a borrowed byte slice that reports truncation as
/// [`ClassFormatError::Truncated`] instead of panicking.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ClassFormatError> {
        if self.remaining() < n {
            return Err(ClassFormatError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ClassFormatError> {
        self.take(n).map(|_| ())
    }

    pub fn u1(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.take(1)?[0])
    }

    pub fn u2(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u4(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i1(&mut self) -> Result<i8, ClassFormatError> {
        Ok(self.u1()? as i8)
    }

    pub fn i2(&mut self) -> Result<i16, ClassFormatError> {
        Ok(self.u2()? as i16)
    }

    pub fn i4(&mut self) -> Result<i32, ClassFormatError> {
        Ok(self.u4()? as i32)
    }

    pub fn u8(&mut self) -> Result<u64, ClassFormatError> {
        let hi = u64::from(self.u4()?);
        let lo = u64::from(self.u4()?);
        Ok((hi << 32) | lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_values() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34, 0xFF];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.u4().unwrap(), 0xCAFEBABE);
        assert_eq!(c.u2().unwrap(), 52);
        assert_eq!(c.i1().unwrap(), -1);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn truncation_is_an_error() {
        let data = [0x00, 0x01];
        let mut c = ByteCursor::new(&data);
        let err = c.u4().unwrap_err();
        assert_eq!(
            err,
            ClassFormatError::Truncated {
                offset: 0,
                needed: 2
            }
        );
        assert_eq!(c.position(), 0);
    }
}
