use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterError {
    EndOfBuffer,
    LabelTooLong,
}

impl Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfBuffer => write!(f, "writing out of buffer"),
            Self::LabelTooLong => write!(f, "single label too long when writing"),
        }
    }
}

impl std::error::Error for WriterError {}

impl From<WriterError> for std::io::Error {
    fn from(value: WriterError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, value.to_string())
    }
}

/// Write cursor over a caller-provided scratch slice.
///
/// Outbound queries are encoded into the buffer the caller handed to `send`,
/// so running out of space is reported instead of growing.
#[derive(Debug)]
pub struct PacketWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PacketWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes written so far
    pub fn pos(&self) -> usize {
        self.pos
    }

    fn write(&mut self, val: u8) -> Result<(), WriterError> {
        if self.pos >= self.buf.len() {
            return Err(WriterError::EndOfBuffer);
        }
        self.buf[self.pos] = val;
        self.pos += 1;
        Ok(())
    }

    pub fn write_u8(&mut self, val: u8) -> Result<(), WriterError> {
        self.write(val)?;

        Ok(())
    }

    pub fn write_u16(&mut self, val: u16) -> Result<(), WriterError> {
        self.write((val >> 8) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    pub fn write_u32(&mut self, val: u32) -> Result<(), WriterError> {
        self.write(((val >> 24) & 0xFF) as u8)?;
        self.write(((val >> 16) & 0xFF) as u8)?;
        self.write(((val >> 8) & 0xFF) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn set(&mut self, pos: usize, val: u8) -> Result<(), WriterError> {
        if pos >= self.buf.len() {
            return Err(WriterError::EndOfBuffer);
        }
        self.buf[pos] = val;

        Ok(())
    }

    /// Back-patch a length field written earlier
    pub fn set_u16(&mut self, pos: usize, val: u16) -> Result<(), WriterError> {
        self.set(pos, (val >> 8) as u8)?;
        self.set(pos + 1, (val & 0xFF) as u8)?;

        Ok(())
    }

    /// Write a dotted name as length-prefixed labels plus the root label.
    /// A trailing dot is accepted and ignored.
    pub fn write_name(&mut self, name: &str) -> Result<(), WriterError> {
        for label in name.trim_end_matches('.').split('.') {
            if label.is_empty() {
                continue;
            }
            let len = label.len();
            if len > 0x3f {
                return Err(WriterError::LabelTooLong);
            }

            self.write_u8(len as u8)?;
            for b in label.as_bytes() {
                self.write_u8(*b)?;
            }
        }

        self.write_u8(0)?;

        Ok(())
    }
}
