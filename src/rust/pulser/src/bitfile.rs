// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Header of Xilinx `.bit` firmware files.

use std::path::Path;

use crate::{Error, Result};

const MAGIC: [u8; 13] = [
    0x00, 0x09, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x00, 0x00, 0x01,
];

/// Metadata logged before a firmware image is handed to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitfileInfo {
    pub design: String,
    pub part: String,
    pub date: String,
    pub time: String,
    pub bitstream_length: usize,
    /// Hex MD5 digest of the whole file.
    pub md5: String,
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl Reader<'_> {
    fn take(&mut self, length: usize) -> Result<&[u8]> {
        let end = self.position + length;
        let slice = self
            .bytes
            .get(self.position..end)
            .ok_or_else(|| invalid("header is truncated"))?;
        self.position = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<usize> {
        let bytes = self.take(2)?;
        Ok(usize::from(u16::from_be_bytes([bytes[0], bytes[1]])))
    }

    fn u32(&mut self) -> Result<usize> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    fn field(&mut self, key: u8) -> Result<String> {
        if self.take(1)?[0] != key {
            return Err(invalid(&format!("expected field '{}'", char::from(key))));
        }
        let length = self.u16()?;
        let text = self.take(length)?;
        let text = text.strip_suffix(&[0]).unwrap_or(text);
        Ok(String::from_utf8_lossy(text).into_owned())
    }
}

fn invalid(message: &str) -> Error {
    Error::Hardware(format!("Invalid bitfile: {message}"))
}

impl BitfileInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes, position: 0 };
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(invalid("unknown header"));
        }
        let design = reader.field(b'a')?;
        let part = reader.field(b'b')?;
        let date = reader.field(b'c')?;
        let time = reader.field(b'd')?;
        if reader.take(1)?[0] != b'e' {
            return Err(invalid("expected field 'e'"));
        }
        let bitstream_length = reader.u32()?;
        if bytes.len() - reader.position < bitstream_length {
            return Err(invalid("bitstream is truncated"));
        }
        Ok(BitfileInfo {
            design,
            part,
            date,
            time,
            bitstream_length,
            md5: format!("{:x}", md5::compute(bytes)),
        })
    }

    /// Read a bitfile; returns its metadata and the complete image.
    pub fn load(path: &Path) -> Result<(Self, Vec<u8>)> {
        let image = std::fs::read(path)?;
        Ok((Self::parse(&image)?, image))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn field(image: &mut Vec<u8>, key: u8, text: &str) {
        image.push(key);
        image.extend_from_slice(&((text.len() + 1) as u16).to_be_bytes());
        image.extend_from_slice(text.as_bytes());
        image.push(0);
    }

    pub(crate) fn bitfile(bitstream: &[u8]) -> Vec<u8> {
        let mut image = MAGIC.to_vec();
        field(&mut image, b'a', "pulser;UserID=0XFFFFFFFF");
        field(&mut image, b'b', "6slx150fgg484");
        field(&mut image, b'c', "2024/03/01");
        field(&mut image, b'd', "12:30:00");
        image.push(b'e');
        image.extend_from_slice(&(bitstream.len() as u32).to_be_bytes());
        image.extend_from_slice(bitstream);
        image
    }

    #[test]
    fn test_parse_header() {
        let image = bitfile(&[0xaa; 16]);
        let info = BitfileInfo::parse(&image).unwrap();
        assert_eq!(info.design, "pulser;UserID=0XFFFFFFFF");
        assert_eq!(info.part, "6slx150fgg484");
        assert_eq!(info.date, "2024/03/01");
        assert_eq!(info.time, "12:30:00");
        assert_eq!(info.bitstream_length, 16);
        assert_eq!(info.md5, format!("{:x}", md5::compute(&image)));
        assert_eq!(info.md5.len(), 32);
    }

    #[test]
    fn test_rejects_bad_images() {
        assert!(BitfileInfo::parse(b"not a bitfile").is_err());
        let image = bitfile(&[0xaa; 16]);
        assert!(BitfileInfo::parse(&image[..image.len() - 1]).is_err());
        assert!(BitfileInfo::parse(&image[..20]).is_err());
    }
}
