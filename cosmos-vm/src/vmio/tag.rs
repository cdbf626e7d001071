use std::io::{Read, Write};

use crate::error::VmError;

/// 单个序列化值的定长部分：16 位标签加 32 位载荷，小端共六字节。
/// 字符串另带辅助字节。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagNode {
    pub tag: u16,
    pub value: u32,
}

impl TagNode {
    pub const TAG_NULL: u16 = 0x0100;
    pub const TAG_INTEGER: u16 = 0x0200;
    pub const TAG_BOOLEAN: u16 = 0x0300;
    pub const TAG_STRING: u16 = 0x0400;
    pub const TAG_FLOAT32: u16 = 0x0500;
    pub const TAG_LONG_STRING: u16 = 0x0600;
    pub const TAG_BYTECODE: u16 = 0x0700;
    pub const TAG_ARRAY: u16 = 0x0800;

    pub const SIZE: usize = 6;

    pub fn new(tag: u16, value: u32) -> Self {
        TagNode { tag, value }
    }

    /// 旧式实数以低字节为指数；全零表示实数 0.0。
    pub fn is_real(&self) -> bool {
        self.tag & 0xFF != 0 || self.tag == 0
    }

    pub fn to_bytes(self) -> [u8; 6] {
        let tag = self.tag.to_le_bytes();
        let value = self.value.to_le_bytes();
        [tag[0], tag[1], value[0], value[1], value[2], value[3]]
    }

    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        TagNode {
            tag: u16::from_le_bytes([bytes[0], bytes[1]]),
            value: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
        }
    }

    pub fn read_from(reader: &mut impl Read) -> Result<Self, VmError> {
        let mut bytes = [0u8; 6];
        reader.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn write_to(self, writer: &mut impl Write) -> Result<(), VmError> {
        writer
            .write_all(&self.to_bytes())
            .map_err(|e| VmError::format(format!("write failed: {}", e)))
    }
}
