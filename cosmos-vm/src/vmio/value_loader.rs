//! 从标签流反序列化值。
//!
//! 一个段（segment）的布局：先是 `count` 个 6 字节的 `TagNode`，
//! 然后按顺序是各个值的附加数据（目前只有字符串使用）。

use std::io::Read;

use crate::{
    error::VmError,
    types::{
        callable::SubroutineValue,
        value::{make_string_value, Value},
    },
};

use super::{charset::Charset, context::LoadContext, real::decode_real, tag::TagNode};

pub struct ValueLoader<'a> {
    charset: &'a dyn Charset,
    ctx: &'a mut dyn LoadContext,
}

impl<'a> ValueLoader<'a> {
    pub fn new(charset: &'a dyn Charset, ctx: &'a mut dyn LoadContext) -> Self {
        ValueLoader { charset, ctx }
    }

    /// 解码一个值。
    ///
    /// # 参数
    /// - `node`: 值的标签节点
    /// - `aux`: 辅助数据的来源
    ///
    /// # 错误
    /// 标签未知或辅助数据不足时返回 `FileFormat`；引用无法解析时返回上下文的错误
    pub fn load_value(&mut self, node: TagNode, aux: &mut impl Read) -> Result<Value, VmError> {
        if node.is_real() {
            return Ok(Value::Float(decode_real(node)));
        }
        match node.tag {
            TagNode::TAG_NULL => Ok(Value::Null),
            TagNode::TAG_INTEGER => Ok(Value::Integer(node.value as i32)),
            TagNode::TAG_BOOLEAN => Ok(Value::Boolean(node.value != 0)),
            TagNode::TAG_FLOAT32 => Ok(Value::Float(f32::from_bits(node.value) as f64)),
            TagNode::TAG_STRING => {
                if node.value == 0 {
                    return Ok(make_string_value(""));
                }
                let mut length = [0u8; 1];
                aux.read_exact(&mut length)?;
                self.read_string(aux, length[0] as usize)
            }
            TagNode::TAG_LONG_STRING => self.read_string(aux, node.value as usize),
            TagNode::TAG_BYTECODE => {
                let bco = self.ctx.load_bytecode(node.value)?;
                Ok(SubroutineValue::new_value(bco))
            }
            TagNode::TAG_ARRAY => Ok(Value::Array(self.ctx.load_array(node.value)?)),
            tag => Err(VmError::format(format!("unknown value tag 0x{:04X}", tag))),
        }
    }

    fn read_string(&mut self, aux: &mut impl Read, length: usize) -> Result<Value, VmError> {
        let mut bytes = Vec::new();
        (&mut *aux).take(length as u64).read_to_end(&mut bytes)?;
        if bytes.len() != length {
            return Err(VmError::format("string data truncated"));
        }
        Ok(make_string_value(self.charset.decode(&bytes)))
    }

    /// 读取 `count` 个值写入 `segment[offset..offset + count]`，必要时扩展 `segment`。
    /// 只有全部值都解码成功才会写入。
    pub fn load_segment(
        &mut self,
        reader: &mut impl Read,
        segment: &mut Vec<Value>,
        offset: usize,
        count: usize,
    ) -> Result<(), VmError> {
        let nodes = (0..count)
            .map(|_| TagNode::read_from(reader))
            .collect::<Result<Vec<_>, _>>()?;
        let values = nodes
            .into_iter()
            .map(|node| self.load_value(node, reader))
            .collect::<Result<Vec<_>, _>>()?;
        if segment.len() < offset + count {
            segment.resize(offset + count, Value::Null);
        }
        for (slot, value) in segment[offset..].iter_mut().zip(values) {
            *slot = value;
        }
        Ok(())
    }
}
