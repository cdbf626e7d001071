use std::io::Write;

use crate::{error::VmError, types::value::Value};

use super::{charset::Charset, context::SaveContext, real::encode_real, tag::TagNode};

/// 把值序列化为标签节点与辅助字节，与 `ValueLoader` 互逆。
pub struct SaveVisitor<'a> {
    charset: &'a dyn Charset,
    ctx: &'a mut dyn SaveContext,
}

impl<'a> SaveVisitor<'a> {
    pub fn new(charset: &'a dyn Charset, ctx: &'a mut dyn SaveContext) -> Self {
        SaveVisitor { charset, ctx }
    }

    /// 编码一个值，辅助数据追加到 `aux`。
    ///
    /// # 返回
    /// 值的标签节点
    ///
    /// # 错误
    /// 字节码以外的可调用对象返回 `NotSerializable`；宿主对象与上下文的错误原样返回
    pub fn save(&mut self, value: &Value, aux: &mut Vec<u8>) -> Result<TagNode, VmError> {
        Ok(match value {
            Value::Null => TagNode::new(TagNode::TAG_NULL, 0),
            Value::Integer(i) => TagNode::new(TagNode::TAG_INTEGER, *i as u32),
            Value::Boolean(b) => TagNode::new(TagNode::TAG_BOOLEAN, *b as u32),
            Value::Float(f) => encode_real(*f),
            Value::String(s) => {
                let bytes = self.charset.encode(s);
                if bytes.is_empty() {
                    TagNode::new(TagNode::TAG_STRING, 0)
                } else if bytes.len() <= u8::MAX as usize {
                    aux.push(bytes.len() as u8);
                    aux.extend_from_slice(&bytes);
                    TagNode::new(TagNode::TAG_STRING, bytes.len() as u32 + 1)
                } else {
                    let length = u32::try_from(bytes.len())
                        .map_err(|_| VmError::RangeError("string too long to save".into()))?;
                    aux.extend_from_slice(&bytes);
                    TagNode::new(TagNode::TAG_LONG_STRING, length)
                }
            }
            Value::Callable(c) => match c.as_bytecode() {
                Some(bco) => TagNode::new(TagNode::TAG_BYTECODE, self.ctx.add_bytecode(bco)?),
                None => return Err(VmError::NotSerializable),
            },
            Value::Array(array) => TagNode::new(TagNode::TAG_ARRAY, self.ctx.add_array(array)?),
            Value::Object(object) => object.store(aux, self.ctx)?,
        })
    }

    /// 先写出 `values` 的全部标签节点，再写出它们的辅助数据。
    pub fn save_segment(&mut self, writer: &mut impl Write, values: &[Value]) -> Result<(), VmError> {
        let mut aux = Vec::new();
        let mut nodes = Vec::with_capacity(values.len() * TagNode::SIZE);
        for value in values {
            nodes.extend_from_slice(&self.save(value, &mut aux)?.to_bytes());
        }
        writer
            .write_all(&nodes)
            .and_then(|_| writer.write_all(&aux))
            .map_err(|e| VmError::format(format!("write failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        types::{callable::NativeFunction, value::make_string_value},
        vmio::{charset::Utf8Charset, context::NullSaveContext},
    };

    fn save(value: &Value) -> Result<(TagNode, Vec<u8>), VmError> {
        let mut ctx = NullSaveContext;
        let mut aux = Vec::new();
        let node = SaveVisitor::new(&Utf8Charset, &mut ctx).save(value, &mut aux)?;
        Ok((node, aux))
    }

    #[test]
    fn test_strings() {
        assert_eq!(save(&make_string_value("")).unwrap(), (TagNode::new(0x0400, 0), vec![]));
        assert_eq!(
            save(&make_string_value("XYZ")).unwrap(),
            (TagNode::new(0x0400, 4), vec![3, b'X', b'Y', b'Z'])
        );
        let long = "x".repeat(300);
        let (node, aux) = save(&make_string_value(&long)).unwrap();
        assert_eq!(node, TagNode::new(0x0600, 300));
        assert_eq!(aux.len(), 300);
    }

    #[test]
    fn test_not_serializable() {
        fn nothing(_: &[Value]) -> Result<Value, VmError> {
            Ok(Value::Null)
        }
        let native = Value::Callable(Arc::new(NativeFunction::new("NOTHING", 0, Some(0), nothing)));
        assert_eq!(save(&native), Err(VmError::NotSerializable));
        let array = Value::Array(crate::types::array::ArrayRef::new(
            crate::types::array::ArrayData::new(vec![1]).unwrap(),
        ));
        assert_eq!(save(&array), Err(VmError::NotSerializable));
    }
}
