use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

use rustc_hash::FxHashMap;

use crate::error::VmError;

use super::{
    array::{ArrayData, ArrayRef},
    callable::Callable,
    object::ObjectValue,
};

/// 虚拟机中流动的唯一动态类型。
///
/// 基本类型不可变，按内容比较；可调用对象、数组与宿主对象是句柄，按身份比较。
/// `Clone` 只共享句柄；值跨越所有权边界时（闭包绑定、进程启动、写入全局变量）
/// 应使用 `clone_of`。
#[derive(Clone)]
pub enum Value {
    Null,
    Integer(i32),
    Boolean(bool),
    Float(f64),
    String(Arc<str>),
    Callable(Arc<dyn Callable>),
    Array(ArrayRef),
    Object(Arc<dyn ObjectValue>),
}

pub fn make_integer_value(value: i32) -> Value {
    Value::Integer(value)
}

pub fn make_boolean_value(value: bool) -> Value {
    Value::Boolean(value)
}

pub fn make_float_value(value: f64) -> Value {
    Value::Float(value)
}

pub fn make_string_value(value: impl AsRef<str>) -> Value {
    Value::String(Arc::from(value.as_ref()))
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Callable(_) => "callable",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// 条件跳转使用的真值，Null 返回 `None`。
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::String(s) => Some(!s.is_empty()),
            Value::Callable(_) | Value::Array(_) | Value::Object(_) => Some(true),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(*b as i32),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// 将值渲染为文本。
    ///
    /// # 参数
    /// - `readable`: 为真时输出脚本字面量形式（字符串带引号）
    ///
    /// # 返回
    /// 渲染后的字符串
    pub fn to_string(&self, readable: bool) -> String {
        match self {
            Value::Null => "Empty".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Boolean(b) => match (readable, *b) {
                (true, true) => "True".to_string(),
                (true, false) => "False".to_string(),
                (false, true) => "YES".to_string(),
                (false, false) => "NO".to_string(),
            },
            Value::Float(f) => format_float(*f),
            Value::String(s) if readable => quote_string(s),
            Value::String(s) => s.to_string(),
            Value::Callable(c) => c.to_string(readable),
            Value::Array(_) => "#<array>".to_string(),
            Value::Object(o) => o.to_string(readable),
        }
    }

    /// 生成独立副本。
    ///
    /// 数组逐元素复制，循环引用保持为循环而不展开；闭包得到自己的绑定参数列表。
    /// 基本类型与不可变句柄直接共享。
    pub fn clone_of(&self) -> Value {
        let mut copied = FxHashMap::default();
        self.clone_with(&mut copied)
    }

    fn clone_with(&self, copied: &mut FxHashMap<usize, ArrayRef>) -> Value {
        match self {
            Value::Array(array) => {
                if let Some(existing) = copied.get(&array.id()) {
                    return Value::Array(existing.clone());
                }
                let (dims, elements) = match array.read() {
                    Ok(data) => (data.dims().to_vec(), data.elements().to_vec()),
                    Err(_) => return Value::Array(array.clone()),
                };
                let copy = ArrayRef::new(ArrayData::from_parts(dims, Vec::new()));
                copied.insert(array.id(), copy.clone());
                let elements = elements.iter().map(|e| e.clone_with(copied)).collect();
                if let Ok(mut data) = copy.write() {
                    data.replace_elements(elements);
                }
                Value::Array(copy)
            }
            Value::Callable(c) => match c.deep_clone() {
                Some(copy) => Value::Callable(copy),
                None => Value::Callable(c.clone()),
            },
            other => other.clone(),
        }
    }

    pub(crate) fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Callable(a), Value::Callable(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }

    pub fn expect_integer(&self, what: &str) -> Result<i32, VmError> {
        self.as_integer()
            .ok_or_else(|| VmError::type_mismatch(format!("{} must be an integer, got {}", what, self.type_name())))
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Inf".to_string() } else { "-Inf".to_string() }
    } else {
        format!("{}", f)
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// 基本类型按内容相等，句柄按身份相等。Null 与任何值都不相等，包括它自己。
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.same_identity(other),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Integer(i) => write!(f, "Integer({})", i),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::String(s) => write!(f, "String({:?})", s),
            other => write!(f, "{}", other.to_string(true)),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        make_string_value(value)
    }
}
