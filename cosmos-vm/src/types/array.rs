use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::VmError;

use super::value::Value;

/// 单个数组的元素个数上限。
const MAX_ARRAY_ELEMENTS: usize = 10_000_000;

/// 多维数组，按行优先存储。
#[derive(Debug, Clone, Default)]
pub struct ArrayData {
    dims: Vec<usize>,
    elements: Vec<Value>,
}

impl ArrayData {
    pub fn new(dims: Vec<usize>) -> Result<Self, VmError> {
        if dims.is_empty() {
            return Err(VmError::RangeError("array needs at least one dimension".into()));
        }
        let mut total: usize = 1;
        for dim in &dims {
            total = total
                .checked_mul(*dim)
                .filter(|t| *t <= MAX_ARRAY_ELEMENTS)
                .ok_or_else(|| VmError::RangeError(format!("array dimensions {:?} too large", dims)))?;
        }
        Ok(ArrayData {
            dims,
            elements: vec![Value::Null; total],
        })
    }

    /// 由已有数据构造；元素不足的部分补 Null，多余的部分截断。
    pub(crate) fn from_parts(dims: Vec<usize>, mut elements: Vec<Value>) -> Self {
        let total = dims.iter().product();
        elements.resize(total, Value::Null);
        ArrayData { dims, elements }
    }

    pub(crate) fn replace_elements(&mut self, mut elements: Vec<Value>) {
        elements.resize(self.elements.len(), Value::Null);
        self.elements = elements;
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// 查询维度信息。
    ///
    /// # 参数
    /// - `which`: 0 表示维数；n 表示第 n 维（从 1 开始）
    ///
    /// # 返回
    /// 维数或该维的大小，超出最后一维时为 0
    pub fn dimension(&self, which: usize) -> usize {
        if which == 0 {
            self.dims.len()
        } else {
            self.dims.get(which - 1).copied().unwrap_or(0)
        }
    }

    /// 计算线性下标；任一下标为 Null 时返回 `None`。
    fn linear_index(&self, indexes: &[Value]) -> Result<Option<usize>, VmError> {
        if indexes.len() != self.dims.len() {
            return Err(VmError::type_mismatch(format!(
                "array has {} dimensions, {} indexes given",
                self.dims.len(),
                indexes.len()
            )));
        }
        let mut index = 0usize;
        for (value, dim) in indexes.iter().zip(&self.dims) {
            if value.is_null() {
                return Ok(None);
            }
            let i = value.expect_integer("array index")?;
            if i < 0 || i as usize >= *dim {
                return Err(VmError::RangeError(format!("{} not in 0..{}", i, dim)));
            }
            index = index * dim + i as usize;
        }
        Ok(Some(index))
    }

    pub fn get(&self, indexes: &[Value]) -> Result<Value, VmError> {
        Ok(match self.linear_index(indexes)? {
            Some(i) => self.elements[i].clone(),
            None => Value::Null,
        })
    }

    pub fn set(&mut self, indexes: &[Value], value: Value) -> Result<(), VmError> {
        match self.linear_index(indexes)? {
            Some(i) => {
                self.elements[i] = value;
                Ok(())
            }
            None => Err(VmError::type_mismatch("array index must not be empty")),
        }
    }
}

/// 数组的共享句柄。
///
/// 通过任一句柄写入的元素对同一数组的所有句柄可见；`Value::clone_of` 会生成独立的数组。
#[derive(Debug, Clone)]
pub struct ArrayRef(Arc<RwLock<ArrayData>>);

impl ArrayRef {
    pub fn new(data: ArrayData) -> Self {
        ArrayRef(Arc::new(RwLock::new(data)))
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, ArrayData>, VmError> {
        self.0
            .read()
            .map_err(|_| VmError::fault("array lock poisoned at `read`"))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, ArrayData>, VmError> {
        self.0
            .write()
            .map_err(|_| VmError::fault("array lock poisoned at `write`"))
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// 基于地址的身份标识，只要还有句柄存活就保持不变。
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(values: &[i32]) -> Vec<Value> {
        values.iter().map(|v| Value::Integer(*v)).collect()
    }

    #[test]
    fn test_row_major_access() {
        let mut array = ArrayData::new(vec![2, 3]).unwrap();
        array.set(&idx(&[1, 2]), Value::Integer(12)).unwrap();
        assert_eq!(array.elements()[5], Value::Integer(12));
        assert_eq!(array.get(&idx(&[1, 2])).unwrap(), Value::Integer(12));
        assert!(array.get(&idx(&[0, 0])).unwrap().is_null());
        assert_eq!(array.dimension(0), 2);
        assert_eq!(array.dimension(2), 3);
        assert_eq!(array.dimension(3), 0);
    }

    #[test]
    fn test_index_errors() {
        let mut array = ArrayData::new(vec![4]).unwrap();
        assert!(matches!(array.get(&idx(&[4])), Err(VmError::RangeError(_))));
        assert!(matches!(array.get(&idx(&[-1])), Err(VmError::RangeError(_))));
        assert!(matches!(array.get(&idx(&[1, 1])), Err(VmError::TypeMismatch(_))));
        assert!(array.get(&[Value::Null]).unwrap().is_null());
        assert!(array.set(&[Value::Null], Value::Integer(1)).is_err());
        assert!(ArrayData::new(vec![100_000, 100_000]).is_err());
        assert!(ArrayData::new(vec![]).is_err());
    }
}
