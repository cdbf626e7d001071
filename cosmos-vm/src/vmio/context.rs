use std::sync::Arc;

use crate::{bytecode::object::BytecodeObject, error::VmError, types::array::ArrayRef};

/// 保存时为标签流中仅以引用出现的值分配编号。
pub trait SaveContext {
    fn add_bytecode(&mut self, bco: &Arc<BytecodeObject>) -> Result<u32, VmError>;
    fn add_array(&mut self, array: &ArrayRef) -> Result<u32, VmError>;
}

/// 加载时把标签流中的编号解析回对象。
pub trait LoadContext {
    fn load_bytecode(&mut self, id: u32) -> Result<Arc<BytecodeObject>, VmError>;
    fn load_array(&mut self, id: u32) -> Result<ArrayRef, VmError>;
}

/// 只保存普通值。
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSaveContext;

impl SaveContext for NullSaveContext {
    fn add_bytecode(&mut self, _bco: &Arc<BytecodeObject>) -> Result<u32, VmError> {
        Err(VmError::NotSerializable)
    }

    fn add_array(&mut self, _array: &ArrayRef) -> Result<u32, VmError> {
        Err(VmError::NotSerializable)
    }
}

/// 只加载普通值。
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLoadContext;

impl LoadContext for NullLoadContext {
    fn load_bytecode(&mut self, id: u32) -> Result<Arc<BytecodeObject>, VmError> {
        Err(VmError::format(format!("unexpected bytecode reference {}", id)))
    }

    fn load_array(&mut self, id: u32) -> Result<ArrayRef, VmError> {
        Err(VmError::format(format!("unexpected array reference {}", id)))
    }
}
