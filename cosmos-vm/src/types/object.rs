use std::fmt::Debug;

use crate::{
    error::VmError,
    vmio::{context::SaveContext, tag::TagNode},
};

use super::value::Value;

/// 宿主应用持有的对象句柄（舰船、星球、界面控件等）。
/// 虚拟机只负责把成员访问转发给它。
pub trait ObjectValue: Debug + Send + Sync + 'static {
    fn type_name(&self) -> &str;

    #[allow(unused_variables)]
    fn to_string(&self, readable: bool) -> String {
        format!("#<{}>", self.type_name())
    }

    fn get_member(&self, name: &str) -> Result<Value, VmError> {
        Err(VmError::UnknownIdentifier(format!("{}.{}", self.type_name(), name)))
    }

    #[allow(unused_variables)]
    fn set_member(&self, name: &str, value: Value) -> Result<(), VmError> {
        Err(VmError::NotAssignable(format!("{}.{}", self.type_name(), name)))
    }

    #[allow(unused_variables)]
    fn store(&self, aux: &mut Vec<u8>, ctx: &mut dyn SaveContext) -> Result<TagNode, VmError> {
        Err(VmError::NotSerializable)
    }
}
