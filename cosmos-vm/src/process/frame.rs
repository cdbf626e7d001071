use std::sync::Arc;

use crate::{bytecode::object::BytecodeObject, types::value::Value};

/// 由带捕获标志的 `Jump` 安装，由 `Uncatch` 或触发时移除。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    pub target: usize,
    pub stack_depth: usize,
}

/// 字节码对象的一次活动记录。
#[derive(Debug, Clone)]
pub struct Frame {
    pub(crate) bco: Arc<BytecodeObject>,
    pub(crate) pc: usize,
    pub(crate) locals: Vec<Value>,
    pub(crate) handlers: Vec<Handler>,
    pub(crate) want_result: bool,
    /// 进入该帧时的操作数栈高度。
    pub(crate) stack_base: usize,
}

impl Frame {
    pub fn bytecode(&self) -> &Arc<BytecodeObject> {
        &self.bco
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn locals(&self) -> &[Value] {
        &self.locals
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    pub fn want_result(&self) -> bool {
        self.want_result
    }

    pub fn stack_base(&self) -> usize {
        self.stack_base
    }

    pub fn format_context(&self) -> serde_json::Value {
        let locals: serde_json::Map<String, serde_json::Value> = self
            .bco
            .local_names()
            .iter()
            .zip(&self.locals)
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.to_string(true))))
            .collect();
        serde_json::json!({
            "function": self.bco.name(),
            "pc": self.pc,
            "line": self.bco.line_for_pc(self.pc.saturating_sub(1)),
            "handlers": self.handlers.len(),
            "locals": locals,
        })
    }
}
