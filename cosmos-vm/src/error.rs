//! Cosmos 虚拟机错误类型。
//!
//! - `VmError`：指令执行、调用、编解码过程中产生的错误。
//! - `SchedulerError`：调度器 API 的误用（进程不存在、状态不允许）。

use thiserror::Error;

use crate::process::{ProcessId, ProcessState};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("Not assignable: {0}")]
    NotAssignable(String),
    #[error("Value is not serializable")]
    NotSerializable,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("Index out of range: {0}")]
    RangeError(String),
    #[error("Stack overflow: {0}")]
    StackOverflow(String),
    /// 由 `Throw` 指令抛出，显示为抛出的原文。
    #[error("{0}")]
    Thrown(String),
    #[error("Internal VM fault: {0}")]
    VmFault(String),
    #[error("Invalid file format: {0}")]
    FileFormat(String),
}

impl VmError {
    /// 虚拟机故障与格式错误表示不变量被破坏，脚本的处理器不会捕获到它们。
    pub fn is_catchable(&self) -> bool {
        !matches!(self, VmError::VmFault(_) | VmError::FileFormat(_))
    }

    pub(crate) fn type_mismatch(what: impl Into<String>) -> Self {
        VmError::TypeMismatch(what.into())
    }

    pub(crate) fn fault(what: impl Into<String>) -> Self {
        VmError::VmFault(what.into())
    }

    pub(crate) fn format(what: impl Into<String>) -> Self {
        VmError::FileFormat(what.into())
    }
}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => VmError::FileFormat("unexpected end of data".into()),
            _ => VmError::FileFormat(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Process {0} not found")]
    NotFound(ProcessId),
    #[error("Process {id} is {state}, operation not allowed")]
    InvalidState { id: ProcessId, state: ProcessState },
}
