//! 可调用值：字节码子程序、宿主原生函数，以及（在 `closure` 中的）闭包。
//!
//! 所有可调用对象共享同一个 `Callable` 接口，调用时直接操作目标进程：
//! 子程序压入新的调用帧而不是递归执行，原生函数立即计算结果。

use std::sync::Arc;

use crate::{bytecode::object::BytecodeObject, error::VmError, process::Process};

use super::value::Value;

pub trait Callable: Send + Sync + 'static {
    /// 在 `process` 上调用。
    ///
    /// # 参数
    /// - `process`: 发起调用的进程
    /// - `args`: 实参，绑定参数已在最前
    /// - `want_result`: 为真时调用完成后操作数栈上恰好多出一个值
    ///
    /// # 错误
    /// 参数个数不符或调用本身失败时返回对应的 `VmError`
    fn call(&self, process: &mut Process, args: Vec<Value>, want_result: bool) -> Result<(), VmError>;

    /// 过程（语句）返回真，函数返回假。
    fn is_procedure(&self) -> bool;

    /// 数组风格的维度查询：0 为维数（即必需参数的估计），n 为第 n 维的大小。
    fn dimension(&self, which: usize) -> usize;

    /// 以 `count` 个参数调用是否可能成功。
    #[allow(unused_variables)]
    fn accepts_arguments(&self, count: usize) -> bool {
        true
    }

    /// 参数个数上限，可变参数时为 `None`。
    fn max_arguments(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str;

    fn to_string(&self, readable: bool) -> String;

    fn as_bytecode(&self) -> Option<&Arc<BytecodeObject>> {
        None
    }

    /// 为带有可变状态的可调用对象生成独立副本；返回 `None` 表示不可变，可直接共享。
    fn deep_clone(&self) -> Option<Arc<dyn Callable>> {
        None
    }
}

/// 作为过程或函数使用的已定型字节码对象。
#[derive(Debug, Clone)]
pub struct SubroutineValue {
    bco: Arc<BytecodeObject>,
}

impl SubroutineValue {
    pub fn new(bco: Arc<BytecodeObject>) -> Self {
        SubroutineValue { bco }
    }

    pub fn new_value(bco: Arc<BytecodeObject>) -> Value {
        Value::Callable(Arc::new(SubroutineValue { bco }))
    }

    pub fn bytecode(&self) -> &Arc<BytecodeObject> {
        &self.bco
    }
}

impl Callable for SubroutineValue {
    fn call(&self, process: &mut Process, args: Vec<Value>, want_result: bool) -> Result<(), VmError> {
        if want_result && self.bco.is_procedure() {
            return Err(VmError::type_mismatch(format!(
                "procedure '{}' does not return a value",
                self.bco.name()
            )));
        }
        process.push_frame(self.bco.clone(), args, want_result)
    }

    fn is_procedure(&self) -> bool {
        self.bco.is_procedure()
    }

    fn dimension(&self, _which: usize) -> usize {
        0
    }

    fn accepts_arguments(&self, count: usize) -> bool {
        count >= self.bco.min_args() && (self.bco.is_varargs() || count <= self.bco.max_args())
    }

    fn max_arguments(&self) -> Option<usize> {
        if self.bco.is_varargs() {
            None
        } else {
            Some(self.bco.max_args())
        }
    }

    fn name(&self) -> &str {
        self.bco.name()
    }

    fn to_string(&self, _readable: bool) -> String {
        if self.bco.is_procedure() {
            format!("#<procedure {}>", self.bco.name())
        } else {
            format!("#<function {}>", self.bco.name())
        }
    }

    fn as_bytecode(&self) -> Option<&Arc<BytecodeObject>> {
        Some(&self.bco)
    }
}

pub type NativeFn = fn(&[Value]) -> Result<Value, VmError>;

/// 参数个数有固定上下限的宿主函数。
#[derive(Debug, Clone)]
pub struct NativeFunction {
    name: String,
    min_args: usize,
    max_args: Option<usize>,
    procedure: bool,
    function: NativeFn,
}

impl NativeFunction {
    pub fn new(name: impl Into<String>, min_args: usize, max_args: Option<usize>, function: NativeFn) -> Self {
        NativeFunction {
            name: name.into(),
            min_args,
            max_args,
            procedure: false,
            function,
        }
    }

    /// 与 `new` 相同，但结果被丢弃，只能作为语句使用。
    pub fn new_procedure(name: impl Into<String>, min_args: usize, max_args: Option<usize>, function: NativeFn) -> Self {
        NativeFunction {
            procedure: true,
            ..Self::new(name, min_args, max_args, function)
        }
    }

    pub fn into_value(self) -> Value {
        Value::Callable(Arc::new(self))
    }
}

impl Callable for NativeFunction {
    fn call(&self, process: &mut Process, args: Vec<Value>, want_result: bool) -> Result<(), VmError> {
        if !self.accepts_arguments(args.len()) {
            return Err(VmError::type_mismatch(format!(
                "wrong number of arguments to '{}': {}",
                self.name,
                args.len()
            )));
        }
        if want_result && self.procedure {
            return Err(VmError::type_mismatch(format!(
                "procedure '{}' does not return a value",
                self.name
            )));
        }
        let result = (self.function)(&args)?;
        if want_result {
            process.push_value(result)?;
        }
        Ok(())
    }

    fn is_procedure(&self) -> bool {
        self.procedure
    }

    fn dimension(&self, _which: usize) -> usize {
        0
    }

    fn accepts_arguments(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    fn max_arguments(&self) -> Option<usize> {
        self.max_args
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn to_string(&self, _readable: bool) -> String {
        format!("#<builtin {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::builder::BytecodeBuilder,
        bytecode::opcode::{Major, Scope},
        process::ProcessId,
    };

    fn add(args: &[Value]) -> Result<Value, VmError> {
        Ok(Value::Integer(args.iter().filter_map(|a| a.as_integer()).sum()))
    }

    #[test]
    fn test_native_call() {
        let mut process = Process::new(ProcessId(1), "native");
        let native = NativeFunction::new("ADD", 1, Some(3), add);
        native
            .call(&mut process, vec![Value::Integer(2), Value::Integer(3)], true)
            .unwrap();
        assert_eq!(process.stack(), &[Value::Integer(5)]);
        native.call(&mut process, vec![Value::Integer(2)], false).unwrap();
        assert_eq!(process.stack().len(), 1);
        assert!(matches!(
            native.call(&mut process, vec![], true),
            Err(VmError::TypeMismatch(_))
        ));
        assert_eq!(native.to_string(true), "#<builtin ADD>");
    }

    #[test]
    fn test_subroutine_pushes_frame() {
        let mut builder = BytecodeBuilder::new("SQUARE", false);
        builder.add_argument("X", false);
        builder.add_instruction(Major::Push, Scope::Local as u8, 0);
        let bco = builder.finalize().unwrap();
        let sub = SubroutineValue::new(bco);

        assert!(sub.accepts_arguments(1));
        assert!(!sub.accepts_arguments(2));
        assert_eq!(sub.to_string(false), "#<function SQUARE>");

        let mut process = Process::new(ProcessId(1), "sub");
        sub.call(&mut process, vec![Value::Integer(4)], true).unwrap();
        assert_eq!(process.frame_count(), 1);
        assert!(matches!(
            sub.call(&mut process, vec![], true),
            Err(VmError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_procedure_as_function_is_rejected() {
        let bco = BytecodeBuilder::new("STOPALL", true).finalize().unwrap();
        let sub = SubroutineValue::new(bco);
        let mut process = Process::new(ProcessId(1), "proc");
        assert!(sub.call(&mut process, vec![], true).is_err());
        sub.call(&mut process, vec![], false).unwrap();
        assert_eq!(sub.to_string(true), "#<procedure STOPALL>");
    }
}
