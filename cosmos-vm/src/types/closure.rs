use std::sync::Arc;

use crate::{error::VmError, process::Process};

use super::{callable::Callable, value::Value};

/// 可调用对象的部分应用：每次调用时绑定参数排在实参之前。
///
/// 闭包先用 `add_argument`/`add_arguments_from` 组装，再包装为 `Value`，
/// 此后不再修改。
pub struct Closure {
    base: Arc<dyn Callable>,
    bound: Vec<Value>,
}

impl Closure {
    pub fn new(base: Arc<dyn Callable>) -> Self {
        Closure {
            base,
            bound: Vec::new(),
        }
    }

    pub fn base(&self) -> &Arc<dyn Callable> {
        &self.base
    }

    pub fn bound_arguments(&self) -> &[Value] {
        &self.bound
    }

    /// 追加一个绑定参数。
    ///
    /// # 参数
    /// - `value`: 要绑定的值，按 `clone_of` 复制，调用方之后对数组的修改不会影响闭包
    ///
    /// # 错误
    /// 绑定后超出被调用对象的参数上限时返回 `TypeMismatch`
    pub fn add_argument(&mut self, value: &Value) -> Result<(), VmError> {
        let count = self.bound.len() + 1;
        if let Some(max) = self.base.max_arguments() {
            if count > max {
                return Err(VmError::type_mismatch(format!(
                    "'{}' takes at most {} arguments, cannot bind {}",
                    self.base.name(),
                    max,
                    count
                )));
            }
        }
        self.bound.push(value.clone_of());
        Ok(())
    }

    /// 按顺序绑定 `segment` 末尾的 `count` 个值。
    ///
    /// # 参数
    /// - `segment`: 值序列，通常是操作数栈
    /// - `count`: 要绑定的值个数
    ///
    /// # 错误
    /// `count` 超出序列长度时返回 `VmFault`
    pub fn add_arguments_from(&mut self, segment: &[Value], count: usize) -> Result<(), VmError> {
        let start = segment
            .len()
            .checked_sub(count)
            .ok_or_else(|| VmError::fault(format!("cannot bind {} of {} values", count, segment.len())))?;
        for value in &segment[start..] {
            self.add_argument(value)?;
        }
        Ok(())
    }

    pub fn into_value(self) -> Value {
        Value::Callable(Arc::new(self))
    }
}

impl Callable for Closure {
    fn call(&self, process: &mut Process, args: Vec<Value>, want_result: bool) -> Result<(), VmError> {
        let mut all = Vec::with_capacity(self.bound.len() + args.len());
        all.extend(self.bound.iter().cloned());
        all.extend(args);
        self.base.call(process, all, want_result)
    }

    fn is_procedure(&self) -> bool {
        self.base.is_procedure()
    }

    fn dimension(&self, which: usize) -> usize {
        if which == 0 {
            self.base.dimension(0).saturating_sub(self.bound.len())
        } else {
            self.base.dimension(which + self.bound.len())
        }
    }

    fn accepts_arguments(&self, count: usize) -> bool {
        self.base.accepts_arguments(count + self.bound.len())
    }

    fn max_arguments(&self) -> Option<usize> {
        self.base
            .max_arguments()
            .map(|max| max.saturating_sub(self.bound.len()))
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn to_string(&self, _readable: bool) -> String {
        "#<closure>".to_string()
    }

    fn deep_clone(&self) -> Option<Arc<dyn Callable>> {
        Some(Arc::new(Closure {
            base: self.base.clone(),
            bound: self.bound.iter().map(Value::clone_of).collect(),
        }))
    }
}
