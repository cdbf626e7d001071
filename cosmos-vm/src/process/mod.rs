//! 进程：一次协作式调度的字节码执行。
//!
//! 进程拥有一个操作数栈和显式的调用帧数组（不借助宿主调用栈递归），
//! 因此可以在任意指令边界挂起、等待外部输入、保存到磁盘后再恢复。
//!
//! 状态机：
//! - `Suspended → Runnable`（`continue_process`）
//! - `Runnable → Running`（`run`）
//! - `Running → Suspended / Waiting / Ended / Terminated / Failed`
//! - `Waiting → Runnable`（`resume`）
//! - `Ended` / `Terminated` / `Failed` 为终止状态。

use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    bytecode::object::BytecodeObject,
    config::VmConfig,
    error::{SchedulerError, VmError},
    types::{
        array::{ArrayData, ArrayRef},
        value::Value,
    },
};

pub mod environment;
pub mod frame;
pub mod instructions;

pub use environment::{Environment, NameLookup};
pub use frame::{Frame, Handler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

impl Display for ProcessId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    Suspended,
    Runnable,
    Running,
    Waiting,
    Ended,
    Terminated,
    Failed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Ended | ProcessState::Terminated | ProcessState::Failed
        )
    }
}

impl Display for ProcessState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ProcessState::Suspended => "suspended",
            ProcessState::Runnable => "runnable",
            ProcessState::Running => "running",
            ProcessState::Waiting => "waiting",
            ProcessState::Ended => "ended",
            ProcessState::Terminated => "terminated",
            ProcessState::Failed => "failed",
        };
        write!(f, "{}", text)
    }
}

/// 进程的用途。自动任务绑定到某个游戏对象。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessKind {
    #[default]
    Default,
    ShipTask,
    PlanetTask,
    BaseTask,
}

/// 标识 `Waiting` 状态的进程在等待什么。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuspensionKey(pub String);

impl Display for SuspensionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 单条指令的执行结果。
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Continue,
    Suspend,
    Wait(SuspensionKey),
    Terminate,
    Ended,
}

pub struct Process {
    id: ProcessId,
    name: String,
    kind: ProcessKind,
    state: ProcessState,
    suspension_key: Option<SuspensionKey>,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    result: Option<Value>,
    error: Option<VmError>,
    // raised at the next dispatch
    pending_fault: Option<VmError>,
    max_call_depth: usize,
    max_stack_size: usize,
}

impl Process {
    pub fn new(id: ProcessId, name: impl Into<String>) -> Self {
        Self::with_config(id, name, &VmConfig::default())
    }

    pub fn with_config(id: ProcessId, name: impl Into<String>, config: &VmConfig) -> Self {
        Process {
            id,
            name: name.into(),
            kind: ProcessKind::Default,
            state: ProcessState::Suspended,
            suspension_key: None,
            stack: Vec::new(),
            frames: Vec::new(),
            result: None,
            error: None,
            pending_fault: None,
            max_call_depth: config.max_call_depth,
            max_stack_size: config.max_stack_size,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ProcessId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ProcessKind) {
        self.kind = kind;
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn suspension_key(&self) -> Option<&SuspensionKey> {
        self.suspension_key.as_ref()
    }

    /// 进入 `Ended` 后最外层函数的返回值。
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&VmError> {
        self.error.as_ref()
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// 以 `bco` 作为最外层帧启动进程。
    ///
    /// # 参数
    /// - `bco`: 入口字节码
    /// - `args`: 实参，按 `clone_of` 复制
    ///
    /// # 错误
    /// 进程已启动时返回 `VmFault`；参数个数不符时返回 `TypeMismatch`
    pub fn start(&mut self, bco: Arc<BytecodeObject>, args: &[Value]) -> Result<(), VmError> {
        if !self.frames.is_empty() || self.state != ProcessState::Suspended {
            return Err(VmError::fault(format!("process {} already started", self.id)));
        }
        let args = args.iter().map(Value::clone_of).collect();
        self.push_frame(bco, args, false)
    }

    pub fn push_value(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= self.max_stack_size {
            return Err(VmError::StackOverflow(format!(
                "operand stack exceeds {} values",
                self.max_stack_size
            )));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop_value(&mut self) -> Result<Value, VmError> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() <= base {
            return Err(VmError::fault("operand stack underflow"));
        }
        self.stack.pop().ok_or_else(|| VmError::fault("operand stack underflow"))
    }

    pub(crate) fn pop_values(&mut self, count: usize) -> Result<Vec<Value>, VmError> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() < base + count {
            return Err(VmError::fault(format!("operand stack underflow (need {})", count)));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    pub(crate) fn top_value(&self, depth: usize) -> Result<&Value, VmError> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        self.stack
            .len()
            .checked_sub(depth + 1)
            .filter(|i| *i >= base)
            .map(|i| &self.stack[i])
            .ok_or_else(|| VmError::fault("operand stack underflow"))
    }

    /// 进入一个字节码对象，从下一次分发开始执行。
    ///
    /// # 参数
    /// - `bco`: 被调用的字节码
    /// - `args`: 实参，多余部分在可变参数时收集为数组
    /// - `want_result`: 返回时是否把结果压回调用方的操作数栈
    ///
    /// # 错误
    /// 调用深度超限时返回 `StackOverflow`；参数个数不符时返回 `TypeMismatch`
    pub fn push_frame(&mut self, bco: Arc<BytecodeObject>, mut args: Vec<Value>, want_result: bool) -> Result<(), VmError> {
        if self.frames.len() >= self.max_call_depth {
            return Err(VmError::StackOverflow(format!(
                "call depth exceeds {}",
                self.max_call_depth
            )));
        }
        let count = args.len();
        if count < bco.min_args() || (count > bco.max_args() && !bco.is_varargs()) {
            return Err(VmError::type_mismatch(format!(
                "wrong number of arguments to '{}': {}",
                bco.name(),
                count
            )));
        }

        let declared = bco.max_args();
        let needed = declared + bco.is_varargs() as usize;
        let mut locals = Vec::with_capacity(bco.num_locals().max(needed));
        let surplus = if count > declared { args.split_off(declared) } else { Vec::new() };
        locals.extend(args);
        locals.resize(declared, Value::Null);
        if bco.is_varargs() {
            let array = ArrayData::from_parts(vec![surplus.len()], surplus);
            locals.push(Value::Array(ArrayRef::new(array)));
        }
        locals.resize(bco.num_locals().max(needed), Value::Null);

        debug!("process {}: enter '{}' with {} args", self.id, bco.name(), count);
        self.frames.push(Frame {
            bco,
            pc: 0,
            locals,
            handlers: Vec::new(),
            want_result,
            stack_base: self.stack.len(),
        });
        Ok(())
    }

    /// 离开当前帧；调用方需要结果时把 `value` 交给它。
    pub(crate) fn return_from_frame(&mut self, value: Option<Value>) -> Result<StepResult, VmError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::fault("return without frame"))?;
        self.stack.truncate(frame.stack_base);
        if self.frames.is_empty() {
            self.result = value;
            return Ok(StepResult::Ended);
        }
        if frame.want_result {
            self.push_value(value.unwrap_or(Value::Null))?;
        }
        Ok(StepResult::Continue)
    }

    pub fn continue_process(&mut self) -> Result<(), SchedulerError> {
        self.transition(ProcessState::Suspended, ProcessState::Runnable)
    }

    /// 把等待的值交给 `Waiting` 状态的进程。
    ///
    /// 操作数栈已满时值不会被拒收，溢出错误在进程下次运行时于进程内部抛出。
    ///
    /// # 参数
    /// - `value`: 交付的值
    ///
    /// # 错误
    /// 进程不在 `Waiting` 状态时返回 `SchedulerError::InvalidState`
    pub fn resume(&mut self, value: Value) -> Result<(), SchedulerError> {
        if self.state != ProcessState::Waiting {
            return Err(SchedulerError::InvalidState {
                id: self.id,
                state: self.state,
            });
        }
        if let Err(err) = self.push_value(value) {
            self.pending_fault = Some(err);
        }
        self.suspension_key = None;
        self.transition(ProcessState::Waiting, ProcessState::Runnable)
    }

    /// 立即结束进程，不执行异常处理器。
    pub fn terminate(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        debug!("process {}: {} -> terminated", self.id, self.state);
        self.release();
        self.state = ProcessState::Terminated;
    }

    pub(crate) fn has_pending_fault(&self) -> bool {
        self.pending_fault.is_some()
    }

    fn release(&mut self) {
        self.pending_fault = None;
        self.stack = Vec::new();
        self.frames = Vec::new();
        self.suspension_key = None;
    }

    fn transition(&mut self, from: ProcessState, to: ProcessState) -> Result<(), SchedulerError> {
        if self.state != from {
            return Err(SchedulerError::InvalidState {
                id: self.id,
                state: self.state,
            });
        }
        debug!("process {}: {} -> {}", self.id, from, to);
        self.state = to;
        Ok(())
    }

    /// 恢复持久化的进程。只接受非终止且非运行中的状态。
    pub(crate) fn restore(
        &mut self,
        state: ProcessState,
        kind: ProcessKind,
        key: Option<SuspensionKey>,
        stack: Vec<Value>,
        frames: Vec<Frame>,
    ) {
        self.state = state;
        self.kind = kind;
        self.suspension_key = key;
        self.stack = stack;
        self.frames = frames;
    }

    /// 运行 `Runnable` 状态的进程，直到离开 `Running`。
    ///
    /// # 参数
    /// - `env`: 共享的全局环境
    ///
    /// # 返回
    /// 运行结束后的状态；其他状态的进程原样返回当前状态
    pub fn run(&mut self, env: &mut Environment) -> ProcessState {
        if self.state != ProcessState::Runnable {
            return self.state;
        }
        self.state = ProcessState::Running;
        debug!("process {}: running", self.id);
        if let Some(err) = self.pending_fault.take() {
            if let Err(err) = self.handle_error(err) {
                self.error = Some(err);
                self.state = ProcessState::Failed;
            }
        }
        while self.state == ProcessState::Running {
            let outcome = instructions::step(self, env);
            match outcome {
                Ok(StepResult::Continue) => {}
                Ok(StepResult::Suspend) => self.state = ProcessState::Suspended,
                Ok(StepResult::Wait(key)) => {
                    self.suspension_key = Some(key);
                    self.state = ProcessState::Waiting;
                }
                Ok(StepResult::Terminate) => {
                    self.release();
                    self.state = ProcessState::Terminated;
                }
                Ok(StepResult::Ended) => {
                    self.release();
                    self.state = ProcessState::Ended;
                }
                Err(err) => {
                    if let Err(err) = self.handle_error(err) {
                        self.error = Some(err);
                        self.state = ProcessState::Failed;
                    }
                }
            }
        }
        debug!("process {}: stopped in state {}", self.id, self.state);
        self.state
    }

    /// 把控制权交给最内层的异常处理器，必要时展开帧。
    /// 无法捕获时原样返回错误，此时帧保持不动以便诊断。
    fn handle_error(&mut self, err: VmError) -> Result<(), VmError> {
        if !err.is_catchable() || self.frames.iter().all(|f| f.handlers.is_empty()) {
            return Err(err);
        }
        while let Some(frame) = self.frames.last_mut() {
            if let Some(handler) = frame.handlers.pop() {
                frame.pc = handler.target;
                self.stack.truncate(handler.stack_depth);
                self.stack.push(Value::String(Arc::from(err.to_string())));
                debug!("process {}: caught '{}'", self.id, err);
                return Ok(());
            }
            self.frames.pop();
        }
        Err(err)
    }

    pub fn format_context(&self) -> serde_json::Value {
        let frames: Vec<serde_json::Value> = self.frames.iter().rev().map(Frame::format_context).collect();
        let stack: Vec<String> = self.stack.iter().map(|v| v.to_string(true)).collect();
        serde_json::json!({
            "id": self.id.0,
            "name": self.name,
            "kind": format!("{:?}", self.kind),
            "state": self.state.to_string(),
            "waiting_for": self.suspension_key.as_ref().map(|k| k.0.clone()),
            "error": self.error.as_ref().map(|e| e.to_string()),
            "frames": frames,
            "stack": stack,
        })
    }
}
