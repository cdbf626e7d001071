//! 协作式调度器：管理一组进程并决定运行顺序。
//!
//! 同一时刻至多一个进程处于 `Running`。可运行进程按加入顺序（FIFO）调度，
//! 进程运行到挂起、等待或终止为止；终止的进程从集合中移除并以
//! `ProcessOutcome` 的形式交还给调用方。

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, error, info};

use crate::{
    bytecode::object::BytecodeObject,
    config::VmConfig,
    error::{SchedulerError, VmError},
    process::{Environment, Process, ProcessId, ProcessKind, ProcessState, SuspensionKey},
    types::value::Value,
};

/// 进程进入终止状态后的最终报告。
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub id: ProcessId,
    pub name: String,
    pub kind: ProcessKind,
    pub state: ProcessState,
    pub result: Option<Value>,
    pub error: Option<VmError>,
}

impl ProcessOutcome {
    fn of(process: &Process) -> Self {
        ProcessOutcome {
            id: process.id(),
            name: process.name().to_string(),
            kind: process.kind(),
            state: process.state(),
            result: process.result().cloned(),
            error: process.error().cloned(),
        }
    }
}

/// 单次 `run_next` 调用的结果。
#[derive(Debug, Clone)]
pub enum RunStep {
    /// 没有可运行的进程。
    Idle,
    /// 进程运行过且仍存活（挂起或等待中）。
    Progress(ProcessId),
    /// 进程运行到终止状态并已移除。
    Finished(ProcessOutcome),
}

pub struct Scheduler {
    config: VmConfig,
    processes: IndexMap<ProcessId, Process>,
    environment: Environment,
    next_id: u32,
}

impl Scheduler {
    pub fn new(config: VmConfig) -> Self {
        Scheduler {
            config,
            processes: IndexMap::new(),
            environment: Environment::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    fn allocate_id(&mut self) -> ProcessId {
        let id = ProcessId(self.next_id);
        self.next_id += 1;
        id
    }

    /// 创建运行 `bco` 的 `Suspended` 进程。
    ///
    /// # 参数
    /// - `bco`: 入口字节码
    /// - `args`: 实参，按 `clone_of` 复制
    ///
    /// # 返回
    /// 新进程的编号
    ///
    /// # 错误
    /// 参数个数不符时返回 `TypeMismatch`
    pub fn add_process(&mut self, bco: Arc<BytecodeObject>, args: &[Value]) -> Result<ProcessId, VmError> {
        let name = bco.name().to_string();
        self.add_named_process(name, ProcessKind::Default, bco, args)
    }

    pub fn add_named_process(
        &mut self,
        name: impl Into<String>,
        kind: ProcessKind,
        bco: Arc<BytecodeObject>,
        args: &[Value],
    ) -> Result<ProcessId, VmError> {
        let id = ProcessId(self.next_id);
        let mut process = Process::with_config(id, name, &self.config);
        process.set_kind(kind);
        process.start(bco, args)?;
        self.allocate_id();
        debug!("scheduler: added process {} '{}'", id, process.name());
        self.processes.insert(id, process);
        Ok(id)
    }

    /// 以新编号登记已有进程（例如从对象文件加载的进程）。
    pub fn adopt(&mut self, mut process: Process) -> ProcessId {
        let id = self.allocate_id();
        process.set_id(id);
        debug!("scheduler: adopted process {} '{}' ({})", id, process.name(), process.state());
        self.processes.insert(id, process);
        id
    }

    pub fn get(&self, id: ProcessId) -> Option<&Process> {
        self.processes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    fn get_mut(&mut self, id: ProcessId) -> Result<&mut Process, SchedulerError> {
        self.processes.get_mut(&id).ok_or(SchedulerError::NotFound(id))
    }

    pub fn continue_process(&mut self, id: ProcessId) -> Result<(), SchedulerError> {
        self.get_mut(id)?.continue_process()
    }

    pub fn resume(&mut self, id: ProcessId, value: Value) -> Result<(), SchedulerError> {
        self.get_mut(id)?.resume(value)
    }

    /// 立即终止并移除进程。
    ///
    /// # 返回
    /// 该进程的最终报告
    ///
    /// # 错误
    /// 编号不存在时返回 `SchedulerError::NotFound`
    pub fn terminate(&mut self, id: ProcessId) -> Result<ProcessOutcome, SchedulerError> {
        let mut process = self
            .processes
            .shift_remove(&id)
            .ok_or(SchedulerError::NotFound(id))?;
        process.terminate();
        info!("process {} '{}' terminated", id, process.name());
        Ok(ProcessOutcome::of(&process))
    }

    pub fn terminate_all(&mut self) -> Vec<ProcessOutcome> {
        let ids: Vec<ProcessId> = self.processes.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.terminate(id).ok()).collect()
    }

    /// 列出等待外部值的进程及其等待的键。
    pub fn waiting(&self) -> Vec<(ProcessId, SuspensionKey)> {
        self.processes
            .values()
            .filter(|p| p.state() == ProcessState::Waiting)
            .filter_map(|p| p.suspension_key().map(|key| (p.id(), key.clone())))
            .collect()
    }

    pub fn has_runnable(&self) -> bool {
        self.processes.values().any(|p| p.state() == ProcessState::Runnable)
    }

    /// 运行第一个可运行的进程，直到它离开 `Running`。
    pub fn run_next(&mut self) -> RunStep {
        let Some(index) = self
            .processes
            .values()
            .position(|p| p.state() == ProcessState::Runnable)
        else {
            return RunStep::Idle;
        };
        let Some((&id, process)) = self.processes.get_index_mut(index) else {
            return RunStep::Idle;
        };
        let state = process.run(&mut self.environment);
        if !state.is_terminal() {
            return RunStep::Progress(id);
        }

        if let Some(err) = process.error() {
            error!(
                "process {} '{}' failed: {}\n{}",
                id,
                process.name(),
                err,
                serde_json::to_string_pretty(&process.format_context()).unwrap_or_default()
            );
        } else {
            info!("process {} '{}' {}", id, process.name(), state);
        }
        match self.processes.shift_remove_index(index) {
            Some((_, process)) => RunStep::Finished(ProcessOutcome::of(&process)),
            None => RunStep::Idle,
        }
    }

    /// 一直运行到没有可运行的进程。
    ///
    /// # 返回
    /// 期间结束的所有进程的报告，按结束顺序排列
    pub fn run(&mut self) -> Vec<ProcessOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.run_next() {
                RunStep::Idle => break,
                RunStep::Progress(_) => {}
                RunStep::Finished(outcome) => outcomes.push(outcome),
            }
        }
        outcomes
    }
}
