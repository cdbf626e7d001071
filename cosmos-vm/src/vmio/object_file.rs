//! 对象文件：保存运行中的自动任务及其引用的字节码与数组。
//!
//! 容器本身用 serde + bincode 序列化；容器内的值仍使用标签流编码，
//! 这样进程的局部变量、操作数栈与字节码字面量共享同一套值编码。
//!
//! 加载顺序：数组外壳 → 字节码 → 数组内容 → 进程。
//! 字节码按后序写出，因此引用总是指向更早的记录。

use std::{fs, path::Path, sync::Arc};

use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    bytecode::{
        object::BytecodeObject,
        opcode::{jump, Instruction, Major},
    },
    config::{LoadPolicy, VmConfig},
    error::VmError,
    process::{Frame, Handler, Process, ProcessId, ProcessKind, ProcessState, SuspensionKey},
    types::{
        array::{ArrayData, ArrayRef},
        value::Value,
    },
};

use super::{
    charset::Charset,
    context::{LoadContext, SaveContext},
    save_visitor::SaveVisitor,
    value_loader::ValueLoader,
};

const SIGNATURE: [u8; 8] = *b"CCobj\r\n\x1a";
const VERSION: u16 = 1;

const FLAG_PROCEDURE: u8 = 1;
const FLAG_VARARGS: u8 = 2;

/// 以标签流编码的值序列。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub count: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeRecord {
    pub name: String,
    pub flags: u8,
    pub min_args: u16,
    pub max_args: u16,
    pub local_names: Vec<String>,
    pub names: Vec<String>,
    /// 每条指令四字节。
    pub code: Vec<u8>,
    pub literals: Segment,
    pub file_name: String,
    pub line_numbers: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayRecord {
    pub dims: Vec<u32>,
    pub elements: Segment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub bytecode: u32,
    pub pc: u32,
    pub want_result: bool,
    pub stack_base: u32,
    /// （目标, 栈深度）
    pub handlers: Vec<(u32, u32)>,
    pub locals: Segment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub name: String,
    pub kind: ProcessKind,
    pub state: ProcessState,
    pub suspension_key: Option<String>,
    pub stack: Segment,
    pub frames: Vec<FrameRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectFile {
    signature: [u8; 8],
    version: u16,
    pub bytecode: Vec<BytecodeRecord>,
    pub arrays: Vec<ArrayRecord>,
    pub processes: Vec<ProcessRecord>,
}

impl Default for ObjectFile {
    fn default() -> Self {
        ObjectFile {
            signature: SIGNATURE,
            version: VERSION,
            bytecode: Vec::new(),
            arrays: Vec::new(),
            processes: Vec::new(),
        }
    }
}

impl ObjectFile {
    pub fn to_bytes(&self) -> Result<Vec<u8>, VmError> {
        bincode::serialize(self).map_err(|e| VmError::format(format!("serialization error: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VmError> {
        let file: ObjectFile = bincode::deserialize(bytes)
            .map_err(|e| VmError::format(format!("deserialization error: {}", e)))?;
        if file.signature != SIGNATURE {
            return Err(VmError::format("not an object file"));
        }
        if file.version != VERSION {
            return Err(VmError::format(format!("unsupported object file version {}", file.version)));
        }
        Ok(file)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), VmError> {
        let bytes = self.to_bytes()?;
        fs::write(path.as_ref(), bytes)
            .map_err(|e| VmError::format(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, VmError> {
        let bytes = fs::read(path.as_ref())
            .map_err(|e| VmError::format(format!("cannot read {}: {}", path.as_ref().display(), e)))?;
        Self::from_bytes(&bytes)
    }
}

/// 构建 `ObjectFile`，为保存的值所引用的一切分配编号。
pub struct ObjectWriter<'a> {
    charset: &'a dyn Charset,
    file: ObjectFile,
    bytecode_ids: FxHashMap<usize, u32>,
    in_progress: FxHashSet<usize>,
    array_ids: FxHashMap<usize, u32>,
    // keep referenced objects alive so their addresses stay unique
    bytecode_keep: Vec<Arc<BytecodeObject>>,
    array_keep: Vec<ArrayRef>,
}

impl<'a> ObjectWriter<'a> {
    pub fn new(charset: &'a dyn Charset) -> Self {
        ObjectWriter {
            charset,
            file: ObjectFile::default(),
            bytecode_ids: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            array_ids: FxHashMap::default(),
            bytecode_keep: Vec::new(),
            array_keep: Vec::new(),
        }
    }

    fn encode_segment(&mut self, values: &[Value]) -> Result<Segment, VmError> {
        let charset = self.charset;
        let mut data = Vec::new();
        SaveVisitor::new(charset, self).save_segment(&mut data, values)?;
        Ok(Segment {
            count: values.len() as u32,
            data,
        })
    }

    /// 保存一个进程。
    ///
    /// # 参数
    /// - `process`: 处于挂起、可运行或等待状态的进程
    ///
    /// # 错误
    /// 其他状态或带有待抛出错误的进程返回 `NotSerializable`
    pub fn add_process(&mut self, process: &Process) -> Result<(), VmError> {
        if !matches!(
            process.state(),
            ProcessState::Suspended | ProcessState::Runnable | ProcessState::Waiting
        ) || process.has_pending_fault()
        {
            return Err(VmError::NotSerializable);
        }
        let stack = self.encode_segment(process.stack())?;
        let mut frames = Vec::with_capacity(process.frame_count());
        for frame in process.frames() {
            let bytecode = self.add_bytecode(frame.bytecode())?;
            let locals = self.encode_segment(frame.locals())?;
            frames.push(FrameRecord {
                bytecode,
                pc: frame.pc() as u32,
                want_result: frame.want_result(),
                stack_base: frame.stack_base() as u32,
                handlers: frame
                    .handlers()
                    .iter()
                    .map(|h| (h.target as u32, h.stack_depth as u32))
                    .collect(),
                locals,
            });
        }
        debug!("saving process {} '{}'", process.id(), process.name());
        self.file.processes.push(ProcessRecord {
            name: process.name().to_string(),
            kind: process.kind(),
            state: process.state(),
            suspension_key: process.suspension_key().map(|k| k.0.clone()),
            stack,
            frames,
        });
        Ok(())
    }

    pub fn finish(self) -> ObjectFile {
        self.file
    }
}

impl SaveContext for ObjectWriter<'_> {
    fn add_bytecode(&mut self, bco: &Arc<BytecodeObject>) -> Result<u32, VmError> {
        let key = Arc::as_ptr(bco) as usize;
        if let Some(id) = self.bytecode_ids.get(&key) {
            return Ok(*id);
        }
        if !self.in_progress.insert(key) {
            warn!("bytecode '{}' refers to itself through its literals", bco.name());
            return Err(VmError::NotSerializable);
        }
        let literals = self.encode_segment(bco.literals());
        self.in_progress.remove(&key);
        let literals = literals?;

        let mut flags = 0;
        if bco.is_procedure() {
            flags |= FLAG_PROCEDURE;
        }
        if bco.is_varargs() {
            flags |= FLAG_VARARGS;
        }
        let id = self.file.bytecode.len() as u32;
        self.file.bytecode.push(BytecodeRecord {
            name: bco.name().to_string(),
            flags,
            min_args: bco.min_args() as u16,
            max_args: bco.max_args() as u16,
            local_names: bco.local_names().to_vec(),
            names: bco.names().to_vec(),
            code: bco.code().iter().flat_map(|insn| insn.to_bytes()).collect(),
            literals,
            file_name: bco.file_name().to_string(),
            line_numbers: bco.line_numbers().to_vec(),
        });
        self.bytecode_ids.insert(key, id);
        self.bytecode_keep.push(bco.clone());
        Ok(id)
    }

    fn add_array(&mut self, array: &ArrayRef) -> Result<u32, VmError> {
        if let Some(id) = self.array_ids.get(&array.id()) {
            return Ok(*id);
        }
        let (dims, elements) = {
            let data = array.read()?;
            (data.dims().to_vec(), data.elements().to_vec())
        };
        // the id exists before the elements are encoded, so cycles resolve
        let id = self.file.arrays.len() as u32;
        self.file.arrays.push(ArrayRecord {
            dims: dims.iter().map(|d| *d as u32).collect(),
            elements: Segment::default(),
        });
        self.array_ids.insert(array.id(), id);
        self.array_keep.push(array.clone());

        let segment = self.encode_segment(&elements)?;
        self.file.arrays[id as usize].elements = segment;
        Ok(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Bytecode,
    Array,
    Process,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub kind: RecordKind,
    pub index: usize,
    pub reason: VmError,
}

/// `LoadPolicy::SkipMalformed` 下被跳过的记录。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub skipped: Vec<SkippedRecord>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct LoadedObjects {
    pub bytecode: Vec<Arc<BytecodeObject>>,
    /// 已恢复但尚未登记到调度器的进程。
    pub processes: Vec<Process>,
    pub report: LoadReport,
}

/// 恢复 `ObjectFile` 的内容。
pub struct ObjectReader<'a> {
    charset: &'a dyn Charset,
    config: &'a VmConfig,
    bytecode: Vec<Option<Arc<BytecodeObject>>>,
    arrays: Vec<Option<ArrayRef>>,
    report: LoadReport,
    // references resolved while decoding the current record
    seen_bytecode: FxHashSet<u32>,
    seen_arrays: FxHashSet<u32>,
}

/// 字节码记录与数组记录所引用的记录。
#[derive(Default)]
struct References {
    bytecode: FxHashSet<u32>,
    arrays: FxHashSet<u32>,
}

impl<'a> ObjectReader<'a> {
    pub fn new(charset: &'a dyn Charset, config: &'a VmConfig) -> Self {
        ObjectReader {
            charset,
            config,
            bytecode: Vec::new(),
            arrays: Vec::new(),
            report: LoadReport::default(),
            seen_bytecode: FxHashSet::default(),
            seen_arrays: FxHashSet::default(),
        }
    }

    pub fn load(mut self, file: &ObjectFile) -> Result<LoadedObjects, VmError> {
        for (index, record) in file.arrays.iter().enumerate() {
            let shell = make_array_shell(record);
            let shell = self.accept(RecordKind::Array, index, shell)?;
            self.arrays.push(shell);
        }
        let mut bytecode_refs = Vec::with_capacity(file.bytecode.len());
        for (index, record) in file.bytecode.iter().enumerate() {
            let bco = self.load_bytecode_record(record);
            bytecode_refs.push(self.take_references());
            let bco = self.accept(RecordKind::Bytecode, index, bco)?;
            self.bytecode.push(bco);
        }
        let mut array_refs = Vec::with_capacity(file.arrays.len());
        for (index, record) in file.arrays.iter().enumerate() {
            let Some(array) = self.arrays[index].clone() else {
                array_refs.push(References::default());
                continue;
            };
            let filled = self.fill_array(&array, record);
            array_refs.push(self.take_references());
            if self.accept(RecordKind::Array, index, filled)?.is_none() {
                self.arrays[index] = None;
            }
        }
        self.drop_dependents(&bytecode_refs, &array_refs);
        let mut processes = Vec::with_capacity(file.processes.len());
        for (index, record) in file.processes.iter().enumerate() {
            let process = self.load_process_record(record);
            if let Some(process) = self.accept(RecordKind::Process, index, process)? {
                processes.push(process);
            }
        }

        Ok(LoadedObjects {
            bytecode: self.bytecode.into_iter().flatten().collect(),
            processes,
            report: self.report,
        })
    }

    fn take_references(&mut self) -> References {
        References {
            bytecode: std::mem::take(&mut self.seen_bytecode),
            arrays: std::mem::take(&mut self.seen_arrays),
        }
    }

    /// 剔除直接或间接引用了填充失败的数组记录的字节码与数组。
    /// 这些对象已经持有未填充的数组外壳。
    fn drop_dependents(&mut self, bytecode_refs: &[References], array_refs: &[References]) {
        loop {
            let mut changed = false;
            for (index, refs) in bytecode_refs.iter().enumerate() {
                if self.bytecode[index].is_some() {
                    if let Some(reason) = self.missing_reference(refs) {
                        self.reject(RecordKind::Bytecode, index, reason);
                        self.bytecode[index] = None;
                        changed = true;
                    }
                }
            }
            for (index, refs) in array_refs.iter().enumerate() {
                if self.arrays[index].is_some() {
                    if let Some(reason) = self.missing_reference(refs) {
                        self.reject(RecordKind::Array, index, reason);
                        self.arrays[index] = None;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn missing_reference(&self, refs: &References) -> Option<VmError> {
        let mut arrays: Vec<u32> = refs.arrays.iter().copied().collect();
        arrays.sort_unstable();
        if let Some(id) = arrays.into_iter().find(|id| self.arrays.get(*id as usize).map_or(true, Option::is_none)) {
            return Some(VmError::format(format!("refers to skipped array record {}", id)));
        }
        let mut bytecode: Vec<u32> = refs.bytecode.iter().copied().collect();
        bytecode.sort_unstable();
        bytecode
            .into_iter()
            .find(|id| self.bytecode.get(*id as usize).map_or(true, Option::is_none))
            .map(|id| VmError::format(format!("refers to skipped bytecode record {}", id)))
    }

    fn reject(&mut self, kind: RecordKind, index: usize, reason: VmError) {
        warn!("skipping {:?} record {}: {}", kind, index, reason);
        self.report.skipped.push(SkippedRecord { kind, index, reason });
    }

    /// 对单条记录的结果应用加载策略。
    fn accept<T>(&mut self, kind: RecordKind, index: usize, outcome: Result<T, VmError>) -> Result<Option<T>, VmError> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.config.load_policy == LoadPolicy::SkipMalformed => {
                self.reject(kind, index, err);
                Ok(None)
            }
            Err(err) => Err(VmError::format(format!("{:?} record {}: {}", kind, index, err))),
        }
    }

    fn decode_segment(&mut self, segment: &Segment) -> Result<Vec<Value>, VmError> {
        let charset = self.charset;
        let mut values = Vec::new();
        let mut data: &[u8] = &segment.data;
        ValueLoader::new(charset, self).load_segment(&mut data, &mut values, 0, segment.count as usize)?;
        if !data.is_empty() {
            return Err(VmError::format("trailing data after segment"));
        }
        Ok(values)
    }

    fn load_bytecode_record(&mut self, record: &BytecodeRecord) -> Result<Arc<BytecodeObject>, VmError> {
        if record.code.len() % 4 != 0 {
            return Err(VmError::format("truncated code"));
        }
        let code = record
            .code
            .chunks_exact(4)
            .map(|c| {
                Instruction::from_bytes([c[0], c[1], c[2], c[3]])
                    .ok_or_else(|| VmError::format(format!("invalid opcode {}", c[0])))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for insn in &code {
            if insn.major == Major::Jump && (insn.minor & jump::SYMBOLIC != 0 || insn.arg as usize > code.len()) {
                return Err(VmError::format(format!("invalid jump '{}'", insn)));
            }
        }
        let is_varargs = record.flags & FLAG_VARARGS != 0;
        let (min_args, max_args) = (record.min_args as usize, record.max_args as usize);
        if min_args > max_args || record.local_names.len() < max_args + is_varargs as usize {
            return Err(VmError::format("inconsistent argument declaration"));
        }
        let literals = self.decode_segment(&record.literals)?;
        Ok(Arc::new(BytecodeObject {
            name: record.name.clone(),
            is_procedure: record.flags & FLAG_PROCEDURE != 0,
            is_varargs,
            min_args,
            max_args,
            local_names: record.local_names.clone(),
            names: record.names.clone(),
            code,
            literals,
            file_name: record.file_name.clone(),
            line_numbers: record.line_numbers.clone(),
        }))
    }

    fn fill_array(&mut self, array: &ArrayRef, record: &ArrayRecord) -> Result<(), VmError> {
        let elements = self.decode_segment(&record.elements)?;
        let mut data = array.write()?;
        if elements.len() != data.len() {
            return Err(VmError::format(format!(
                "array has {} elements, {} stored",
                data.len(),
                elements.len()
            )));
        }
        data.replace_elements(elements);
        Ok(())
    }

    fn load_process_record(&mut self, record: &ProcessRecord) -> Result<Process, VmError> {
        let key = match (record.state, &record.suspension_key) {
            (ProcessState::Waiting, Some(key)) => Some(SuspensionKey(key.clone())),
            (ProcessState::Waiting, None) => return Err(VmError::format("waiting process without key")),
            (ProcessState::Suspended | ProcessState::Runnable, _) => None,
            (state, _) => return Err(VmError::format(format!("cannot restore a {} process", state))),
        };
        let stack = self.decode_segment(&record.stack)?;
        let mut frames = Vec::with_capacity(record.frames.len());
        let mut previous_base = 0;
        for frame in &record.frames {
            let bco = self.load_bytecode(frame.bytecode)?;
            let pc = frame.pc as usize;
            let stack_base = frame.stack_base as usize;
            if pc > bco.code().len() {
                return Err(VmError::format(format!("pc {} outside '{}'", pc, bco.name())));
            }
            if stack_base < previous_base || stack_base > stack.len() {
                return Err(VmError::format(format!("invalid stack base {}", stack_base)));
            }
            let handlers = frame
                .handlers
                .iter()
                .map(|(target, depth)| {
                    let handler = Handler {
                        target: *target as usize,
                        stack_depth: *depth as usize,
                    };
                    if handler.target > bco.code().len() || handler.stack_depth < stack_base || handler.stack_depth > stack.len() {
                        Err(VmError::format(format!("invalid handler {:?}", handler)))
                    } else {
                        Ok(handler)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            let locals = self.decode_segment(&frame.locals)?;
            if locals.len() < bco.num_locals() {
                return Err(VmError::format(format!("'{}' needs {} locals", bco.name(), bco.num_locals())));
            }
            previous_base = stack_base;
            frames.push(Frame {
                bco,
                pc,
                locals,
                handlers,
                want_result: frame.want_result,
                stack_base,
            });
        }
        if frames.is_empty() {
            return Err(VmError::format("process without frames"));
        }

        let mut process = Process::with_config(ProcessId(0), record.name.clone(), self.config);
        process.restore(record.state, record.kind, key, stack, frames);
        debug!("restored process '{}' ({})", record.name, record.state);
        Ok(process)
    }
}

fn make_array_shell(record: &ArrayRecord) -> Result<ArrayRef, VmError> {
    let dims = record.dims.iter().map(|d| *d as usize).collect();
    Ok(ArrayRef::new(ArrayData::new(dims)?))
}

impl LoadContext for ObjectReader<'_> {
    fn load_bytecode(&mut self, id: u32) -> Result<Arc<BytecodeObject>, VmError> {
        self.seen_bytecode.insert(id);
        self.bytecode
            .get(id as usize)
            .cloned()
            .flatten()
            .ok_or_else(|| VmError::format(format!("unresolved bytecode reference {}", id)))
    }

    fn load_array(&mut self, id: u32) -> Result<ArrayRef, VmError> {
        self.seen_arrays.insert(id);
        self.arrays
            .get(id as usize)
            .cloned()
            .flatten()
            .ok_or_else(|| VmError::format(format!("unresolved array reference {}", id)))
    }
}
