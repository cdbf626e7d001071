//! 字节码构建器。
//!
//! 构建阶段只允许追加；`finalize` 把符号跳转解析为绝对地址，
//! 产出不可变的 `BytecodeObject`，之后才能交给进程执行。

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{error::VmError, types::value::Value};

use super::{
    object::BytecodeObject,
    opcode::{jump, Instruction, Major},
};

pub struct BytecodeBuilder {
    object: BytecodeObject,
    labels: Vec<Option<u32>>,
    name_index: FxHashMap<String, u16>,
    seen_optional: bool,
}

impl BytecodeBuilder {
    pub fn new(name: impl Into<String>, is_procedure: bool) -> Self {
        BytecodeBuilder {
            object: BytecodeObject {
                name: name.into(),
                is_procedure,
                is_varargs: false,
                min_args: 0,
                max_args: 0,
                local_names: Vec::new(),
                names: Vec::new(),
                code: Vec::new(),
                literals: Vec::new(),
                file_name: String::new(),
                line_numbers: Vec::new(),
            },
            labels: Vec::new(),
            name_index: FxHashMap::default(),
            seen_optional: false,
        }
    }

    /// 声明下一个参数。
    ///
    /// 参数必须先于其他局部变量声明；可选参数之后的必需参数按可选处理。
    ///
    /// # 参数
    /// - `name`: 参数名
    /// - `optional`: 是否可选
    ///
    /// # 返回
    /// 该参数的局部变量下标
    pub fn add_argument(&mut self, name: impl Into<String>, optional: bool) -> u16 {
        self.seen_optional |= optional;
        if !self.seen_optional {
            self.object.min_args += 1;
        }
        self.object.max_args += 1;
        self.add_local_variable(name)
    }

    /// 声明接收多余参数的局部变量，多余参数以数组形式存入。
    pub fn add_varargs(&mut self, name: impl Into<String>) -> u16 {
        self.object.is_varargs = true;
        self.add_local_variable(name)
    }

    pub fn add_local_variable(&mut self, name: impl Into<String>) -> u16 {
        self.object.local_names.push(name.into());
        (self.object.local_names.len() - 1) as u16
    }

    pub fn add_literal(&mut self, value: Value) -> u16 {
        self.object.literals.push(value);
        (self.object.literals.len() - 1) as u16
    }

    /// 登记全局变量名或成员名，重复的名字返回同一下标。
    pub fn add_name(&mut self, name: &str) -> u16 {
        let key = name.to_ascii_uppercase();
        if let Some(index) = self.name_index.get(&key) {
            return *index;
        }
        let index = self.object.names.len() as u16;
        self.object.names.push(key.clone());
        self.name_index.insert(key, index);
        index
    }

    pub fn add_instruction(&mut self, major: Major, minor: u8, arg: u16) -> &mut Self {
        self.object.code.push(Instruction::new(major, minor, arg));
        self
    }

    /// 追加一条跳往标签的跳转指令。
    ///
    /// # 参数
    /// - `flags`: `jump::*` 条件位
    /// - `label`: `make_label` 返回的标签编号
    pub fn add_jump(&mut self, flags: u8, label: u16) -> &mut Self {
        self.add_instruction(Major::Jump, flags | jump::SYMBOLIC, label)
    }

    pub fn make_label(&mut self) -> u16 {
        self.labels.push(None);
        (self.labels.len() - 1) as u16
    }

    pub fn place_label(&mut self, label: u16) -> Result<(), VmError> {
        let pc = self.object.code.len() as u32;
        match self.labels.get_mut(label as usize) {
            Some(slot) => {
                *slot = Some(pc);
                Ok(())
            }
            None => Err(VmError::fault(format!("label {} was never made", label))),
        }
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.object.file_name = file_name.into();
    }

    /// 标记下一条指令为源码第 `line` 行的开始。
    pub fn add_line_number(&mut self, line: u32) {
        let pc = self.object.code.len() as u32;
        match self.object.line_numbers.last_mut() {
            Some(last) if last.0 == pc => last.1 = line,
            _ => self.object.line_numbers.push((pc, line)),
        }
    }

    pub fn current_pc(&self) -> usize {
        self.object.code.len()
    }

    pub fn finalize(mut self) -> Result<Arc<BytecodeObject>, VmError> {
        if self.object.code.len() > u16::MAX as usize {
            return Err(VmError::fault(format!(
                "'{}' has too many instructions",
                self.object.name
            )));
        }
        // indexes handed out past this point have wrapped
        const MAX_ENTRIES: usize = u16::MAX as usize + 1;
        for (table, len) in [
            ("locals", self.object.local_names.len()),
            ("literals", self.object.literals.len()),
            ("names", self.object.names.len()),
            ("labels", self.labels.len()),
        ] {
            if len > MAX_ENTRIES {
                return Err(VmError::fault(format!(
                    "'{}' has too many {} ({})",
                    self.object.name, table, len
                )));
            }
        }
        for insn in self.object.code.iter_mut() {
            if insn.major != Major::Jump || insn.minor & jump::SYMBOLIC == 0 {
                continue;
            }
            let target = self
                .labels
                .get(insn.arg as usize)
                .copied()
                .flatten()
                .ok_or_else(|| VmError::fault(format!("label {} was never placed", insn.arg)))?;
            insn.minor &= !jump::SYMBOLIC;
            insn.arg = target as u16;
        }
        Ok(Arc::new(self.object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcode::{Scope, SpecialOp};

    #[test]
    fn test_labels_resolve_forward_and_backward() {
        let mut builder = BytecodeBuilder::new("LOOP", true);
        let top = builder.make_label();
        let end = builder.make_label();
        builder.place_label(top).unwrap();
        builder.add_instruction(Major::Push, Scope::Boolean as u8, 1);
        builder.add_jump(jump::IF_TRUE | jump::POP, end);
        builder.add_jump(jump::ALWAYS, top);
        builder.place_label(end).unwrap();
        builder.add_instruction(Major::Special, SpecialOp::Return as u8, 0);

        let bco = builder.finalize().unwrap();
        assert_eq!(bco.instruction(1), Some(Instruction::new(Major::Jump, jump::IF_TRUE | jump::POP, 3)));
        assert_eq!(bco.instruction(2), Some(Instruction::new(Major::Jump, jump::ALWAYS, 0)));
        assert_eq!(bco.instruction(4), None);
    }

    #[test]
    fn test_unplaced_label_is_fault() {
        let mut builder = BytecodeBuilder::new("BROKEN", true);
        let label = builder.make_label();
        builder.add_jump(jump::ALWAYS, label);
        assert!(matches!(builder.finalize(), Err(VmError::VmFault(_))));
    }

    #[test]
    fn test_table_overflow_is_rejected() {
        let mut builder = BytecodeBuilder::new("BIG", true);
        for i in 0..=u16::MAX as i32 {
            builder.add_literal(Value::Integer(i));
        }
        assert_eq!(builder.add_literal(Value::Integer(-1)), 0);
        assert!(matches!(builder.finalize(), Err(VmError::VmFault(msg)) if msg.contains("too many literals")));

        let mut builder = BytecodeBuilder::new("FULL", true);
        for i in 0..=u16::MAX as i32 {
            builder.add_literal(Value::Integer(i));
        }
        let bco = builder.finalize().unwrap();
        assert_eq!(bco.literal(u16::MAX as usize), Some(&Value::Integer(65535)));
    }

    #[test]
    fn test_arguments_and_names() {
        let mut builder = BytecodeBuilder::new("F", false);
        assert_eq!(builder.add_argument("A", false), 0);
        assert_eq!(builder.add_argument("B", true), 1);
        assert_eq!(builder.add_argument("C", false), 2);
        builder.add_varargs("REST");
        builder.add_local_variable("TMP");
        assert_eq!(builder.add_name("Fuel"), builder.add_name("FUEL"));
        builder.set_file_name("auto.q");
        builder.add_line_number(10);
        builder.add_instruction(Major::Push, Scope::Local as u8, 0);
        builder.add_line_number(11);
        builder.add_instruction(Major::Push, Scope::Named as u8, 0);

        let bco = builder.finalize().unwrap();
        assert_eq!(bco.min_args(), 1);
        assert_eq!(bco.max_args(), 3);
        assert!(bco.is_varargs());
        assert_eq!(bco.num_locals(), 5);
        assert_eq!(bco.name_at(0), Some("FUEL"));
        assert_eq!(bco.line_for_pc(0), Some(10));
        assert_eq!(bco.line_for_pc(7), Some(11));
        let listing = bco.disassemble();
        assert!(listing.contains("Function F (1..3+ args, 5 locals)"));
        assert!(listing.contains("; FUEL"));
    }
}
